// Measure segmentation.
//
// Splits a primary track and any number of support tracks into fixed-length
// windows. The window grid starts at tick 0 with the caller's measure
// length and switches length at every time-signature event of the meter
// tracks (the primary and supports by default, or every track of the file
// when the signatures live on a note-less tempo track), for windows that
// start at or after that event. The grid grows lazily as events are placed, so a support
// track that runs past the end of the melody simply adds more (empty)
// melody measures.
//
// Per track, events are walked in time order:
//
// - A note start lands in the window containing it.
// - A note end is paired with the oldest open start of the same key. The
//   duration is snapped to an eighth, quarter or half note if it is within
//   the quantize tolerance. The end is then placed relative to the window
//   the note started in:
//     * well inside the window: kept as is;
//     * within the boundary tolerance of the window end, on either side:
//       clamped to the window's last tick;
//     * further out: split. The window gets a synthetic end on its last
//       tick (and its tie flag, on the primary track), the next window gets
//       a synthetic start at local tick 0, and placement repeats there.
// - Everything else (unpaired ends, program changes, meta events) lands in
//   the window containing it. End-of-track is not copied.
//
// Every input event therefore appears in exactly one measure, plus two
// synthetic events per boundary a note was split across.

use std::collections::{BTreeMap, VecDeque};

use log::debug;
use motet_smf::{Event, EventKind, Track};

use crate::config::SegmentParams;
use crate::measure::Measure;

/// Window boundaries, extended on demand.
struct Grid {
    /// `(start, length)` per window.
    windows: Vec<(u64, u64)>,
    /// Time-signature changes on the meter tracks: `(time, ticks)`.
    changes: Vec<(u64, u64)>,
    initial: u64,
}

impl Grid {
    fn new(initial: u64, changes: Vec<(u64, u64)>) -> Self {
        Self {
            windows: Vec::new(),
            changes,
            initial: initial.max(1),
        }
    }

    fn length_at(&self, start: u64) -> u64 {
        self.changes
            .iter()
            .take_while(|(t, _)| *t <= start)
            .last()
            .map_or(self.initial, |&(_, len)| len.max(1))
    }

    fn push_window(&mut self) {
        let start = self.windows.last().map_or(0, |&(s, l)| s + l);
        let len = self.length_at(start);
        self.windows.push((start, len));
    }

    /// Make sure window `index` exists.
    fn ensure(&mut self, index: usize) {
        while self.windows.len() <= index {
            self.push_window();
        }
    }

    /// Index of the window containing `time`.
    fn locate(&mut self, time: u64) -> usize {
        while self.windows.last().is_none_or(|&(s, l)| s + l <= time) {
            self.push_window();
        }
        self.windows.partition_point(|&(s, _)| s <= time) - 1
    }

    fn window(&self, index: usize) -> (u64, u64) {
        self.windows[index]
    }
}

/// One track's events per window, plus the tie flags.
#[derive(Default)]
struct Segmented {
    windows: Vec<Vec<Event>>,
    ties: Vec<bool>,
}

impl Segmented {
    fn slot(&mut self, index: usize) -> &mut Vec<Event> {
        if self.windows.len() <= index {
            self.windows.resize_with(index + 1, Vec::new);
            self.ties.resize(index + 1, false);
        }
        &mut self.windows[index]
    }

    fn pad_to(&mut self, len: usize) {
        self.windows.resize_with(len.max(self.windows.len()), Vec::new);
        self.ties.resize(self.windows.len(), false);
    }
}

/// A started note waiting for its end.
struct Open {
    time: u64,
    window: usize,
    channel: u8,
    velocity: u8,
}

/// Canonical eighth, quarter and half durations for a resolution.
fn canonical_durations(resolution: u16) -> [u64; 3] {
    let q = u64::from(resolution);
    [q / 2, q, q * 2]
}

fn quantize(duration: u64, resolution: u16, tolerance: u64) -> u64 {
    canonical_durations(resolution)
        .into_iter()
        .find(|&c| duration.abs_diff(c) <= tolerance)
        .unwrap_or(duration)
}

fn segment_track(
    track: &Track,
    grid: &mut Grid,
    resolution: u16,
    params: &SegmentParams,
    primary: bool,
) -> Segmented {
    let qtol = params.quantize_tolerance(resolution);
    let btol = params.boundary_tolerance(resolution);
    let mut out = Segmented::default();
    let mut open: BTreeMap<u8, VecDeque<Open>> = BTreeMap::new();

    for event in track.sorted_events() {
        let key = event.key();
        let matched = match key {
            Some(k) if event.is_note_end() => open.get_mut(&k).and_then(VecDeque::pop_front),
            _ => None,
        };

        if let (Some(k), true) = (key, event.is_note_start()) {
            let window = grid.locate(event.time);
            let (start, _) = grid.window(window);
            let channel = event.channel().unwrap_or(0);
            let velocity = event.velocity().unwrap_or(0);
            out.slot(window)
                .push(Event::new(event.time - start, event.kind.clone()));
            open.entry(k).or_default().push_back(Open {
                time: event.time,
                window,
                channel,
                velocity,
            });
            continue;
        }

        let Some(note) = matched else {
            let window = grid.locate(event.time);
            let (start, _) = grid.window(window);
            out.slot(window)
                .push(Event::new(event.time - start, event.kind.clone()));
            continue;
        };

        let Some(k) = key else { continue };
        let duration = quantize(event.time.saturating_sub(note.time), resolution, qtol);
        let end = note.time + duration;
        let mut window = note.window;
        loop {
            let (start, len) = grid.window(window);
            let wend = start + len;
            if end + btol < wend {
                out.slot(window)
                    .push(Event::new(end - start, event.kind.clone()));
                break;
            }
            if end <= wend + btol {
                out.slot(window)
                    .push(Event::new(len - 1, event.kind.clone()));
                break;
            }
            out.slot(window)
                .push(Event::note_on(len - 1, note.channel, k, 0));
            if primary {
                out.ties[window] = true;
            }
            window += 1;
            grid.ensure(window);
            out.slot(window)
                .push(Event::note_on(0, note.channel, k, note.velocity));
        }
    }
    out
}

/// Time-signature changes of the given tracks as `(time, ticks per
/// measure)`, in time order. At equal times the later track wins.
fn measure_changes(tracks: &[&Track], resolution: u16) -> Vec<(u64, u64)> {
    let mut changes: Vec<(u64, u64)> = tracks
        .iter()
        .flat_map(|t| t.sorted_events())
        .filter_map(|e| match &e.kind {
            EventKind::Meta(m) => m
                .time_signature()
                .map(|ts| (e.time, u64::from(ts.ticks_per_measure(resolution)))),
            _ => None,
        })
        .collect();
    changes.sort_by_key(|&(t, _)| t);
    changes
}

/// Segment `primary` into measures of `ticks_per_measure` (adjusted by any
/// time-signature events on it or its supports) and align each support
/// track to the same windows.
///
/// Returns no measures when every track is empty.
pub fn segment_into_measures(
    primary: &Track,
    supports: &[&Track],
    ticks_per_measure: u64,
    resolution: u16,
    params: &SegmentParams,
) -> Vec<Measure> {
    let mut meter: Vec<&Track> = vec![primary];
    meter.extend_from_slice(supports);
    segment_with_meter(primary, supports, &meter, ticks_per_measure, resolution, params)
}

/// Like [`segment_into_measures`], but measure lengths follow the
/// time-signature events of `meter`, which may include tracks that carry no
/// notes at all.
pub fn segment_with_meter(
    primary: &Track,
    supports: &[&Track],
    meter: &[&Track],
    ticks_per_measure: u64,
    resolution: u16,
    params: &SegmentParams,
) -> Vec<Measure> {
    let mut grid = Grid::new(ticks_per_measure, measure_changes(meter, resolution));
    let mut melody = segment_track(primary, &mut grid, resolution, params, true);
    let mut lines: Vec<Segmented> = supports
        .iter()
        .map(|t| segment_track(t, &mut grid, resolution, params, false))
        .collect();

    let count = grid.windows.len();
    melody.pad_to(count);
    for line in &mut lines {
        line.pad_to(count);
    }

    let mut support_windows: Vec<_> = lines.into_iter().map(|l| l.windows.into_iter()).collect();
    let measures: Vec<Measure> = melody
        .windows
        .into_iter()
        .zip(melody.ties)
        .zip(grid.windows)
        .map(|((events, tie), (start, len))| {
            let mut measure = Measure::new(start, len, events, tie);
            for line in &mut support_windows {
                measure.add_support(line.next().unwrap_or_default());
            }
            measure
        })
        .collect();

    debug!(
        "segmented {} events into {} measures ({} supports)",
        primary.events.len(),
        measures.len(),
        supports.len()
    );
    measures
}
