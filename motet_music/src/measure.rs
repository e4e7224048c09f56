// One measure of a segmented piece.
//
// A `Measure` owns the primary track's events inside one window, stored with
// times relative to the window start, plus the notes derived from them. Each
// support track contributes a parallel event list and note list at the same
// index; a support with nothing in the window still gets an empty entry so
// that `supports[i]` always means the i-th support track.
//
// Measures are built by `segment.rs` and are read-only afterwards.

use motet_smf::{Event, Track};
use serde::{Deserialize, Serialize};

use crate::config::HarmonicRhythm;
use crate::harmony::{Chord, chord_at};
use crate::key::Key;
use crate::note::{Note, notes_from_events, sounding};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Absolute tick where the window starts.
    pub start: u64,
    /// Window length in ticks.
    pub length: u64,
    /// Primary-track events, local times.
    pub events: Vec<Event>,
    pub notes: Vec<Note>,
    pub supports: Vec<Vec<Event>>,
    pub support_notes: Vec<Vec<Note>>,
    /// The last melody note is continued by the next measure's first note.
    pub tie: bool,
}

impl Measure {
    pub fn new(start: u64, length: u64, mut events: Vec<Event>, tie: bool) -> Self {
        events.sort_by_key(|e| (e.time, !e.is_meta()));
        let notes = notes_from_events(&events);
        Self {
            start,
            length,
            events,
            notes,
            supports: Vec::new(),
            support_notes: Vec::new(),
            tie,
        }
    }

    /// Attach the next support track's events for this window.
    pub fn add_support(&mut self, mut events: Vec<Event>) {
        events.sort_by_key(|e| (e.time, !e.is_meta()));
        self.support_notes.push(notes_from_events(&events));
        self.supports.push(events);
    }

    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn sounding_count(&self) -> usize {
        sounding(&self.notes).count()
    }

    /// Mean duration of the melody notes, or None without notes.
    pub fn average_speed(&self) -> Option<f64> {
        mean_duration(sounding(&self.notes))
    }

    /// Mean duration of the melody notes starting before `split` (when
    /// `before`) or at or after it.
    pub fn partial_average_speed(&self, split: u64, before: bool) -> Option<f64> {
        mean_duration(sounding(&self.notes).filter(|n| (n.start < split) == before))
    }

    /// Chords sampled across melody and supports.
    ///
    /// `PerMeasure` samples the downbeat only. `PerSupportOnset` samples at
    /// each onset of the support line with the fewest sounding notes, or
    /// the downbeat if no support sounds in this measure.
    pub fn chords(&self, key: &Key, rhythm: HarmonicRhythm) -> Vec<Chord> {
        let mut lines: Vec<&[Note]> = vec![&self.notes];
        lines.extend(self.support_notes.iter().map(Vec::as_slice));

        let mut instants = vec![0];
        if rhythm == HarmonicRhythm::PerSupportOnset {
            let sparsest = self
                .support_notes
                .iter()
                .filter(|line| sounding(line).next().is_some())
                .min_by_key(|line| sounding(line).count());
            if let Some(line) = sparsest {
                instants = sounding(line).map(|n| n.start).collect();
                instants.dedup();
            }
        }
        instants
            .into_iter()
            .map(|t| chord_at(t, &lines, key))
            .collect()
    }

    /// Primary events back at absolute time.
    pub fn to_track(&self) -> Track {
        Track::from_events(
            self.events
                .iter()
                .map(|e| Event::new(e.time + self.start, e.kind.clone()))
                .collect(),
        )
    }
}

fn mean_duration<'a>(notes: impl Iterator<Item = &'a Note>) -> Option<f64> {
    let (count, total) = notes.fold((0u64, 0u64), |(c, t), n| (c + 1, t + n.duration()));
    (count > 0).then(|| total as f64 / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn measure_with_bass() -> Measure {
        let mut m = Measure::new(
            384,
            384,
            vec![
                Event::note_on(0, 0, 60, 90),
                Event::note_on(96, 0, 60, 0),
                Event::note_on(96, 0, 64, 90),
                Event::note_on(144, 0, 64, 0),
                Event::note_on(192, 0, 67, 90),
                Event::note_on(240, 0, 67, 0),
            ],
            false,
        );
        let mut bass = Track::new();
        bass.add_note(0, 192, 1, 48, 70);
        bass.add_note(192, 192, 1, 55, 70);
        let mut pad = Track::new();
        pad.add_note(0, 96, 2, 52, 60);
        pad.add_note(96, 96, 2, 53, 60);
        pad.add_note(192, 96, 2, 59, 60);
        m.add_support(bass.events);
        m.add_support(pad.events);
        m
    }

    #[test]
    fn notes_are_local() {
        let m = measure_with_bass();
        assert_eq!(m.notes[0], Note::new(0, 96, 60));
        assert_eq!(m.sounding_count(), 3);
        assert_eq!(m.support_notes[0].len(), 2);
        assert_eq!(m.end(), 768);
    }

    #[test]
    fn speeds() {
        let m = measure_with_bass();
        assert_eq!(m.average_speed(), Some(64.0));
        assert_eq!(m.partial_average_speed(192, true), Some(72.0));
        assert_eq!(m.partial_average_speed(192, false), Some(48.0));
        assert_eq!(m.partial_average_speed(0, true), None);
        let empty = Measure::new(0, 384, Vec::new(), false);
        assert_eq!(empty.average_speed(), None);
    }

    #[test]
    fn downbeat_chord() {
        let m = measure_with_bass();
        let chords = m.chords(&Key::major(0), HarmonicRhythm::PerMeasure);
        assert_eq!(chords.len(), 1);
        // C, C bass, E pad.
        assert_eq!(chords[0].pitches, vec![0, 4]);
    }

    #[test]
    fn chords_follow_sparsest_support() {
        let m = measure_with_bass();
        let chords = m.chords(&Key::major(0), HarmonicRhythm::PerSupportOnset);
        // The bass has two onsets, the pad three.
        assert_eq!(chords.len(), 2);
        // G in melody and bass, B in the pad.
        assert_eq!(chords[1].pitches, vec![7, 11]);
    }

    #[test]
    fn silent_supports_fall_back_to_downbeat() {
        let mut m = Measure::new(0, 384, vec![Event::note_on(0, 0, 62, 90)], false);
        m.add_support(Vec::new());
        let chords = m.chords(&Key::major(0), HarmonicRhythm::PerSupportOnset);
        assert_eq!(chords.len(), 1);
    }

    #[test]
    fn to_track_restores_absolute_times() {
        let m = measure_with_bass();
        let track = m.to_track();
        assert_eq!(track.events[0].time, 384);
        assert_eq!(track.end_time(), 384 + 240);
    }
}
