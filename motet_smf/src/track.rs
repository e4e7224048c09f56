// Track bodies: decode and encode the event stream inside one `MTrk` chunk.
//
// Decode reads `<vlq delta> <event>` pairs until the end-of-track meta
// event, accumulating deltas into absolute times. A leading byte without the
// high bit reuses the previous channel status (running status). Meta and
// sysex events do not disturb the running status on the way in, so files
// that rely on it across a meta event still decode.
//
// Encode is canonical rather than a replay of the input: events are stably
// sorted by time with meta events first among equals, channel status bytes
// are elided whenever they repeat, and every meta or sysex event resets the
// running status so the next channel event carries its status byte again.
// The end-of-track event is always regenerated.
//
// For a body that was itself produced in this canonical form,
// `encode_track(&decode_track(b)?)` reproduces `b` exactly.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{MalformedKind, MalformedTrack, SmfError};
use crate::event::{Event, EventKind, channel_data_len, channel_kind};
use crate::meta::MetaEvent;
use crate::vlq::{read_vlq, write_vlq};

/// The events of one track, with absolute times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub events: Vec<Event>,
    /// Absolute time of the end-of-track event when it was read from a file
    /// or set explicitly. Encode never places the end earlier than the last
    /// event.
    pub end_of_track: Option<u64>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<Event>) -> Self {
        Self {
            events,
            end_of_track: None,
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Add a note as a Note-On followed, `duration` ticks later, by a
    /// zero-velocity Note-On.
    pub fn add_note(&mut self, time: u64, duration: u64, channel: u8, key: u8, velocity: u8) {
        self.events.push(Event::note_on(time, channel, key, velocity));
        self.events
            .push(Event::note_on(time + duration, channel, key, 0));
    }

    pub fn change_instrument(&mut self, time: u64, channel: u8, program: u8) {
        self.events
            .push(Event::program_change(time, channel, program));
    }

    pub fn add_meta(&mut self, time: u64, meta: impl Into<MetaEvent>) {
        self.events.push(Event::meta(time, meta));
    }

    /// Time of the last event, or of the explicit end if that is later.
    pub fn end_time(&self) -> u64 {
        let last = self.events.iter().map(|e| e.time).max().unwrap_or(0);
        last.max(self.end_of_track.unwrap_or(0))
    }

    /// Stable sort by time, meta events ahead of same-time channel events.
    pub fn sort(&mut self) {
        self.events.sort_by_key(|e| (e.time, !e.is_meta()));
    }

    /// Events in encode order, end-of-track events excluded.
    pub fn sorted_events(&self) -> Vec<&Event> {
        let mut out: Vec<&Event> = self
            .events
            .iter()
            .filter(|e| !e.as_meta().is_some_and(MetaEvent::is_end_of_track))
            .collect();
        out.sort_by_key(|e| (e.time, !e.is_meta()));
        out
    }

    /// First meta event of the given type and its time.
    pub fn find_meta(&self, meta_type: u8) -> Option<(u64, &MetaEvent)> {
        self.sorted_events().into_iter().find_map(|e| {
            e.as_meta()
                .filter(|m| m.meta_type == meta_type)
                .map(|m| (e.time, m))
        })
    }

    /// Program of the first Program Change, if any.
    pub fn first_program(&self) -> Option<u8> {
        self.sorted_events().into_iter().find_map(|e| match e.kind {
            EventKind::ProgramChange { program, .. } => Some(program),
            _ => None,
        })
    }
}

/// Cursor over a track body that tags every failure with its offset.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn fail(&self, kind: MalformedKind) -> MalformedTrack {
        MalformedTrack::new(self.pos, kind)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Result<u8, MalformedTrack> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.fail(MalformedKind::Truncated))
    }

    fn byte(&mut self) -> Result<u8, MalformedTrack> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn vlq(&mut self) -> Result<u32, MalformedTrack> {
        let (value, n) = read_vlq(&self.bytes[self.pos.min(self.bytes.len())..])
            .map_err(|kind| self.fail(kind))?;
        self.pos += n;
        Ok(value)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MalformedTrack> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| MalformedTrack::new(self.bytes.len(), MalformedKind::Truncated))?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn data_byte(&mut self) -> Result<u8, MalformedTrack> {
        let b = self.peek()?;
        if b & 0x80 != 0 {
            return Err(self.fail(MalformedKind::DataOutOfRange(b)));
        }
        self.pos += 1;
        Ok(b)
    }
}

/// Decode one track body (the bytes inside an `MTrk` chunk).
///
/// The end-of-track event is consumed and its time recorded in
/// `Track::end_of_track`; bytes after it are ignored.
pub fn decode_track(bytes: &[u8]) -> Result<Track, MalformedTrack> {
    let mut r = Reader { bytes, pos: 0 };
    let mut events = Vec::new();
    let mut time: u64 = 0;
    let mut running: Option<u8> = None;

    loop {
        if r.at_end() {
            return Err(r.fail(MalformedKind::MissingEndOfTrack));
        }
        time += u64::from(r.vlq()?);

        let lead = r.peek()?;
        let status = if lead & 0x80 != 0 {
            r.pos += 1;
            lead
        } else {
            running.ok_or_else(|| r.fail(MalformedKind::MissingStatus))?
        };

        let kind = match status {
            0xFF => {
                let meta_type = r.byte()?;
                let len = r.vlq()? as usize;
                let data = r.take(len)?.to_vec();
                let meta = MetaEvent::new(meta_type, data);
                if meta.is_end_of_track() {
                    if !r.at_end() {
                        debug!(
                            "ignoring {} bytes after end of track",
                            bytes.len() - r.pos
                        );
                    }
                    return Ok(Track {
                        events,
                        end_of_track: Some(time),
                    });
                }
                EventKind::Meta(meta)
            }
            0xF0 | 0xF7 => {
                let len = r.vlq()? as usize;
                EventKind::SysEx {
                    status,
                    data: r.take(len)?.to_vec(),
                }
            }
            0xF1..=0xFE => {
                return Err(MalformedTrack::new(
                    r.pos.saturating_sub(1),
                    MalformedKind::UnexpectedStatus(status),
                ));
            }
            _ => {
                running = Some(status);
                let mut data = [0u8; 2];
                for slot in data.iter_mut().take(channel_data_len(status)) {
                    *slot = r.data_byte()?;
                }
                channel_kind(status, data)
            }
        };
        events.push(Event { time, kind });
    }
}

/// Encode a track body, appending a fresh end-of-track event.
///
/// Fails only if two consecutive events are further apart than a
/// variable-length quantity can express.
pub fn encode_track(track: &Track) -> Result<Vec<u8>, SmfError> {
    let mut out = Vec::new();
    let mut prev_time: u64 = 0;
    let mut running: Option<u8> = None;

    for event in track.sorted_events() {
        write_vlq(&mut out, event.time - prev_time)?;
        prev_time = event.time;

        match &event.kind {
            EventKind::Meta(meta) => {
                out.push(0xFF);
                out.push(meta.meta_type);
                write_vlq(&mut out, meta.data.len() as u64)?;
                out.extend_from_slice(&meta.data);
                running = None;
            }
            EventKind::SysEx { status, data } => {
                out.push(*status);
                write_vlq(&mut out, data.len() as u64)?;
                out.extend_from_slice(data);
                running = None;
            }
            EventKind::NoteOff { key, velocity, .. } | EventKind::NoteOn { key, velocity, .. } => {
                write_channel(&mut out, &mut running, event.status_byte(), [*key, *velocity]);
            }
            EventKind::ProgramChange { program, .. } => {
                write_channel(&mut out, &mut running, event.status_byte(), [*program, 0]);
            }
            EventKind::Channel { status, data } => {
                write_channel(&mut out, &mut running, *status, *data);
            }
        }
    }

    let end = track.end_of_track.unwrap_or(prev_time).max(prev_time);
    write_vlq(&mut out, end - prev_time)?;
    out.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    Ok(out)
}

fn write_channel(out: &mut Vec<u8>, running: &mut Option<u8>, status: u8, data: [u8; 2]) {
    if *running != Some(status) {
        out.push(status);
        *running = Some(status);
    }
    for &b in data.iter().take(channel_data_len(status)) {
        out.push(b & 0x7F);
    }
}
