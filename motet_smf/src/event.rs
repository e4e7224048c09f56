// Timestamped track events.
//
// An `Event` pairs an absolute tick time with an `EventKind`. Absolute times
// are what every consumer wants (segmentation, merging, chord sampling);
// delta-times exist only on the wire and are computed by `track.rs` during
// encode.
//
// Note-On, Note-Off and Program Change get named variants because the
// analysis layer matches on them constantly. Every other channel-voice
// message (aftertouch, control change, pitch bend) is kept in `Channel` with
// its raw status and data bytes so a decode/encode cycle preserves it.

use serde::{Deserialize, Serialize};

use crate::meta::MetaEvent;

/// A single event at an absolute tick position within its track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub time: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NoteOff { channel: u8, key: u8, velocity: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Any other channel-voice message. `status` includes the channel
    /// nibble; `data[1]` is unused for single-data-byte messages (0xD0).
    Channel { status: u8, data: [u8; 2] },
    /// `F0` or `F7` system-exclusive block with its raw payload.
    SysEx { status: u8, data: Vec<u8> },
    Meta(MetaEvent),
}

impl Event {
    pub fn new(time: u64, kind: EventKind) -> Self {
        Self { time, kind }
    }

    pub fn note_on(time: u64, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(
            time,
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            },
        )
    }

    pub fn note_off(time: u64, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(
            time,
            EventKind::NoteOff {
                channel,
                key,
                velocity,
            },
        )
    }

    pub fn program_change(time: u64, channel: u8, program: u8) -> Self {
        Self::new(time, EventKind::ProgramChange { channel, program })
    }

    pub fn meta(time: u64, meta: impl Into<MetaEvent>) -> Self {
        Self::new(time, EventKind::Meta(meta.into()))
    }

    pub fn is_meta(&self) -> bool {
        matches!(self.kind, EventKind::Meta(_))
    }

    /// A Note-On with non-zero velocity.
    pub fn is_note_start(&self) -> bool {
        matches!(self.kind, EventKind::NoteOn { velocity, .. } if velocity > 0)
    }

    /// A Note-Off, or a Note-On with zero velocity.
    pub fn is_note_end(&self) -> bool {
        matches!(
            self.kind,
            EventKind::NoteOff { .. } | EventKind::NoteOn { velocity: 0, .. }
        )
    }

    /// Key number of a note event.
    pub fn key(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOn { key, .. } | EventKind::NoteOff { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Velocity of a note event.
    pub fn velocity(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOn { velocity, .. } | EventKind::NoteOff { velocity, .. } => {
                Some(velocity)
            }
            _ => None,
        }
    }

    /// MIDI channel (0-15) of channel-voice events.
    pub fn channel(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOff { channel, .. }
            | EventKind::NoteOn { channel, .. }
            | EventKind::ProgramChange { channel, .. } => Some(channel),
            EventKind::Channel { status, .. } => Some(status & 0x0F),
            EventKind::SysEx { .. } | EventKind::Meta(_) => None,
        }
    }

    pub fn as_meta(&self) -> Option<&MetaEvent> {
        match &self.kind {
            EventKind::Meta(m) => Some(m),
            _ => None,
        }
    }

    /// The status byte this event is written with.
    pub fn status_byte(&self) -> u8 {
        match &self.kind {
            EventKind::NoteOff { channel, .. } => 0x80 | (channel & 0x0F),
            EventKind::NoteOn { channel, .. } => 0x90 | (channel & 0x0F),
            EventKind::ProgramChange { channel, .. } => 0xC0 | (channel & 0x0F),
            EventKind::Channel { status, .. } => *status,
            EventKind::SysEx { status, .. } => *status,
            EventKind::Meta(_) => 0xFF,
        }
    }
}

/// Number of data bytes following a channel-voice status byte.
pub fn channel_data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

/// Build the typed kind for a channel-voice status and its data bytes.
pub(crate) fn channel_kind(status: u8, data: [u8; 2]) -> EventKind {
    let channel = status & 0x0F;
    match status & 0xF0 {
        0x80 => EventKind::NoteOff {
            channel,
            key: data[0],
            velocity: data[1],
        },
        0x90 => EventKind::NoteOn {
            channel,
            key: data[0],
            velocity: data[1],
        },
        0xC0 => EventKind::ProgramChange {
            channel,
            program: data[0],
        },
        _ => EventKind::Channel { status, data },
    }
}
