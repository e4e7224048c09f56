// Meta events and their typed views.
//
// On the wire a meta event is `FF <type> <vlq length> <payload>`. The codec
// keeps every meta event as an opaque `MetaEvent { meta_type, data }` so that
// unknown types survive a decode/encode cycle untouched. The handful of types
// the analysis layer cares about get small typed wrappers here with
// conversions in both directions:
//
// - `Tempo`          (0x51): 3-byte microseconds per quarter note.
// - `TimeSignature`  (0x58): numerator, log2(denominator), MIDI clocks per
//                            metronome click, 32nd notes per quarter.
// - `KeySignature`   (0x59): signed sharp count (negative = flats), minor flag.
// - end of track     (0x2F): empty payload. The codec strips and re-appends
//                            it; callers rarely need to build one.

use serde::{Deserialize, Serialize};

/// Well-known meta event type bytes.
pub mod meta_type {
    pub const SEQUENCE_NUMBER: u8 = 0x00;
    pub const TEXT: u8 = 0x01;
    pub const TRACK_NAME: u8 = 0x03;
    pub const INSTRUMENT_NAME: u8 = 0x04;
    pub const CHANNEL_PREFIX: u8 = 0x20;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
    pub const TIME_SIGNATURE: u8 = 0x58;
    pub const KEY_SIGNATURE: u8 = 0x59;
}

/// A meta event with its raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaEvent {
    pub meta_type: u8,
    pub data: Vec<u8>,
}

impl MetaEvent {
    pub fn new(meta_type: u8, data: Vec<u8>) -> Self {
        Self { meta_type, data }
    }

    pub fn end_of_track() -> Self {
        Self::new(meta_type::END_OF_TRACK, Vec::new())
    }

    pub fn track_name(name: &str) -> Self {
        Self::new(meta_type::TRACK_NAME, name.as_bytes().to_vec())
    }

    pub fn is_end_of_track(&self) -> bool {
        self.meta_type == meta_type::END_OF_TRACK
    }

    /// Typed view of a tempo event, `None` for other types or short payloads.
    pub fn tempo(&self) -> Option<Tempo> {
        if self.meta_type != meta_type::TEMPO || self.data.len() < 3 {
            return None;
        }
        let micros = u32::from_be_bytes([0, self.data[0], self.data[1], self.data[2]]);
        Some(Tempo::from_micros(micros))
    }

    pub fn time_signature(&self) -> Option<TimeSignature> {
        if self.meta_type != meta_type::TIME_SIGNATURE || self.data.len() < 4 {
            return None;
        }
        // Denominators beyond 2^7 do not occur in practice and would not fit
        // the `u8` we store.
        if self.data[1] > 7 || self.data[0] == 0 {
            return None;
        }
        Some(TimeSignature {
            numerator: self.data[0],
            denominator: 1 << self.data[1],
            clocks_per_click: self.data[2],
            thirty_seconds_per_quarter: self.data[3],
        })
    }

    pub fn key_signature(&self) -> Option<KeySignature> {
        if self.meta_type != meta_type::KEY_SIGNATURE || self.data.len() < 2 {
            return None;
        }
        Some(KeySignature {
            sharps: self.data[0] as i8,
            minor: self.data[1] != 0,
        })
    }

    /// UTF-8 (lossy) text for text-like meta types.
    pub fn text(&self) -> Option<String> {
        matches!(self.meta_type, 0x01..=0x0F)
            .then(|| String::from_utf8_lossy(&self.data).into_owned())
    }
}

/// Tempo as microseconds per quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tempo {
    micros_per_quarter: u32,
}

impl Tempo {
    /// Clamped to the 24-bit payload range; zero becomes one.
    pub fn from_micros(micros: u32) -> Self {
        Self {
            micros_per_quarter: micros.clamp(1, 0x00FF_FFFF),
        }
    }

    /// Tempo for a whole-number BPM. A BPM of zero is treated as one.
    pub fn from_bpm(bpm: u32) -> Self {
        Self::from_micros(60_000_000 / bpm.max(1))
    }

    pub fn micros_per_quarter(self) -> u32 {
        self.micros_per_quarter
    }

    /// Beats per minute, rounded to the nearest whole beat.
    pub fn bpm(self) -> u32 {
        (60_000_000 + self.micros_per_quarter / 2) / self.micros_per_quarter
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::from_bpm(120)
    }
}

impl From<Tempo> for MetaEvent {
    fn from(t: Tempo) -> Self {
        let b = t.micros_per_quarter.to_be_bytes();
        MetaEvent::new(meta_type::TEMPO, vec![b[1], b[2], b[3]])
    }
}

/// Time signature. `denominator` holds the actual note value (4 for
/// quarter notes), not its base-2 logarithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
    pub clocks_per_click: u8,
    pub thirty_seconds_per_quarter: u8,
}

impl TimeSignature {
    /// A signature with the conventional 24 clocks per click and 8 thirty-
    /// second notes per quarter. `denominator` is rounded down to a power of
    /// two.
    pub fn new(numerator: u8, denominator: u8) -> Self {
        let den = denominator.max(1);
        Self {
            numerator: numerator.max(1),
            denominator: 1 << (7 - den.leading_zeros().min(7)),
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        }
    }

    /// Ticks in one measure at the given resolution (ticks per quarter).
    pub fn ticks_per_measure(&self, resolution: u16) -> u32 {
        u32::from(self.numerator) * u32::from(resolution) * 4 / u32::from(self.denominator)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<TimeSignature> for MetaEvent {
    fn from(ts: TimeSignature) -> Self {
        MetaEvent::new(
            meta_type::TIME_SIGNATURE,
            vec![
                ts.numerator,
                ts.denominator.trailing_zeros() as u8,
                ts.clocks_per_click,
                ts.thirty_seconds_per_quarter,
            ],
        )
    }
}

/// Key signature: sharps (negative for flats) and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeySignature {
    pub sharps: i8,
    pub minor: bool,
}

impl From<KeySignature> for MetaEvent {
    fn from(ks: KeySignature) -> Self {
        MetaEvent::new(
            meta_type::KEY_SIGNATURE,
            vec![ks.sharps as u8, u8::from(ks.minor)],
        )
    }
}
