// Notes derived from event streams.
//
// A `Note` is the analysis-side view of a Note-On/Note-Off pair: start and
// stop tick plus a pitch, or no pitch for a rest. Notes are always derived
// from events, never stored in files directly.
//
// Also holds the note-name helpers. Names put the octave first ("4C#",
// "10G"), and octave n starts at key 12 * n, so "5C" is key 60.

use std::collections::BTreeMap;

use motet_smf::Event;
use serde::{Deserialize, Serialize};

/// A sounding note or a rest. `pitch == None` marks a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub start: u64,
    pub stop: u64,
    pub pitch: Option<u8>,
}

impl Note {
    pub fn new(start: u64, stop: u64, pitch: u8) -> Self {
        debug_assert!(stop >= start);
        Self {
            start,
            stop,
            pitch: Some(pitch),
        }
    }

    pub fn rest(start: u64, stop: u64) -> Self {
        debug_assert!(stop >= start);
        Self {
            start,
            stop,
            pitch: None,
        }
    }

    pub fn duration(&self) -> u64 {
        self.stop - self.start
    }

    pub fn is_rest(&self) -> bool {
        self.pitch.is_none()
    }

    /// Same duration and pitch. Start times are ignored, which is what the
    /// phrase matcher compares.
    pub fn same_shape(&self, other: &Note) -> bool {
        self.duration() == other.duration() && self.pitch == other.pitch
    }

    pub fn shifted(&self, offset: u64) -> Note {
        Note {
            start: self.start + offset,
            stop: self.stop + offset,
            pitch: self.pitch,
        }
    }
}

/// Pair note starts with note ends by key, in time order.
///
/// A Note-Off or zero-velocity Note-On closes the oldest open note of the
/// same key. Ends with no open note and starts that are never closed are
/// dropped. The result is sorted by start time, then pitch.
pub fn notes_from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<Note> {
    let mut sorted: Vec<&Event> = events.into_iter().collect();
    sorted.sort_by_key(|e| e.time);

    let mut open: BTreeMap<u8, Vec<u64>> = BTreeMap::new();
    let mut notes = Vec::new();
    for event in sorted {
        let Some(key) = event.key() else { continue };
        if event.is_note_start() {
            open.entry(key).or_default().push(event.time);
        } else if event.is_note_end() {
            if let Some(starts) = open.get_mut(&key).filter(|s| !s.is_empty()) {
                let start = starts.remove(0);
                notes.push(Note::new(start, event.time.max(start), key));
            }
        }
    }
    notes.sort_by_key(|n| (n.start, n.pitch));
    notes
}

/// Fill silent gaps with rests: one before the first note if it starts
/// after `origin`, and one between any two notes that do not touch.
pub fn pad_rests(notes: &[Note], origin: u64) -> Vec<Note> {
    let mut out = Vec::with_capacity(notes.len() * 2);
    let mut reach = origin;
    for note in notes {
        if note.start > reach {
            out.push(Note::rest(reach, note.start));
        }
        out.push(*note);
        reach = reach.max(note.stop);
    }
    out
}

/// Notes that are not rests.
pub fn sounding(notes: &[Note]) -> impl Iterator<Item = &Note> {
    notes.iter().filter(|n| !n.is_rest())
}

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Display name for a key number, octave first: 61 -> "5C#".
pub fn note_name(key: u8) -> String {
    format!("{}{}", key / 12, SHARP_NAMES[usize::from(key % 12)])
}

/// Parse an octave-first note name such as "4C", "3f#", "10G" or "5Bb".
///
/// Returns `None` for malformed names and for anything outside 0..=127.
pub fn parse_note_name(name: &str) -> Option<u8> {
    let digits = name.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let octave: i32 = name[..digits].parse().ok()?;
    let mut rest = name[digits..].chars();
    let letter = match rest.next()?.to_ascii_lowercase() {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };
    let accidental = match rest.as_str() {
        "" => 0,
        "#" => 1,
        "b" => -1,
        _ => return None,
    };
    u8::try_from(octave * 12 + letter + accidental)
        .ok()
        .filter(|&k| k <= 127)
}
