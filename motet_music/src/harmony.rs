// Chord sampling and Roman-numeral labels.
//
// A chord is whatever is sounding across the melody and support lines at
// one instant: the most recently started note of each line, folded into
// the key's tonic octave (see `Key::fold`), deduplicated and sorted. The
// chord keeps folded pitches rather than bare pitch classes so that the
// voicing code can raise tones back into a track's register while keeping
// their order above the tonic.
//
// `roman_numeral` tries every chord tone as a root, lowest first, against
// a fixed table of triad and seventh-chord interval sets. Numeral case
// shows quality (upper = major-third triads, lower = minor-third triads),
// a suffix marks the rest (`°`, `+`, `7`, `maj7`, `ø7`, `°7`). Roots outside
// the scale are spelled as a flatted upper neighbor (`bVI`), or sharp if no
// scale tone sits above. A set of tones no template recognizes gets the
// bare numeral of its lowest tone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::note::Note;

/// Tones sounding together, folded into one octave above the tonic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chord {
    /// Folded pitches in `tonic..tonic + 12`, ascending. These are not
    /// pitch classes once the tonic is above C: G-B-D in G major is
    /// `[7, 11, 14]`. Use [`Chord::pitch_classes`] for the 0-11 set.
    pub pitches: Vec<u8>,
}

impl Chord {
    /// Fold, deduplicate and sort.
    pub fn from_pitches(pitches: impl IntoIterator<Item = u8>, key: &Key) -> Self {
        let mut folded: Vec<u8> = pitches.into_iter().map(|p| key.fold(p)).collect();
        folded.sort_unstable();
        folded.dedup();
        Chord { pitches: folded }
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn contains_pitch_class(&self, pitch: u8) -> bool {
        self.pitches.iter().any(|&p| p % 12 == pitch % 12)
    }

    /// Pitch classes 0-11, ascending.
    pub fn pitch_classes(&self) -> Vec<u8> {
        let mut pcs: Vec<u8> = self.pitches.iter().map(|p| p % 12).collect();
        pcs.sort_unstable();
        pcs.dedup();
        pcs
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .pitches
            .iter()
            .map(|&p| crate::note::note_name(p))
            .collect();
        write!(f, "[{}]", names.join(" "))
    }
}

/// Sample the chord at `instant` across several note lines.
///
/// Each line contributes its latest-starting sounding note with
/// `start <= instant`, if any. Notes that have already stopped still count:
/// a sustained harmony is the last thing heard on that line.
pub fn chord_at(instant: u64, lines: &[&[Note]], key: &Key) -> Chord {
    let pitches = lines.iter().filter_map(|line| {
        line.iter()
            .filter(|n| n.start <= instant)
            .filter_map(|n| n.pitch.map(|p| (n.start, p)))
            .max_by_key(|&(start, _)| start)
            .map(|(_, p)| p)
    });
    Chord::from_pitches(pitches, key)
}

/// Case of the numeral and the suffix that follows it.
struct Template {
    intervals: &'static [u8],
    upper: bool,
    suffix: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template { intervals: &[0, 4, 7], upper: true, suffix: "" },
    Template { intervals: &[0, 3, 7], upper: false, suffix: "" },
    Template { intervals: &[0, 3, 6], upper: false, suffix: "°" },
    Template { intervals: &[0, 4, 8], upper: true, suffix: "+" },
    Template { intervals: &[0, 4, 7, 10], upper: true, suffix: "7" },
    Template { intervals: &[0, 4, 7, 11], upper: true, suffix: "maj7" },
    Template { intervals: &[0, 3, 7, 10], upper: false, suffix: "7" },
    Template { intervals: &[0, 3, 6, 10], upper: false, suffix: "ø7" },
    Template { intervals: &[0, 3, 6, 9], upper: false, suffix: "°7" },
];

const NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

/// Roman numeral of a chord in `key`, or "N.C." for an empty chord.
pub fn roman_numeral(chord: &Chord, key: &Key) -> String {
    let pcs = chord.pitch_classes();
    let Some(&lowest) = chord.pitches.first() else {
        return "N.C.".to_string();
    };

    // Try roots in the chord's folded order, lowest first.
    for &root in &chord.pitches {
        let mut intervals: Vec<u8> = pcs.iter().map(|&pc| (pc + 12 - root % 12) % 12).collect();
        intervals.sort_unstable();
        if let Some(t) = TEMPLATES.iter().find(|t| t.intervals == intervals.as_slice()) {
            let numeral = degree_numeral(root, key);
            let numeral = if t.upper {
                numeral
            } else {
                numeral.to_lowercase()
            };
            return format!("{numeral}{}", t.suffix);
        }
    }
    degree_numeral(lowest, key)
}

/// Uppercase numeral for the degree of `pitch`, with an accidental prefix
/// for chromatic pitches.
fn degree_numeral(pitch: u8, key: &Key) -> String {
    if let Some(d) = key.scale_degree(pitch) {
        return NUMERALS[d].to_string();
    }
    if let Some(d) = key.scale_degree(pitch % 12 + 1) {
        return format!("b{}", NUMERALS[d]);
    }
    match key.scale_degree(pitch % 12 + 11) {
        Some(d) => format!("#{}", NUMERALS[d]),
        None => "?".to_string(),
    }
}
