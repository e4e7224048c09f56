// Keys and diatonic scales.
//
// A key is stored the way a key-signature meta event stores it: a signed
// count of sharps (negative for flats) and a major/minor flag. The tonic
// comes from the circle of fifths: each sharp moves the major tonic up a
// fifth (7 semitones), and the relative minor sits a minor third below.
//
// The scale patterns are the Ionian and Aeolian interval sets. Beyond scale
// membership this module owns the two octave operations the harmony and
// voicing code need: folding a pitch into the key's canonical low octave
// (tonic .. tonic + 11) and raising a folded pitch back up to a track's
// typical register.

use motet_smf::KeySignature;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    /// Semitone intervals from the tonic to each scale degree.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            Mode::Major => [0, 2, 4, 5, 7, 9, 11],
            Mode::Minor => [0, 2, 3, 5, 7, 8, 10],
        }
    }
}

/// A key: sharps (negative for flats) and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub sharps: i8,
    pub mode: Mode,
}

impl Default for Key {
    /// C major.
    fn default() -> Self {
        Key::major(0)
    }
}

impl From<KeySignature> for Key {
    fn from(ks: KeySignature) -> Self {
        Key {
            sharps: ks.sharps,
            mode: if ks.minor { Mode::Minor } else { Mode::Major },
        }
    }
}

impl From<Key> for KeySignature {
    fn from(key: Key) -> Self {
        KeySignature {
            sharps: key.sharps,
            minor: key.mode == Mode::Minor,
        }
    }
}

impl Key {
    pub fn major(sharps: i8) -> Self {
        Key {
            sharps,
            mode: Mode::Major,
        }
    }

    pub fn minor(sharps: i8) -> Self {
        Key {
            sharps,
            mode: Mode::Minor,
        }
    }

    /// Pitch class (0 = C) of the tonic.
    pub fn tonic(&self) -> u8 {
        let major = (i32::from(self.sharps) * 7).rem_euclid(12) as u8;
        match self.mode {
            Mode::Major => major,
            Mode::Minor => (major + 9) % 12,
        }
    }

    /// Semitones from the tonic up to `pitch`, 0..=11.
    pub fn offset(&self, pitch: u8) -> u8 {
        (pitch % 12 + 12 - self.tonic()) % 12
    }

    /// Scale degree (0-6) of a pitch, or None if it is chromatic.
    pub fn scale_degree(&self, pitch: u8) -> Option<usize> {
        let offset = self.offset(pitch);
        self.mode.intervals().iter().position(|&iv| iv == offset)
    }

    /// Fold a pitch into the canonical octave starting at the tonic:
    /// `tonic..tonic + 12`.
    pub fn fold(&self, pitch: u8) -> u8 {
        self.tonic() + self.offset(pitch)
    }
}

/// Move a pitch by whole octaves into `base..base + 12`. Results above 127
/// drop an octave.
pub fn raise_to_octave(pitch: u8, base: u8) -> u8 {
    let pc = (pitch % 12 + 12 - base % 12) % 12;
    let mut out = base.saturating_add(pc);
    while out > 127 {
        out -= 12;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tonics_follow_circle_of_fifths() {
        assert_eq!(Key::major(0).tonic(), 0); // C
        assert_eq!(Key::major(1).tonic(), 7); // G
        assert_eq!(Key::major(2).tonic(), 2); // D
        assert_eq!(Key::major(-1).tonic(), 5); // F
        assert_eq!(Key::major(-3).tonic(), 3); // Eb
        assert_eq!(Key::minor(0).tonic(), 9); // A minor
        assert_eq!(Key::minor(1).tonic(), 4); // E minor
        assert_eq!(Key::minor(-2).tonic(), 7); // G minor
    }

    #[test]
    fn g_major_scale() {
        let key = Key::major(1);
        // G A B C D E F#
        for p in [67, 69, 71, 72, 74, 76, 78] {
            assert!(key.scale_degree(p).is_some(), "{p} should be in G major");
        }
        assert_eq!(key.scale_degree(67), Some(0));
        assert_eq!(key.scale_degree(74), Some(4));
        assert_eq!(key.scale_degree(77), None);
    }

    #[test]
    fn minor_scale_degrees() {
        let key = Key::minor(0);
        assert_eq!(key.scale_degree(69), Some(0)); // A
        assert_eq!(key.scale_degree(72), Some(2)); // C
        assert_eq!(key.scale_degree(68), None); // G#
    }

    #[test]
    fn fold_into_tonic_octave() {
        let key = Key::major(1); // tonic G = 7
        assert_eq!(key.fold(67), 7);
        assert_eq!(key.fold(60), 12); // C sits above the folded G
        assert_eq!(key.fold(78), 18); // F#
    }

    #[test]
    fn raise_places_pitch_class_at_base() {
        assert_eq!(raise_to_octave(7, 48), 55);
        assert_eq!(raise_to_octave(12, 48), 48);
        assert_eq!(raise_to_octave(4, 60), 64);
        assert_eq!(raise_to_octave(11, 120), 119);
    }

    #[test]
    fn key_signature_conversion() {
        let ks = KeySignature {
            sharps: -2,
            minor: true,
        };
        let key = Key::from(ks);
        assert_eq!(key, Key::minor(-2));
        assert_eq!(KeySignature::from(key), ks);
    }
}
