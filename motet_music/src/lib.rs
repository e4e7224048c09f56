// Motet: structural analysis and recomposition of MIDI pieces.
//
// Takes a decoded multi-track piece, cuts it into measures, finds the
// phrases it repeats and varies, reads off its harmony, learns its pitch
// habits in an order-k Markov chain, and writes new pieces back out through
// `motet_smf`. The first track with notes is treated as the melody and the
// rest as supports.
//
// Architecture, leaves first:
// - note.rs:     Note/rest values derived from event pairs; note names
// - key.rs:      Major/minor keys from key signatures, scale degrees, octave folding
// - harmony.rs:  Chord sampling across lines, Roman-numeral labels
// - measure.rs:  One window of the melody plus aligned support lines
// - segment.rs:  Window grid, duration quantization, tie-splitting
// - phrase.rs:   Leaf/composite phrase tree with shape labels
// - identify.rs: Exact/derived phrase matching, simplify and combine folds
// - markov.rs:   Pitch chain training and backtracking generation
// - session.rs:  `analyze`: the whole pipeline for one piece
// - compose.rs:  Song synthesis and random segment extraction
// - config.rs:   Tunable parameters, JSON loadable
// - error.rs:    `AnalysisError`
//
// All randomness comes through `motet_prng::RandomSource`, and every map is
// a BTreeMap, so a fixed seed reproduces the same output.

pub mod compose;
pub mod config;
pub mod error;
pub mod harmony;
pub mod identify;
pub mod key;
pub mod markov;
pub mod measure;
pub mod note;
pub mod phrase;
pub mod segment;
pub mod session;

pub use compose::{compose_song, random_segment};
pub use config::MotetConfig;
pub use error::{AnalysisError, AnalysisResult};
pub use harmony::{Chord, chord_at, roman_numeral};
pub use identify::identify_phrases;
pub use key::{Key, Mode};
pub use markov::{PitchChain, build_pitch_chain, generate_pitches};
pub use measure::Measure;
pub use phrase::{Phrase, PhraseBody};
pub use segment::{segment_into_measures, segment_with_meter};
pub use session::{PieceAnalysis, analyze};
