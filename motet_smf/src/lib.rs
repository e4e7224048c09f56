// motet_smf: Standard MIDI File codec.
//
// Converts between the on-disk byte layout of a MIDI file and per-track
// sequences of events with absolute tick times. Has no knowledge of measures,
// phrases or harmony; `motet_music` builds all of that on top of `Track`.
//
// Module overview:
// - `vlq.rs`:    Variable-length quantities (delta-times, meta lengths).
// - `event.rs`:  `Event` / `EventKind`, the decoded form of one event.
// - `meta.rs`:   `MetaEvent` plus typed tempo, time and key signatures.
// - `track.rs`:  `Track`, `decode_track`, `encode_track` (running status,
//                canonical ordering, end-of-track handling).
// - `file.rs`:   `SmfFile` and `Header`: `MThd`/`MTrk` chunk framing and
//                whole-file read/write.
// - `error.rs`:  `MalformedTrack` (per track, with byte offset) and
//                `SmfError` (file level).
//
// Design decisions:
// - **Absolute times everywhere.** Deltas exist only on the wire.
// - **Tolerant decode, canonical encode.** See `track.rs`.
// - **A bad track does not poison its siblings.** Track bodies decode
//   independently; `SmfFile::parse_lenient` returns the good ones.

pub mod error;
pub mod event;
pub mod file;
pub mod meta;
pub mod track;
pub mod vlq;

pub use error::{MalformedKind, MalformedTrack, SmfError, SmfResult};
pub use event::{Event, EventKind};
pub use file::{Header, SmfFile};
pub use meta::{KeySignature, MetaEvent, Tempo, TimeSignature, meta_type};
pub use track::{Track, decode_track, encode_track};
pub use vlq::{VLQ_MAX, encode_vlq, read_vlq, write_vlq};
