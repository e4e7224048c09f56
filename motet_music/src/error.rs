// Errors for analysis and generation.
//
// Codec failures pass through as `Smf`. `EmptyCorpus` covers every case
// where a stage was handed nothing to learn from (no notes, no measures, an
// empty pitch chain), so callers never see a division by zero or an empty
// random pick. `GenerationExhausted` carries the longest partial sequence
// the Markov walk reached so the caller can decide whether to retry with a
// different seed. `InvalidChain` rejects a loaded transition table that
// breaks the shape `build_pitch_chain` guarantees.

use motet_smf::SmfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Smf(#[from] SmfError),
    #[error("nothing to work from: {0}")]
    EmptyCorpus(&'static str),
    #[error("generation stalled at position {position} after {attempts} attempts")]
    GenerationExhausted {
        partial: Vec<u8>,
        position: usize,
        attempts: usize,
    },
    #[error("invalid pitch chain: {0}")]
    InvalidChain(String),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
