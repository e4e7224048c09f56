// Error types for the SMF codec.
//
// Two layers: `MalformedTrack` describes why one track body failed to decode
// and where (byte offset relative to the start of the body). `SmfError` wraps
// everything that can go wrong at file level, including a malformed track
// tagged with its index, so a caller can tell which sibling failed without
// losing the others (see `SmfFile::parse_lenient`).

use thiserror::Error;

/// What was wrong with a track body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedKind {
    /// The buffer ended in the middle of an event.
    #[error("buffer ended mid-event")]
    Truncated,
    /// A variable-length quantity ran past four bytes.
    #[error("variable-length quantity longer than 4 bytes")]
    VlqTooLong,
    /// A data byte appeared before any channel status established running status.
    #[error("data byte with no running status in effect")]
    MissingStatus,
    /// A status byte that cannot appear in a file (system common / realtime).
    #[error("unexpected status byte {0:#04x}")]
    UnexpectedStatus(u8),
    /// A channel message data byte had its high bit set.
    #[error("data byte {0:#04x} has its high bit set")]
    DataOutOfRange(u8),
    /// The body ran out before the end-of-track meta event.
    #[error("track ended without an end-of-track event")]
    MissingEndOfTrack,
}

/// A track body that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed track at byte {offset}: {kind}")]
pub struct MalformedTrack {
    offset: usize,
    kind: MalformedKind,
}

impl MalformedTrack {
    pub const fn new(offset: usize, kind: MalformedKind) -> Self {
        Self { offset, kind }
    }

    /// Byte offset into the track body where decoding stopped.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn kind(&self) -> MalformedKind {
        self.kind
    }
}

/// File-level codec errors.
#[derive(Debug, Error)]
pub enum SmfError {
    /// The `MThd` chunk was missing or unusable.
    #[error("malformed header: {reason}")]
    Header { reason: &'static str },
    /// A chunk's framing (tag or length) was invalid.
    #[error("malformed chunk at byte {offset}: {reason}")]
    Chunk { offset: usize, reason: &'static str },
    /// One track's body failed to decode.
    #[error("track {index}: {source}")]
    Track {
        index: usize,
        #[source]
        source: MalformedTrack,
    },
    /// A delta-time (or length field) too large for a 28-bit
    /// variable-length quantity.
    #[error("delta {0} exceeds the variable-length quantity limit")]
    DeltaOutOfRange(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for file-level operations.
pub type SmfResult<T> = Result<T, SmfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_track_reports_offset() {
        let err = MalformedTrack::new(17, MalformedKind::Truncated);
        assert_eq!(err.offset(), 17);
        assert_eq!(err.kind(), MalformedKind::Truncated);
        assert_eq!(
            err.to_string(),
            "malformed track at byte 17: buffer ended mid-event"
        );
    }

    #[test]
    fn track_error_keeps_source() {
        let err = SmfError::Track {
            index: 2,
            source: MalformedTrack::new(3, MalformedKind::UnexpectedStatus(0xF4)),
        };
        assert_eq!(
            err.to_string(),
            "track 2: malformed track at byte 3: unexpected status byte 0xf4"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
