// Whole-file framing: the `MThd` header chunk followed by `MTrk` chunks.
//
// Every chunk is a 4-byte ASCII tag, a 4-byte big-endian body length, then
// the body. The header body is 6 bytes: format, track count, and division
// (ticks per quarter note when the top bit is clear). Chunks with tags other
// than `MTrk` after the header are skipped, as the format requires.
//
// Files are always written as format 1. Formats 0, 1 and 2 are accepted on
// read; SMPTE time division is rejected since nothing downstream can
// interpret it. `parse` fails on the first malformed track; `parse_lenient`
// keeps the tracks that decoded and reports the rest.

use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{SmfError, SmfResult};
use crate::meta::{KeySignature, MetaEvent, Tempo, TimeSignature, meta_type};
use crate::track::{Track, decode_track, encode_track};

const HEADER_TAG: &[u8; 4] = b"MThd";
const TRACK_TAG: &[u8; 4] = b"MTrk";

/// Contents of the `MThd` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub format: u16,
    pub track_count: u16,
    /// Ticks per quarter note.
    pub resolution: u16,
}

/// A parsed Standard MIDI File.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmfFile {
    pub format: u16,
    pub resolution: u16,
    pub tracks: Vec<Track>,
}

struct Chunk<'a> {
    tag: [u8; 4],
    offset: usize,
    body: &'a [u8],
}

fn read_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

/// Split a buffer into chunks. A chunk whose declared length runs past the
/// end of the buffer is an error; a partial chunk header is too.
fn split_chunks(bytes: &[u8]) -> SmfResult<Vec<Chunk<'_>>> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes.len() - pos < 8 {
            return Err(SmfError::Chunk {
                offset: pos,
                reason: "truncated chunk header",
            });
        }
        let tag = [bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]];
        let len = u32::from_be_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        let start = pos + 8;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= bytes.len())
            .ok_or(SmfError::Chunk {
                offset: pos,
                reason: "chunk length runs past end of file",
            })?;
        chunks.push(Chunk {
            tag,
            offset: pos,
            body: &bytes[start..end],
        });
        pos = end;
    }
    Ok(chunks)
}

fn parse_header(chunk: Option<&Chunk<'_>>) -> SmfResult<Header> {
    let Some(chunk) = chunk.filter(|c| &c.tag == HEADER_TAG) else {
        return Err(SmfError::Header {
            reason: "file does not start with MThd",
        });
    };
    if chunk.body.len() < 6 {
        return Err(SmfError::Header {
            reason: "header chunk shorter than 6 bytes",
        });
    }
    let format = read_u16(&chunk.body[0..2]);
    let track_count = read_u16(&chunk.body[2..4]);
    let division = read_u16(&chunk.body[4..6]);
    if format > 2 {
        return Err(SmfError::Header {
            reason: "unknown file format",
        });
    }
    if division & 0x8000 != 0 {
        return Err(SmfError::Header {
            reason: "SMPTE time division is not supported",
        });
    }
    if division == 0 {
        return Err(SmfError::Header {
            reason: "resolution of zero ticks per quarter",
        });
    }
    Ok(Header {
        format,
        track_count,
        resolution: division,
    })
}

impl SmfFile {
    /// An empty format-1 file.
    pub fn new(resolution: u16) -> Self {
        Self {
            format: 1,
            resolution,
            tracks: Vec::new(),
        }
    }

    /// The header `to_bytes` writes.
    pub fn header(&self) -> Header {
        Header {
            format: 1,
            track_count: self.tracks.len().min(usize::from(u16::MAX)) as u16,
            resolution: self.resolution,
        }
    }

    /// Parse a complete file, failing on the first malformed track.
    pub fn parse(bytes: &[u8]) -> SmfResult<Self> {
        let (file, mut errors) = Self::parse_inner(bytes)?;
        if errors.is_empty() {
            Ok(file)
        } else {
            Err(errors.swap_remove(0))
        }
    }

    /// Parse a file, keeping every track that decodes. Malformed tracks are
    /// left out of `tracks` and returned as `SmfError::Track` values tagged
    /// with their chunk index. Header and chunk framing errors are still
    /// fatal.
    pub fn parse_lenient(bytes: &[u8]) -> SmfResult<(Self, Vec<SmfError>)> {
        Self::parse_inner(bytes)
    }

    fn parse_inner(bytes: &[u8]) -> SmfResult<(Self, Vec<SmfError>)> {
        let chunks = split_chunks(bytes)?;
        let header = parse_header(chunks.first())?;

        let mut tracks = Vec::new();
        let mut errors = Vec::new();
        let mut index = 0;
        for chunk in chunks.iter().skip(1) {
            if &chunk.tag != TRACK_TAG {
                debug!(
                    "skipping unknown chunk {:?} at byte {}",
                    String::from_utf8_lossy(&chunk.tag),
                    chunk.offset
                );
                continue;
            }
            match decode_track(chunk.body) {
                Ok(track) => {
                    debug!("track {index}: {} events", track.events.len());
                    tracks.push(track);
                }
                Err(source) => {
                    warn!("track {index} is malformed: {source}");
                    errors.push(SmfError::Track { index, source });
                }
            }
            index += 1;
        }

        if index != usize::from(header.track_count) {
            warn!(
                "header declares {} tracks, found {index}",
                header.track_count
            );
        }

        Ok((
            Self {
                format: header.format,
                resolution: header.resolution,
                tracks,
            },
            errors,
        ))
    }

    /// Serialize as a format-1 file.
    pub fn to_bytes(&self) -> SmfResult<Vec<u8>> {
        let track_count = u16::try_from(self.tracks.len()).map_err(|_| SmfError::Header {
            reason: "more than 65535 tracks",
        })?;
        let mut out = Vec::new();
        out.extend_from_slice(HEADER_TAG);
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&track_count.to_be_bytes());
        out.extend_from_slice(&self.resolution.to_be_bytes());

        for track in &self.tracks {
            let body = encode_track(track)?;
            let len = u32::try_from(body.len()).map_err(|_| SmfError::Chunk {
                offset: out.len(),
                reason: "track body larger than 4 GiB",
            })?;
            out.extend_from_slice(TRACK_TAG);
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&body);
        }
        Ok(out)
    }

    pub fn read(path: impl AsRef<Path>) -> SmfResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> SmfResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// First meta event of `meta_type` across all tracks, earliest time
    /// first, lower track index breaking ties.
    fn first_meta<T>(
        &self,
        meta_type: u8,
        view: impl Fn(&MetaEvent) -> Option<T>,
    ) -> Option<T> {
        self.tracks
            .iter()
            .filter_map(|t| {
                let (time, m) = t.find_meta(meta_type)?;
                Some((time, view(m)?))
            })
            .min_by_key(|(time, _)| *time)
            .map(|(_, v)| v)
    }

    pub fn tempo(&self) -> Option<Tempo> {
        self.first_meta(meta_type::TEMPO, |m| m.tempo())
    }

    pub fn time_signature(&self) -> Option<TimeSignature> {
        self.first_meta(meta_type::TIME_SIGNATURE, |m| m.time_signature())
    }

    pub fn key_signature(&self) -> Option<KeySignature> {
        self.first_meta(meta_type::KEY_SIGNATURE, |m| m.key_signature())
    }
}
