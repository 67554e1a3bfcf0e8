//! NBL codec error types
//!
//! Every failure mode of the codec surfaces as a distinct [`NblError`]
//! variant. Per-frame failures carry the index of the offending frame so a
//! caller can report or skip past it; a later seek to a fresh keyframe may
//! recover playback after a bad chunk.

use crate::live::ParticleId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NblError>;

/// Errors raised by the NBL container codec.
#[derive(Debug, thiserror::Error)]
pub enum NblError {
    /// Input ended before a fixed-width read could complete.
    #[error("truncated input: needed {needed} more bytes, {remaining} remain")]
    Truncated { needed: usize, remaining: usize },

    /// The first eight bytes are not `NEBULAFX`.
    #[error("bad magic: not an NBL container")]
    BadMagic,

    /// Container version other than 1.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    /// Attribute mask other than ALPHA | SIZE (0x03).
    #[error("unsupported attribute mask 0x{0:04x}")]
    UnsupportedAttributes(u16),

    /// Structurally invalid file header (reserved bytes, bounding box).
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    /// Invalid texture block entry.
    #[error("malformed texture entry {index}: {reason}")]
    MalformedTexture { index: usize, reason: &'static str },

    /// Frame index entries overlap, escape the file, or precede the data region.
    #[error("bad frame index: {0}")]
    BadIndex(&'static str),

    /// Keyframe table is non-ascending, out of range, missing frame 0, or
    /// points at a chunk that is not an I-frame.
    #[error("bad keyframe table: {0}")]
    BadKeyframeTable(&'static str),

    /// Chunk data is not a single valid zstd frame.
    #[error("frame {frame}: bad compressed data: {reason}")]
    BadCompression { frame: u32, reason: String },

    /// Decompressed chunk would exceed the safety ceiling.
    #[error("frame {frame}: decompressed size exceeds {limit} bytes")]
    FrameTooLarge { frame: u32, limit: usize },

    /// Payload length disagrees with the particle count in the chunk header.
    #[error("frame {frame}: payload is {actual} bytes, expected {expected}")]
    PayloadSizeMismatch {
        frame: u32,
        expected: usize,
        actual: usize,
    },

    /// Chunk header frame type is neither 0 (I-frame) nor 1 (P-frame).
    #[error("frame {frame}: unknown frame type {value}")]
    UnknownFrameType { frame: u32, value: u8 },

    /// The same particle ID appears twice in one frame's ID column.
    #[error("frame {frame}: duplicate particle id {id}")]
    DuplicateParticleId { frame: u32, id: ParticleId },

    /// A length-prefixed string is not well-formed UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// Encoder-only: a quantized delta does not fit its stored width and the
    /// writer was configured not to force a keyframe.
    #[error("frame {frame}: delta for particle {id} exceeds representable range")]
    DeltaOverflow { frame: u32, id: ParticleId },

    /// Requested frame index is at or past `TotalFrames`.
    #[error("frame {frame} out of range (animation has {total} frames)")]
    FrameOutOfRange { frame: u32, total: u32 },

    /// The operation's cancellation token was triggered.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl NblError {
    /// Maps `UnexpectedEof` from a raw I/O read to [`NblError::Truncated`],
    /// so metadata reads from a stream report the same error kind as
    /// in-memory cursor reads.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            NblError::Truncated {
                needed: 0,
                remaining: 0,
            }
        } else {
            NblError::Io(err)
        }
    }
}
