//! Single-shot zstd chunk compression
//!
//! Every frame chunk is an independent zstd frame: one `compress_frame`
//! call per chunk, no dictionary or streaming context carried between
//! calls, so any chunk can be decoded knowing only its byte range.
//!
//! The chunk header and payload are compressed as one concatenated buffer.
//! Compressing them as two zstd frames produces input `decompress_frame`
//! rejects (a single chunk must decode in one shot).

use zstd::zstd_safe;

use crate::error::{NblError, Result};
use crate::NBL_MAX_FRAME_BYTES;

/// Leading bytes of every zstd frame (magic 0xFD2FB528, little-endian).
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Compresses one chunk (header + payload concatenated) in a single shot.
///
/// `level` 0 selects the zstd library default (currently 3).
pub fn compress_frame(data: &[u8], level: i32) -> Result<Vec<u8>> {
    Ok(zstd::bulk::compress(data, level)?)
}

/// Decompresses one chunk in a single shot.
///
/// `frame` is the frame index the chunk belongs to, used for error
/// reporting only. The input must be exactly one zstd frame: a chunk whose
/// header and payload were compressed separately is two concatenated
/// frames and fails with `BadCompression`. A declared content size past
/// [`NBL_MAX_FRAME_BYTES`] fails with `FrameTooLarge`.
pub fn decompress_frame(data: &[u8], frame: u32) -> Result<Vec<u8>> {
    if data.len() < ZSTD_MAGIC.len() || data[..ZSTD_MAGIC.len()] != ZSTD_MAGIC {
        return Err(NblError::BadCompression {
            frame,
            reason: "missing zstd magic".into(),
        });
    }

    // The raw decompressor happily walks concatenated frames, so the
    // single-frame rule is checked up front: the first frame must span the
    // whole chunk.
    match zstd_safe::find_frame_compressed_size(data) {
        Ok(len) if len != data.len() => {
            return Err(NblError::BadCompression {
                frame,
                reason: "chunk is not a single zstd frame".into(),
            });
        }
        Ok(_) => {}
        Err(_) => {
            return Err(NblError::BadCompression {
                frame,
                reason: "unreadable frame".into(),
            });
        }
    }

    // Size the output buffer from the frame's declared content size; the
    // ceiling is only reserved when the frame does not carry one.
    let capacity = match zstd_safe::get_frame_content_size(data) {
        Ok(Some(size)) if size > NBL_MAX_FRAME_BYTES as u64 => {
            return Err(NblError::FrameTooLarge {
                frame,
                limit: NBL_MAX_FRAME_BYTES,
            });
        }
        Ok(Some(size)) => size as usize,
        Ok(None) => NBL_MAX_FRAME_BYTES,
        Err(_) => {
            return Err(NblError::BadCompression {
                frame,
                reason: "unreadable frame header".into(),
            });
        }
    };

    zstd::bulk::decompress(data, capacity).map_err(|e| NblError::BadCompression {
        frame,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress_frame(&data, 0).unwrap();
        assert_eq!(&compressed[..4], &ZSTD_MAGIC);
        let restored = decompress_frame(&compressed, 0).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_roundtrip_empty() {
        // A zero-particle chunk still compresses its 5-byte header; the
        // degenerate fully-empty input must survive too.
        let compressed = compress_frame(&[], 0).unwrap();
        let restored = decompress_frame(&compressed, 0).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_missing_magic_rejected() {
        let err = decompress_frame(b"not a zstd frame", 9).unwrap_err();
        match err {
            NblError::BadCompression { frame, .. } => assert_eq!(frame, 9),
            other => panic!("expected BadCompression, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_body_rejected() {
        let mut compressed = compress_frame(b"hello nebula", 0).unwrap();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;
        compressed.push(0xAA);
        assert!(matches!(
            decompress_frame(&compressed, 0),
            Err(NblError::BadCompression { .. })
        ));
    }

    #[test]
    fn test_two_concatenated_frames_rejected() {
        // Header and payload compressed separately then concatenated is a
        // contract violation; the decoder only accepts a single frame.
        let mut joined = compress_frame(b"header", 0).unwrap();
        joined.extend(compress_frame(b"payload", 0).unwrap());
        assert!(matches!(
            decompress_frame(&joined, 0),
            Err(NblError::BadCompression { .. })
        ));
    }

    #[test]
    fn test_no_context_reuse() {
        // Identical inputs must produce identical independent frames.
        let a = compress_frame(b"same bytes", 0).unwrap();
        let b = compress_frame(b"same bytes", 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(decompress_frame(&b, 0).unwrap(), b"same bytes");
    }
}
