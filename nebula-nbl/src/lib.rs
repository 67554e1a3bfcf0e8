//! NBL (NebulaFX) particle animation container codec
//!
//! Random-seekable, delta-compressed binary container for sequences of
//! particle states, built for GPU-driven playback. Frames are coded as
//! self-contained I-frames or quantized-delta P-frames, each compressed
//! independently with zstd so any frame resolves through the index tables
//! without touching the rest of the file.
//!
//! # Container Layout
//!
//! ```text
//! 0x00: file header (48 bytes)      - magic "NEBULAFX", version, fps,
//!                                     frame/texture counts, attributes,
//!                                     bounding box, reserved
//! 0x30: texture block               - texture_count x { path, rows, cols }
//! ....: frame index                 - total_frames x { offset u64, size u32 }
//! ....: keyframe index              - count u32, count x frame u32
//! ....: frame chunks                - zstd(chunk header + SoA payload) each
//! ```
//!
//! All multi-byte fields are little-endian. See [`header`], [`index`] and
//! [`frame`] for the exact field layouts.
//!
//! # Playback
//!
//! [`NblReader`] loads the metadata eagerly, then materializes any frame by
//! seeking to the nearest preceding keyframe and applying P-frames forward.
//! P-frames carry lifecycle through their ID column: known IDs update, new
//! IDs spawn from a zero basis, missing IDs despawn.
//!
//! # Usage
//!
//! ```
//! use glam::Vec3;
//! use nebula_nbl::{LiveSet, NblReader, NblWriter, ParticleState, TextureDesc};
//!
//! let mut frame = LiveSet::new();
//! frame.insert(42, ParticleState {
//!     pos: Vec3::new(1.0, 2.0, 3.0),
//!     col: [255, 128, 64, 255],
//!     size: 100,
//!     tex_id: 0,
//!     seq_idx: 0,
//! });
//!
//! let textures = vec![TextureDesc::new("minecraft:textures/particle/flame.png", 1, 1)];
//! let mut writer = NblWriter::create(Vec::new(), 30, textures).unwrap();
//! writer.push_frame(&frame, false).unwrap();
//! let bytes = writer.finish().unwrap();
//!
//! let mut reader = NblReader::open(std::io::Cursor::new(bytes)).unwrap();
//! let live = reader.seek(0).unwrap();
//! assert_eq!(live.get(42).unwrap().pos, Vec3::new(1.0, 2.0, 3.0));
//! ```
//!
//! The codec is single-threaded and holds no process-wide state; parallelize
//! across animations, not within one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod compress;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod header;
pub mod index;
pub mod live;
pub mod reader;
pub mod transcode;
pub mod validate;
pub mod writer;

pub use error::{NblError, Result};
pub use frame::{ChunkHeader, FrameType, ParticleDelta};
pub use header::{AttributeFlags, NblHeader, TextureDesc};
pub use live::{LiveSet, ParticleId, ParticleState};
pub use reader::NblReader;
pub use transcode::{transcode, transforms, TranscodeOptions};
pub use validate::{validate_animation, Finding};
pub use writer::{NblWriter, WriterOptions};

// =============================================================================
// Format constants
// =============================================================================

/// File magic, first eight bytes of every container.
pub const NBL_MAGIC: [u8; 8] = *b"NEBULAFX";

/// The only container version this codec reads or writes.
pub const NBL_VERSION: u16 = 1;

/// Size of the decompressed chunk header (frame type + particle count).
pub const NBL_CHUNK_HEADER_SIZE: usize = 5;

/// Bytes per particle in an I-frame payload.
pub const NBL_IFRAME_STRIDE: usize = 24;

/// Bytes per particle in a P-frame payload.
pub const NBL_PFRAME_STRIDE: usize = 18;

/// Position quantization scale: stored delta = real delta x 1000.
pub const NBL_POS_SCALE: f32 = 1000.0;

/// Size quantization scale: stored size units are hundredths.
pub const NBL_SIZE_SCALE: f32 = 100.0;

/// Largest stored per-axis position delta; one more forces a keyframe
/// (about 32.767 blocks of motion per frame).
pub const NBL_MAX_POS_DELTA: i32 = i16::MAX as i32;

/// Safety ceiling on a single decompressed chunk (256 MiB).
pub const NBL_MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Default maximum GOP length for the writer (10 seconds at 30 fps).
pub const NBL_DEFAULT_MAX_GOP: u32 = 300;

// =============================================================================
// Cancellation
// =============================================================================

/// Shared cancellation flag for long operations.
///
/// Multi-frame seeks, full-file validation and transcodes consult the token
/// between frames and bail out with [`NblError::Cancelled`]. Clones share
/// the flag, so a token handed to another thread can stop an operation on
/// this one; partial outputs are invalid but closed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; observed at the next between-frames check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
