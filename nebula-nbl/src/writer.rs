//! Streaming container writer
//!
//! The writer consumes absolute per-frame particle states in order and owns
//! the I/P coding policy: frame 0 is always an I-frame, and a new I-frame
//! is emitted on a caller hint, when the configured GOP length is reached,
//! or when any per-particle delta cannot be represented in its stored width
//! (the 32.7-block teleport rule for positions, and the analogous bound for
//! color/size/texture/sequence deltas).
//!
//! Compressed chunks are spooled to an anonymous temp file while frames
//! stream in; `finish` assembles the final container (header, texture
//! block, frame index, keyframe index, then the chunk stream) so index
//! offsets are exact without buffering the animation in memory.
//!
//! A failed `push_frame` leaves the writer in an undefined state; callers
//! must discard the partial output.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use glam::Vec3;
use log::debug;

use crate::compress::compress_frame;
use crate::error::{NblError, Result};
use crate::frame::{encode_iframe_chunk, encode_pframe_chunk, ParticleDelta};
use crate::header::{texture_block_size, write_texture_block, NblHeader, TextureDesc};
use crate::index::{ChunkLocation, FrameIndex, KeyframeIndex, FRAME_INDEX_ROW_SIZE};
use crate::live::{LiveSet, ParticleId};
use crate::{NBL_DEFAULT_MAX_GOP, NBL_MAX_POS_DELTA, NBL_POS_SCALE};

/// Encoder policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Maximum frames per GOP, keyframe included. 1 makes every frame an
    /// I-frame.
    pub max_gop: u32,
    /// zstd compression level; 0 selects the library default.
    pub zstd_level: i32,
    /// Emit an I-frame when a delta cannot be represented. Disabling this
    /// pins keyframes to exactly the caller-forced positions (exact
    /// re-encoding); an unrepresentable delta then fails with
    /// `DeltaOverflow`.
    pub auto_key: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_gop: NBL_DEFAULT_MAX_GOP,
            zstd_level: 0,
            auto_key: true,
        }
    }
}

/// Streaming writer for NBL containers.
#[derive(Debug)]
pub struct NblWriter<W: Write> {
    sink: W,
    target_fps: u16,
    textures: Vec<TextureDesc>,
    options: WriterOptions,
    spool: File,
    chunk_sizes: Vec<u32>,
    keyframes: Vec<u32>,
    prev: LiveSet,
    frames_since_key: u32,
    bbox: Option<(Vec3, Vec3)>,
}

impl<W: Write> NblWriter<W> {
    /// Creates a writer with default options.
    pub fn create(sink: W, target_fps: u16, textures: Vec<TextureDesc>) -> Result<Self> {
        Self::create_with(sink, target_fps, textures, WriterOptions::default())
    }

    pub fn create_with(
        sink: W,
        target_fps: u16,
        textures: Vec<TextureDesc>,
        options: WriterOptions,
    ) -> Result<Self> {
        if textures.len() > u16::MAX as usize {
            return Err(NblError::MalformedTexture {
                index: u16::MAX as usize,
                reason: "more than 65535 textures",
            });
        }
        for (index, tex) in textures.iter().enumerate() {
            tex.validate(index)?;
        }
        Ok(Self {
            sink,
            target_fps,
            textures,
            options,
            spool: tempfile::tempfile()?,
            chunk_sizes: Vec::new(),
            keyframes: Vec::new(),
            prev: LiveSet::new(),
            frames_since_key: 0,
            bbox: None,
        })
    }

    /// Frames accepted so far.
    pub fn frames_written(&self) -> u32 {
        self.chunk_sizes.len() as u32
    }

    /// Keyframe positions decided so far.
    pub fn keyframes(&self) -> &[u32] {
        &self.keyframes
    }

    /// Appends one frame. `force_key` is the caller's keyframe hint; the
    /// writer may still key on its own per the policy above.
    pub fn push_frame(&mut self, frame: &LiveSet, force_key: bool) -> Result<()> {
        let index = self.frames_written();
        let mut key = force_key
            || index == 0
            || (self.options.max_gop > 0 && self.frames_since_key >= self.options.max_gop);

        let mut rows = Vec::new();
        if !key {
            match quantize_deltas(&self.prev, frame, index) {
                Ok(r) => rows = r,
                Err(err) => {
                    if !self.options.auto_key {
                        return Err(err);
                    }
                    if let NblError::DeltaOverflow { id, .. } = err {
                        debug!("frame {index}: delta for particle {id} unrepresentable, forcing keyframe");
                    }
                    key = true;
                }
            }
        }

        let raw = if key {
            encode_iframe_chunk(frame)
        } else {
            encode_pframe_chunk(&rows)
        };
        let compressed = compress_frame(&raw, self.options.zstd_level)?;
        self.spool.write_all(&compressed)?;
        self.chunk_sizes.push(compressed.len() as u32);

        if key {
            self.keyframes.push(index);
            self.frames_since_key = 1;
        } else {
            self.frames_since_key += 1;
        }

        for pos in frame.positions() {
            self.bbox = Some(match self.bbox {
                Some((min, max)) => (min.min(*pos), max.max(*pos)),
                None => (*pos, *pos),
            });
        }
        self.prev = frame.clone();
        Ok(())
    }

    /// Writes the final container and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        let total = self.frames_written();
        let (bbox_min, bbox_max) = self.bbox.unwrap_or((Vec3::ZERO, Vec3::ZERO));
        let mut header = NblHeader::new(self.target_fps);
        header.total_frames = total;
        header.texture_count = self.textures.len() as u16;
        header.bbox_min = bbox_min;
        header.bbox_max = bbox_max;

        let data_start = (NblHeader::SIZE
            + texture_block_size(&self.textures)
            + total as usize * FRAME_INDEX_ROW_SIZE
            + KeyframeIndex::encoded_size(self.keyframes.len())) as u64;

        self.sink.write_all(&header.to_bytes())?;
        write_texture_block(&mut self.sink, &self.textures)?;

        let mut offset = data_start;
        let mut locations = Vec::with_capacity(self.chunk_sizes.len());
        for &size in &self.chunk_sizes {
            locations.push(ChunkLocation { offset, size });
            offset += size as u64;
        }
        FrameIndex::write(&mut self.sink, &locations)?;
        KeyframeIndex::write(&mut self.sink, &self.keyframes)?;

        self.spool.seek(SeekFrom::Start(0))?;
        std::io::copy(&mut self.spool, &mut self.sink)?;
        self.sink.flush()?;

        debug!(
            "finished NBL container: {} frames, {} keyframes",
            total,
            self.keyframes.len()
        );
        Ok(self.sink)
    }
}

/// Quantizes the transition `prev -> next` into P-frame rows, in `next`'s
/// row order. Fails with `DeltaOverflow` on the first component that does
/// not fit its stored width.
fn quantize_deltas(
    prev: &LiveSet,
    next: &LiveSet,
    frame: u32,
) -> Result<Vec<(ParticleId, ParticleDelta)>> {
    let mut rows = Vec::with_capacity(next.len());
    for (id, state) in next.iter() {
        let delta = match prev.get(id) {
            Some(old) => ParticleDelta {
                dpos: [
                    quantize_axis(state.pos.x - old.pos.x, frame, id)?,
                    quantize_axis(state.pos.y - old.pos.y, frame, id)?,
                    quantize_axis(state.pos.z - old.pos.z, frame, id)?,
                ],
                dcol: [
                    diff_i8(old.col[0], state.col[0], frame, id)?,
                    diff_i8(old.col[1], state.col[1], frame, id)?,
                    diff_i8(old.col[2], state.col[2], frame, id)?,
                    diff_i8(old.col[3], state.col[3], frame, id)?,
                ],
                dsize: diff_i16(old.size, state.size, frame, id)?,
                dtex_id: diff_i8(old.tex_id, state.tex_id, frame, id)?,
                dseq_idx: diff_i8(old.seq_idx, state.seq_idx, frame, id)?,
            },
            // Zero-Basis spawn: the stored bit pattern carries the absolute
            // initial value for every integer attribute.
            None => ParticleDelta {
                dpos: [
                    quantize_axis(state.pos.x, frame, id)?,
                    quantize_axis(state.pos.y, frame, id)?,
                    quantize_axis(state.pos.z, frame, id)?,
                ],
                dcol: [
                    state.col[0] as i8,
                    state.col[1] as i8,
                    state.col[2] as i8,
                    state.col[3] as i8,
                ],
                dsize: state.size as i16,
                dtex_id: state.tex_id as i8,
                dseq_idx: state.seq_idx as i8,
            },
        };
        rows.push((id, delta));
    }
    Ok(rows)
}

/// Round-half-to-even quantization of one position axis delta; the stored
/// magnitude is capped at ±32767 (±32768 must key instead).
fn quantize_axis(delta: f32, frame: u32, id: ParticleId) -> Result<i16> {
    let stored = (delta * NBL_POS_SCALE).round_ties_even();
    if !(-(NBL_MAX_POS_DELTA as f32)..=NBL_MAX_POS_DELTA as f32).contains(&stored) {
        return Err(NblError::DeltaOverflow { frame, id });
    }
    Ok(stored as i16)
}

fn diff_i8(old: u8, new: u8, frame: u32, id: ParticleId) -> Result<i8> {
    i8::try_from(new as i16 - old as i16).map_err(|_| NblError::DeltaOverflow { frame, id })
}

fn diff_i16(old: u16, new: u16, frame: u32, id: ParticleId) -> Result<i16> {
    i16::try_from(new as i32 - old as i32).map_err(|_| NblError::DeltaOverflow { frame, id })
}
