//! Transcoder: decode, transform, re-encode
//!
//! Drives a reader frame by frame, applies an injected per-particle
//! transform (identity by default), and pushes the transformed frames into
//! a writer. Retiming is supported by dropping (`keep_every`) or
//! duplicating (`duplicate`) frames; a target FPS change is a property of
//! the writer the caller creates.
//!
//! When source frames are dropped, the next emitted frame after a dropped
//! keyframe is forced to an I-frame so every emitted GOP stays rooted at a
//! keyframe. Deltas that grow past the representable range from skipping
//! intermediate frames are handled by the writer's own keyframe policy.

use std::io::{Read, Seek, Write};

use crate::error::{NblError, Result};
use crate::live::{LiveSet, ParticleId, ParticleState};
use crate::reader::NblReader;
use crate::writer::NblWriter;
use crate::CancelToken;

/// Retiming knobs for [`transcode`]. The defaults copy every frame once.
#[derive(Debug, Clone, Copy)]
pub struct TranscodeOptions {
    /// Keep every Nth source frame (1 keeps all). Dropping frames triggers
    /// re-keyframing.
    pub keep_every: u32,
    /// Emit each kept frame N times (1 = no duplication). Slows playback
    /// without touching `target_fps`.
    pub duplicate: u32,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            keep_every: 1,
            duplicate: 1,
        }
    }
}

/// Streams `reader` through `transform` into `writer` and finishes the
/// container, returning the writer's sink.
///
/// The cancellation token is consulted between frames; cancelling leaves
/// the sink holding an invalid partial container.
pub fn transcode<R, W, F>(
    reader: &mut NblReader<R>,
    mut writer: NblWriter<W>,
    mut transform: F,
    options: &TranscodeOptions,
    cancel: &CancelToken,
) -> Result<W>
where
    R: Read + Seek,
    W: Write,
    F: FnMut(ParticleId, ParticleState) -> ParticleState,
{
    let total = reader.total_frames();
    let keep_every = options.keep_every.max(1);
    let duplicate = options.duplicate.max(1);

    let mut dropped_key = false;
    for frame in 0..total {
        if cancel.is_cancelled() {
            return Err(NblError::Cancelled);
        }
        if frame == 0 {
            reader.seek(0)?;
        } else {
            reader.step_forward()?;
        }
        let source_key = reader.is_keyframe(frame);
        if frame % keep_every != 0 {
            if source_key {
                dropped_key = true;
            }
            continue;
        }

        let mut out = LiveSet::with_capacity(reader.live().len());
        for (id, state) in reader.live().iter() {
            out.insert(id, transform(id, state));
        }

        writer.push_frame(&out, source_key || dropped_key)?;
        dropped_key = false;
        for _ in 1..duplicate {
            writer.push_frame(&out, false)?;
        }
    }
    writer.finish()
}

/// Ready-made per-particle transforms for the bounded-edit set: uniform
/// scaling, coordinate translation, color adjustment. Each returns a
/// closure suitable for [`transcode`](super::transcode); custom edits
/// compose the same way.
pub mod transforms {
    use glam::Vec3;

    use crate::live::{ParticleId, ParticleState};

    /// Passes every state through unchanged.
    pub fn identity() -> impl FnMut(ParticleId, ParticleState) -> ParticleState {
        |_, state| state
    }

    /// Shifts every position by a fixed offset.
    pub fn translate(offset: Vec3) -> impl FnMut(ParticleId, ParticleState) -> ParticleState {
        move |_, mut state| {
            state.pos += offset;
            state
        }
    }

    /// Scales positions about the origin and render sizes by the same
    /// factor. Sizes saturate at the u16 range.
    pub fn uniform_scale(factor: f32) -> impl FnMut(ParticleId, ParticleState) -> ParticleState {
        move |_, mut state| {
            state.pos *= factor;
            state.size = (state.size as f32 * factor)
                .round_ties_even()
                .clamp(0.0, u16::MAX as f32) as u16;
            state
        }
    }

    /// Multiplies each color channel by a factor, saturating at [0, 255].
    pub fn color_multiply(rgba: [f32; 4]) -> impl FnMut(ParticleId, ParticleState) -> ParticleState {
        move |_, mut state| {
            for c in 0..4 {
                state.col[c] = (state.col[c] as f32 * rgba[c])
                    .round_ties_even()
                    .clamp(0.0, 255.0) as u8;
            }
            state
        }
    }
}
