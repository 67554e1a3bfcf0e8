//! Optional animation validator
//!
//! Walks a full animation and reports findings the codec deliberately
//! accepts: texture references past the texture block, sprite cells outside
//! the referenced texture's grid, and positions escaping the header
//! bounding box. Findings are non-fatal (playback still works); encoders
//! producing them are buggy.

use std::fmt;
use std::io::{Read, Seek};

use glam::Vec3;
use log::warn;

use crate::error::{NblError, Result};
use crate::live::ParticleId;
use crate::reader::NblReader;

/// One non-fatal problem found in an animation.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// `tex_id` is not a valid index into the texture block.
    TextureIdOutOfRange {
        frame: u32,
        id: ParticleId,
        tex_id: u8,
        texture_count: u16,
    },
    /// `seq_idx` does not name a cell of the referenced sprite sheet.
    SeqIdxOutOfRange {
        frame: u32,
        id: ParticleId,
        seq_idx: u8,
        cells: u16,
    },
    /// Position lies outside the header bounding box.
    PositionOutsideBBox {
        frame: u32,
        id: ParticleId,
        pos: Vec3,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::TextureIdOutOfRange {
                frame,
                id,
                tex_id,
                texture_count,
            } => write!(
                f,
                "frame {frame}: particle {id} references texture {tex_id} of {texture_count}"
            ),
            Finding::SeqIdxOutOfRange {
                frame,
                id,
                seq_idx,
                cells,
            } => write!(
                f,
                "frame {frame}: particle {id} references sprite cell {seq_idx} of {cells}"
            ),
            Finding::PositionOutsideBBox { frame, id, pos } => write!(
                f,
                "frame {frame}: particle {id} at {pos} escapes the declared bounding box"
            ),
        }
    }
}

/// Walks every frame of the animation and collects findings.
///
/// Consults the reader's cancellation token between frames. The reader is
/// left positioned at the last frame.
pub fn validate_animation<R: Read + Seek>(reader: &mut NblReader<R>) -> Result<Vec<Finding>> {
    let total = reader.total_frames();
    let cancel = reader.cancel_handle();
    let mut findings = Vec::new();

    for frame in 0..total {
        if cancel.is_cancelled() {
            return Err(NblError::Cancelled);
        }
        if frame == 0 {
            reader.seek(0)?;
        } else {
            reader.step_forward()?;
        }

        let header = *reader.header();
        let texture_count = header.texture_count;
        for (id, state) in reader.live().iter() {
            if (state.tex_id as u16) < texture_count {
                let cells = reader.textures()[state.tex_id as usize].cells();
                if state.seq_idx as u16 >= cells {
                    findings.push(Finding::SeqIdxOutOfRange {
                        frame,
                        id,
                        seq_idx: state.seq_idx,
                        cells,
                    });
                }
            } else {
                findings.push(Finding::TextureIdOutOfRange {
                    frame,
                    id,
                    tex_id: state.tex_id,
                    texture_count,
                });
            }
            if !(header.bbox_min.cmple(state.pos).all() && state.pos.cmple(header.bbox_max).all()) {
                findings.push(Finding::PositionOutsideBBox {
                    frame,
                    id,
                    pos: state.pos,
                });
            }
        }
    }

    for finding in &findings {
        warn!("{finding}");
    }
    Ok(findings)
}
