//! Frame and keyframe index tables
//!
//! # Layout
//! ```text
//! Frame index (total_frames rows, after the texture block):
//!   chunk_offset u64   - absolute file offset of the compressed chunk
//!   chunk_size u32     - compressed size in bytes
//!
//! Keyframe index (after the frame index):
//!   keyframe_count u32
//!   frame u32 x keyframe_count   - strictly ascending, first entry 0
//! ```
//!
//! Both tables are loaded eagerly on open. Offsets must land inside the
//! data region, chunks must stay inside the file and must not overlap.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::cursor::ByteCursor;
use crate::error::{NblError, Result};

/// Byte range of one compressed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    pub offset: u64,
    pub size: u32,
}

/// One frame index row: u64 offset + u32 size.
pub const FRAME_INDEX_ROW_SIZE: usize = 12;

/// Eagerly loaded frame index table.
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    entries: Vec<ChunkLocation>,
}

impl FrameIndex {
    /// Reads `total_frames` rows. Validation is a separate step because the
    /// data region bounds are only known once the keyframe table has been
    /// read past.
    pub fn read(cur: &mut ByteCursor<'_>, total_frames: u32) -> Result<Self> {
        let mut entries = Vec::with_capacity(total_frames as usize);
        for _ in 0..total_frames {
            let offset = cur.read_u64()?;
            let size = cur.read_u32()?;
            entries.push(ChunkLocation { offset, size });
        }
        Ok(Self { entries })
    }

    /// Checks every chunk lies inside `[data_start, file_size)` and that no
    /// two chunks overlap.
    pub fn validate(&self, data_start: u64, file_size: u64) -> Result<()> {
        for entry in &self.entries {
            if entry.offset < data_start {
                return Err(NblError::BadIndex("chunk offset inside metadata region"));
            }
            let end = entry
                .offset
                .checked_add(entry.size as u64)
                .ok_or(NblError::BadIndex("chunk end overflows"))?;
            if end > file_size {
                return Err(NblError::BadIndex("chunk escapes end of file"));
            }
        }
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|e| e.offset);
        for pair in sorted.windows(2) {
            if pair[0].offset + pair[0].size as u64 > pair[1].offset {
                return Err(NblError::BadIndex("chunks overlap"));
            }
        }
        Ok(())
    }

    pub fn get(&self, frame: u32) -> Option<ChunkLocation> {
        self.entries.get(frame as usize).copied()
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest compressed chunk size; sizes the reader's scratch buffer.
    pub fn max_chunk_size(&self) -> u32 {
        self.entries.iter().map(|e| e.size).max().unwrap_or(0)
    }

    pub fn write<W: Write>(w: &mut W, entries: &[ChunkLocation]) -> Result<()> {
        for entry in entries {
            w.write_u64::<LittleEndian>(entry.offset)?;
            w.write_u32::<LittleEndian>(entry.size)?;
        }
        Ok(())
    }
}

/// Eagerly loaded keyframe index table.
#[derive(Debug, Clone, Default)]
pub struct KeyframeIndex {
    frames: Vec<u32>,
}

impl KeyframeIndex {
    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let count = cur.read_u32()?;
        let mut frames = Vec::with_capacity(count as usize);
        for _ in 0..count {
            frames.push(cur.read_u32()?);
        }
        Ok(Self { frames })
    }

    /// Strictly ascending, first entry 0, all below `total_frames`. An
    /// empty table is only legal for an empty animation.
    pub fn validate(&self, total_frames: u32) -> Result<()> {
        if total_frames == 0 {
            if !self.frames.is_empty() {
                return Err(NblError::BadKeyframeTable(
                    "keyframes listed for an empty animation",
                ));
            }
            return Ok(());
        }
        match self.frames.first() {
            Some(0) => {}
            Some(_) => return Err(NblError::BadKeyframeTable("first keyframe is not frame 0")),
            None => return Err(NblError::BadKeyframeTable("table is empty")),
        }
        for pair in self.frames.windows(2) {
            if pair[1] <= pair[0] {
                return Err(NblError::BadKeyframeTable("entries not strictly ascending"));
            }
        }
        if self.frames.last().copied().unwrap_or(0) >= total_frames {
            return Err(NblError::BadKeyframeTable("entry past the last frame"));
        }
        Ok(())
    }

    /// Greatest keyframe at or before `target`, by binary search.
    pub fn nearest_at_or_before(&self, target: u32) -> Option<u32> {
        match self.frames.binary_search(&target) {
            Ok(i) => Some(self.frames[i]),
            Err(0) => None,
            Err(i) => Some(self.frames[i - 1]),
        }
    }

    pub fn contains(&self, frame: u32) -> bool {
        self.frames.binary_search(&frame).is_ok()
    }

    pub fn frames(&self) -> &[u32] {
        &self.frames
    }

    pub fn len(&self) -> u32 {
        self.frames.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn write<W: Write>(w: &mut W, frames: &[u32]) -> Result<()> {
        w.write_u32::<LittleEndian>(frames.len() as u32)?;
        for &frame in frames {
            w.write_u32::<LittleEndian>(frame)?;
        }
        Ok(())
    }

    /// Encoded size of a table with `count` entries.
    pub fn encoded_size(count: usize) -> usize {
        4 + 4 * count
    }
}
