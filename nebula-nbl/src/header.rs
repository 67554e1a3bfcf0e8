//! NBL file header and texture block
//!
//! # Layout
//! ```text
//! File header (48 bytes):
//! 0x00: magic [u8; 8]        - "NEBULAFX"
//! 0x08: version u16          - must be 1
//! 0x0A: target_fps u16
//! 0x0C: total_frames u32
//! 0x10: texture_count u16
//! 0x12: attributes u16       - must be 3 (ALPHA | SIZE)
//! 0x14: bbox_min [f32; 3]
//! 0x20: bbox_max [f32; 3]
//! 0x2C: reserved [u8; 4]     - must be 0
//!
//! Texture block (texture_count entries, immediately after the header):
//!   path_len u16, path UTF-8 [path_len], rows u8, cols u8
//! ```

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use glam::Vec3;

use crate::cursor::{write_string, ByteCursor};
use crate::error::{NblError, Result};
use crate::{NBL_MAGIC, NBL_VERSION};

bitflags::bitflags! {
    /// Optional per-particle attribute arrays present in frame payloads.
    ///
    /// Version 1 requires both bits set; the SoA layout assumes alpha and
    /// size columns are always present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttributeFlags: u16 {
        /// Payloads carry an alpha channel column.
        const ALPHA = 0x0001;
        /// Payloads carry a size column.
        const SIZE = 0x0002;
    }
}

impl AttributeFlags {
    /// The only attribute mask accepted by version 1.
    pub const REQUIRED: AttributeFlags = AttributeFlags::ALPHA.union(AttributeFlags::SIZE);
}

/// Decoded 48-byte NBL file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NblHeader {
    /// Intended playback rate in frames per second.
    pub target_fps: u16,
    pub total_frames: u32,
    pub texture_count: u16,
    pub attributes: AttributeFlags,
    /// Componentwise lower corner of the box containing every live
    /// particle position across all frames.
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
}

impl NblHeader {
    pub const SIZE: usize = 48;

    pub fn new(target_fps: u16) -> Self {
        Self {
            target_fps,
            total_frames: 0,
            texture_count: 0,
            attributes: AttributeFlags::REQUIRED,
            bbox_min: Vec3::ZERO,
            bbox_max: Vec3::ZERO,
        }
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&NBL_MAGIC);
        bytes[8..10].copy_from_slice(&NBL_VERSION.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.target_fps.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.total_frames.to_le_bytes());
        bytes[16..18].copy_from_slice(&self.texture_count.to_le_bytes());
        bytes[18..20].copy_from_slice(&self.attributes.bits().to_le_bytes());
        for (i, v) in self.bbox_min.to_array().into_iter().enumerate() {
            bytes[20 + i * 4..24 + i * 4].copy_from_slice(&v.to_le_bytes());
        }
        for (i, v) in self.bbox_max.to_array().into_iter().enumerate() {
            bytes[32 + i * 4..36 + i * 4].copy_from_slice(&v.to_le_bytes());
        }
        // bytes[44..48] stay zero (reserved)
        bytes
    }

    /// Read and validate a header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cur = ByteCursor::new(bytes);
        if cur.take(8)? != NBL_MAGIC {
            return Err(NblError::BadMagic);
        }
        let version = cur.read_u16()?;
        if version != NBL_VERSION {
            return Err(NblError::UnsupportedVersion(version));
        }
        let target_fps = cur.read_u16()?;
        let total_frames = cur.read_u32()?;
        let texture_count = cur.read_u16()?;
        let raw_attributes = cur.read_u16()?;
        let attributes = AttributeFlags::from_bits_retain(raw_attributes);
        if attributes != AttributeFlags::REQUIRED {
            return Err(NblError::UnsupportedAttributes(raw_attributes));
        }
        let bbox_min = Vec3::new(cur.read_f32()?, cur.read_f32()?, cur.read_f32()?);
        let bbox_max = Vec3::new(cur.read_f32()?, cur.read_f32()?, cur.read_f32()?);
        if cur.take(4)? != [0u8; 4] {
            return Err(NblError::MalformedHeader("reserved bytes must be zero"));
        }
        if !bbox_min.cmple(bbox_max).all() {
            return Err(NblError::MalformedHeader("bounding box min exceeds max"));
        }
        Ok(Self {
            target_fps,
            total_frames,
            texture_count,
            attributes,
            bbox_min,
            bbox_max,
        })
    }
}

/// One texture block entry: resource path plus sprite-sheet grid shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    /// Resource location, e.g. `minecraft:textures/particle/flame.png`.
    pub path: String,
    /// Sprite-sheet rows, 1..=255.
    pub rows: u8,
    /// Sprite-sheet columns, 1..=255.
    pub cols: u8,
}

impl TextureDesc {
    pub fn new(path: impl Into<String>, rows: u8, cols: u8) -> Self {
        Self {
            path: path.into(),
            rows,
            cols,
        }
    }

    /// Number of sprite cells (`rows x cols`).
    pub fn cells(&self) -> u16 {
        self.rows as u16 * self.cols as u16
    }

    /// Checks the entry is encodable: non-zero grid, path within the u16
    /// length prefix.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(NblError::MalformedTexture {
                index,
                reason: "rows and cols must be non-zero",
            });
        }
        if self.path.len() > u16::MAX as usize {
            return Err(NblError::MalformedTexture {
                index,
                reason: "path exceeds 65535 bytes",
            });
        }
        Ok(())
    }

    fn read(cur: &mut ByteCursor<'_>, index: usize) -> Result<Self> {
        let path = cur.read_string()?;
        let rows = cur.read_u8()?;
        let cols = cur.read_u8()?;
        let desc = Self { path, rows, cols };
        desc.validate(index)?;
        Ok(desc)
    }

    /// Reads one entry directly from an I/O source (the open path, where
    /// the block's total size is not known up front).
    pub(crate) fn read_from<R: std::io::Read>(src: &mut R, index: usize) -> Result<Self> {
        use byteorder::ReadBytesExt;
        let len = src.read_u16::<LittleEndian>().map_err(NblError::from_read)?;
        let mut path = vec![0u8; len as usize];
        src.read_exact(&mut path).map_err(NblError::from_read)?;
        let path = String::from_utf8(path).map_err(|_| NblError::InvalidUtf8)?;
        let rows = src.read_u8().map_err(NblError::from_read)?;
        let cols = src.read_u8().map_err(NblError::from_read)?;
        let desc = Self { path, rows, cols };
        desc.validate(index)?;
        Ok(desc)
    }

    fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_string(w, &self.path)?;
        w.write_u8(self.rows)?;
        w.write_u8(self.cols)?;
        Ok(())
    }

    /// Encoded size of this entry in bytes.
    pub fn encoded_size(&self) -> usize {
        2 + self.path.len() + 2
    }
}

/// Reads `count` texture entries from the cursor.
pub fn read_texture_block(cur: &mut ByteCursor<'_>, count: u16) -> Result<Vec<TextureDesc>> {
    let mut textures = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        textures.push(TextureDesc::read(cur, index)?);
    }
    Ok(textures)
}

/// Writes all texture entries to the sink.
pub fn write_texture_block<W: Write>(w: &mut W, textures: &[TextureDesc]) -> Result<()> {
    for tex in textures {
        tex.write(w)?;
    }
    Ok(())
}

/// Total encoded size of a texture block in bytes.
pub fn texture_block_size(textures: &[TextureDesc]) -> usize {
    textures.iter().map(TextureDesc::encoded_size).sum()
}
