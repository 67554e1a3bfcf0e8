//! Container reader and random-access playback backend
//!
//! [`NblReader::open`] parses and validates the header, texture block and
//! both index tables eagerly, holding them in memory for the life of the
//! reader. Frame requests then resolve to a byte range through the frame
//! index, decompress through a reused scratch buffer, and update the live
//! particle set.
//!
//! `seek` resolves any absolute frame by jumping to the nearest preceding
//! keyframe and stepping forward through the P-frames of the GOP; seeking
//! backward re-seeks from the governing keyframe (P-frames are never
//! inverted). One bad chunk fails the call; a later seek to a different
//! keyframe can still recover.

use std::io::{Read, Seek, SeekFrom};

use log::debug;

use crate::compress::decompress_frame;
use crate::cursor::ByteCursor;
use crate::error::{NblError, Result};
use crate::frame::{split_chunk, FrameType, IFramePayload, PFramePayload};
use crate::header::{NblHeader, TextureDesc};
use crate::index::{FrameIndex, KeyframeIndex, FRAME_INDEX_ROW_SIZE};
use crate::live::LiveSet;
use crate::CancelToken;

/// Random-access reader over an NBL container.
pub struct NblReader<R: Read + Seek> {
    source: R,
    header: NblHeader,
    textures: Vec<TextureDesc>,
    frame_index: FrameIndex,
    keyframes: KeyframeIndex,
    live: LiveSet,
    current_frame: Option<u32>,
    scratch: Vec<u8>,
    cancel: CancelToken,
}

impl<R: Read + Seek> NblReader<R> {
    /// Opens a container, eagerly loading and validating all metadata.
    ///
    /// Index invariants (chunks in bounds and non-overlapping, keyframe
    /// table ascending from frame 0) are fatal here; per-frame problems
    /// surface later from `seek`/`step_forward` with the frame index
    /// attached.
    pub fn open(mut source: R) -> Result<Self> {
        let file_size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut head = [0u8; NblHeader::SIZE];
        source.read_exact(&mut head).map_err(NblError::from_read)?;
        let header = NblHeader::from_bytes(&head)?;

        let mut textures = Vec::with_capacity(header.texture_count as usize);
        for index in 0..header.texture_count as usize {
            textures.push(TextureDesc::read_from(&mut source, index)?);
        }

        // Frame index: read the whole table in one shot. Sizing against the
        // file length up front keeps a hostile frame count from driving a
        // huge allocation.
        let table_bytes = header.total_frames as u64 * FRAME_INDEX_ROW_SIZE as u64;
        let pos = source.stream_position()?;
        if table_bytes > file_size.saturating_sub(pos) {
            return Err(NblError::Truncated {
                needed: table_bytes as usize,
                remaining: file_size.saturating_sub(pos) as usize,
            });
        }
        let mut table = vec![0u8; table_bytes as usize];
        source.read_exact(&mut table).map_err(NblError::from_read)?;
        let frame_index = FrameIndex::read(&mut ByteCursor::new(&table), header.total_frames)?;

        // Keyframe index: count word, then the entries.
        let mut count_bytes = [0u8; 4];
        source
            .read_exact(&mut count_bytes)
            .map_err(NblError::from_read)?;
        let keyframe_count = u32::from_le_bytes(count_bytes);
        let entry_bytes = keyframe_count as u64 * 4;
        let pos = source.stream_position()?;
        if entry_bytes > file_size.saturating_sub(pos) {
            return Err(NblError::Truncated {
                needed: entry_bytes as usize,
                remaining: file_size.saturating_sub(pos) as usize,
            });
        }
        let mut kf_table = vec![0u8; 4 + entry_bytes as usize];
        kf_table[..4].copy_from_slice(&count_bytes);
        source
            .read_exact(&mut kf_table[4..])
            .map_err(NblError::from_read)?;
        let keyframes = KeyframeIndex::read(&mut ByteCursor::new(&kf_table))?;

        let data_start = source.stream_position()?;
        frame_index.validate(data_start, file_size)?;
        keyframes.validate(header.total_frames)?;

        debug!(
            "opened NBL container: {} frames, {} keyframes, {} textures, {} fps",
            header.total_frames,
            keyframes.len(),
            textures.len(),
            header.target_fps
        );

        let scratch = Vec::with_capacity(frame_index.max_chunk_size() as usize);
        Ok(Self {
            source,
            header,
            textures,
            frame_index,
            keyframes,
            live: LiveSet::new(),
            current_frame: None,
            scratch,
            cancel: CancelToken::new(),
        })
    }

    pub fn header(&self) -> &NblHeader {
        &self.header
    }

    pub fn textures(&self) -> &[TextureDesc] {
        &self.textures
    }

    pub fn total_frames(&self) -> u32 {
        self.header.total_frames
    }

    /// Keyframe positions, strictly ascending.
    pub fn keyframes(&self) -> &[u32] {
        self.keyframes.frames()
    }

    pub fn is_keyframe(&self, frame: u32) -> bool {
        self.keyframes.contains(frame)
    }

    /// Frame the live set currently reflects; `None` before the first seek.
    pub fn current_frame(&self) -> Option<u32> {
        self.current_frame
    }

    /// The materialized particle set at [`Self::current_frame`].
    pub fn live(&self) -> &LiveSet {
        &self.live
    }

    /// Clone of the reader's cancellation token; triggering it makes an
    /// in-flight multi-frame seek return [`NblError::Cancelled`].
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Materializes the live set at `target`.
    ///
    /// Resolves the greatest keyframe at or before `target`, reloads from
    /// it when the current position cannot be stepped forward, then applies
    /// the intervening P-frames. Seeking to the current frame is free;
    /// seeking to a keyframe reads exactly one chunk.
    pub fn seek(&mut self, target: u32) -> Result<&LiveSet> {
        let total = self.total_frames();
        if target >= total {
            return Err(NblError::FrameOutOfRange {
                frame: target,
                total,
            });
        }
        let key = self
            .keyframes
            .nearest_at_or_before(target)
            .ok_or(NblError::BadKeyframeTable("no keyframe at or before target"))?;

        let start = match self.current_frame {
            // Forward seek within the target's GOP: keep stepping.
            Some(current) if current >= key && current <= target => current,
            _ => {
                self.load_frame(key, true)?;
                self.current_frame = Some(key);
                key
            }
        };
        for frame in (start + 1)..=target {
            if self.cancel.is_cancelled() {
                return Err(NblError::Cancelled);
            }
            self.load_frame(frame, false)?;
            self.current_frame = Some(frame);
        }
        Ok(&self.live)
    }

    /// Advances playback by one frame (the first frame if nothing has been
    /// sought yet).
    pub fn step_forward(&mut self) -> Result<&LiveSet> {
        let Some(current) = self.current_frame else {
            return self.seek(0);
        };
        let next = current + 1;
        let total = self.total_frames();
        if next >= total {
            return Err(NblError::FrameOutOfRange { frame: next, total });
        }
        self.load_frame(next, false)?;
        self.current_frame = Some(next);
        Ok(&self.live)
    }

    /// Reads and decompresses the chunk for `frame` through the scratch
    /// buffer, returning the decompressed header + payload bytes.
    fn read_chunk(&mut self, frame: u32) -> Result<Vec<u8>> {
        let total = self.total_frames();
        let loc = self
            .frame_index
            .get(frame)
            .ok_or(NblError::FrameOutOfRange { frame, total })?;
        self.source.seek(SeekFrom::Start(loc.offset))?;
        self.scratch.resize(loc.size as usize, 0);
        self.source
            .read_exact(&mut self.scratch)
            .map_err(NblError::from_read)?;
        decompress_frame(&self.scratch, frame)
    }

    /// Loads one chunk into the live set. `expect_keyframe` is set when the
    /// chunk was resolved through the keyframe table and must decode as an
    /// I-frame.
    fn load_frame(&mut self, frame: u32, expect_keyframe: bool) -> Result<()> {
        let chunk = self.read_chunk(frame)?;
        let (chunk_header, payload) = split_chunk(&chunk, frame)?;
        match chunk_header.frame_type {
            FrameType::IFrame => {
                let view = IFramePayload::parse(payload, chunk_header.particle_count, frame)?;
                self.live.rebuild_from_iframe(&view, frame)?;
            }
            FrameType::PFrame => {
                if expect_keyframe {
                    return Err(NblError::BadKeyframeTable(
                        "keyframe entry points at a P-frame chunk",
                    ));
                }
                let view = PFramePayload::parse(payload, chunk_header.particle_count, frame)?;
                self.live.apply_pframe(&view, frame)?;
            }
        }
        Ok(())
    }
}
