//! Materialized particle state
//!
//! [`LiveSet`] is the set of particles alive at one frame: a compact
//! row-ordered struct-of-arrays (one contiguous column per attribute, ready
//! for GPU upload) plus a hash map from particle ID to row index for
//! P-frame application. The whole set is rebuilt on every I-frame and
//! mutated in place on P-frames.

use glam::Vec3;
use hashbrown::{HashMap, HashSet};

use crate::error::{NblError, Result};
use crate::frame::{IFramePayload, PFramePayload, ParticleDelta};
use crate::{NBL_POS_SCALE, NBL_SIZE_SCALE};

/// Particle identifier, stable across the lifetime of a particle within one
/// animation. Unique within any single frame.
pub type ParticleId = i32;

/// Absolute state of one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleState {
    /// Position in block units.
    pub pos: Vec3,
    /// RGBA color.
    pub col: [u8; 4],
    /// Render size in hundredth units (stored value; real size = size / 100).
    pub size: u16,
    /// Index into the container's texture block.
    pub tex_id: u8,
    /// Sprite-sheet cell index.
    pub seq_idx: u8,
}

impl ParticleState {
    /// Real-valued render size (the stored u16 is in hundredth units).
    pub fn size_real(&self) -> f32 {
        self.size as f32 / NBL_SIZE_SCALE
    }
}

/// The set of live particles at the current frame.
///
/// Row order is the frame's on-disk order for I-frames; P-frames update
/// rows in place, append spawns, and swap-remove despawns. Column accessors
/// expose the raw arrays; [`LiveSet::get`] resolves a single ID through the
/// row map.
#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    ids: Vec<ParticleId>,
    positions: Vec<Vec3>,
    colors: Vec<[u8; 4]>,
    sizes: Vec<u16>,
    tex_ids: Vec<u8>,
    seq_idxs: Vec<u8>,
    rows: HashMap<ParticleId, usize>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            positions: Vec::with_capacity(n),
            colors: Vec::with_capacity(n),
            sizes: Vec::with_capacity(n),
            tex_ids: Vec::with_capacity(n),
            seq_idxs: Vec::with_capacity(n),
            rows: HashMap::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: ParticleId) -> bool {
        self.rows.contains_key(&id)
    }

    /// Inserts or replaces a particle, returning the previous state if the
    /// ID was already live.
    pub fn insert(&mut self, id: ParticleId, state: ParticleState) -> Option<ParticleState> {
        match self.rows.get(&id) {
            Some(&row) => {
                let old = self.state_at(row);
                self.positions[row] = state.pos;
                self.colors[row] = state.col;
                self.sizes[row] = state.size;
                self.tex_ids[row] = state.tex_id;
                self.seq_idxs[row] = state.seq_idx;
                Some(old)
            }
            None => {
                self.push_row(id, state);
                None
            }
        }
    }

    pub fn get(&self, id: ParticleId) -> Option<ParticleState> {
        self.rows.get(&id).map(|&row| self.state_at(row))
    }

    /// Removes a particle, returning its last state.
    pub fn remove(&mut self, id: ParticleId) -> Option<ParticleState> {
        let row = self.rows.remove(&id)?;
        let old = self.state_at(row);
        let last = self.ids.len() - 1;
        self.ids.swap_remove(row);
        self.positions.swap_remove(row);
        self.colors.swap_remove(row);
        self.sizes.swap_remove(row);
        self.tex_ids.swap_remove(row);
        self.seq_idxs.swap_remove(row);
        if row != last {
            self.rows.insert(self.ids[row], row);
        }
        Some(old)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.positions.clear();
        self.colors.clear();
        self.sizes.clear();
        self.tex_ids.clear();
        self.seq_idxs.clear();
        self.rows.clear();
    }

    /// Row-ordered particle IDs.
    pub fn ids(&self) -> &[ParticleId] {
        &self.ids
    }

    /// Row-ordered positions column.
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Row-ordered RGBA column.
    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    /// Row-ordered size column (hundredth units).
    pub fn sizes(&self) -> &[u16] {
        &self.sizes
    }

    /// Row-ordered texture index column.
    pub fn tex_ids(&self) -> &[u8] {
        &self.tex_ids
    }

    /// Row-ordered sprite-sheet cell column.
    pub fn seq_idxs(&self) -> &[u8] {
        &self.seq_idxs
    }

    /// Assembles the state stored at `row`. Panics if `row` is out of range.
    pub fn state_at(&self, row: usize) -> ParticleState {
        ParticleState {
            pos: self.positions[row],
            col: self.colors[row],
            size: self.sizes[row],
            tex_id: self.tex_ids[row],
            seq_idx: self.seq_idxs[row],
        }
    }

    /// Iterates `(id, state)` pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (ParticleId, ParticleState)> + '_ {
        self.ids
            .iter()
            .enumerate()
            .map(|(row, &id)| (id, self.state_at(row)))
    }

    fn push_row(&mut self, id: ParticleId, state: ParticleState) {
        let row = self.ids.len();
        self.ids.push(id);
        self.positions.push(state.pos);
        self.colors.push(state.col);
        self.sizes.push(state.size);
        self.tex_ids.push(state.tex_id);
        self.seq_idxs.push(state.seq_idx);
        self.rows.insert(id, row);
    }

    /// Replaces the whole set with the particles listed in an I-frame.
    pub(crate) fn rebuild_from_iframe(&mut self, payload: &IFramePayload<'_>, frame: u32) -> Result<()> {
        self.clear();
        let n = payload.len();
        self.ids.reserve(n);
        self.positions.reserve(n);
        self.colors.reserve(n);
        self.sizes.reserve(n);
        self.tex_ids.reserve(n);
        self.seq_idxs.reserve(n);
        self.rows.reserve(n);
        for i in 0..n {
            let id = payload.id(i);
            if self.rows.contains_key(&id) {
                return Err(NblError::DuplicateParticleId { frame, id });
            }
            self.push_row(id, payload.state(i));
        }
        Ok(())
    }

    /// Applies a P-frame: update IDs present in both, spawn IDs new to the
    /// frame (Zero-Basis), despawn live IDs absent from the frame.
    pub(crate) fn apply_pframe(&mut self, payload: &PFramePayload<'_>, frame: u32) -> Result<()> {
        let n = payload.len();

        // Duplicate check happens before any mutation so a rejected chunk
        // does not half-apply.
        let mut frame_ids: HashSet<ParticleId> = HashSet::with_capacity(n);
        for i in 0..n {
            let id = payload.id(i);
            if !frame_ids.insert(id) {
                return Err(NblError::DuplicateParticleId { frame, id });
            }
        }

        for i in 0..n {
            let id = payload.id(i);
            let delta = payload.delta(i);
            match self.rows.get(&id) {
                Some(&row) => self.apply_delta(row, &delta),
                None => self.push_row(id, spawn_state(&delta)),
            }
        }

        // Despawn sweep. Spawned rows were appended and are in frame_ids,
        // so only pre-frame rows missing from this frame go.
        let dead: Vec<ParticleId> = self
            .ids
            .iter()
            .copied()
            .filter(|id| !frame_ids.contains(id))
            .collect();
        for id in dead {
            self.remove(id);
        }
        Ok(())
    }

    fn apply_delta(&mut self, row: usize, d: &ParticleDelta) {
        self.positions[row] += Vec3::new(
            d.dpos[0] as f32,
            d.dpos[1] as f32,
            d.dpos[2] as f32,
        ) / NBL_POS_SCALE;
        let col = &mut self.colors[row];
        for c in 0..4 {
            col[c] = col[c].saturating_add_signed(d.dcol[c]);
        }
        self.sizes[row] = self.sizes[row].saturating_add_signed(d.dsize);
        self.tex_ids[row] = self.tex_ids[row].saturating_add_signed(d.dtex_id);
        self.seq_idxs[row] = self.seq_idxs[row].saturating_add_signed(d.dseq_idx);
    }
}

/// Zero-Basis spawn: position is the delta over scale, every integer
/// attribute takes the stored bit pattern reinterpreted unsigned as its
/// absolute initial value.
fn spawn_state(d: &ParticleDelta) -> ParticleState {
    ParticleState {
        pos: Vec3::new(d.dpos[0] as f32, d.dpos[1] as f32, d.dpos[2] as f32) / NBL_POS_SCALE,
        col: [
            d.dcol[0] as u8,
            d.dcol[1] as u8,
            d.dcol[2] as u8,
            d.dcol[3] as u8,
        ],
        size: d.dsize as u16,
        tex_id: d.dtex_id as u8,
        seq_idx: d.dseq_idx as u8,
    }
}
