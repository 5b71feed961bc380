//! Render staging for the previous step's particle state.
//!
//! Particles draw as alpha-blended billboards, so they must be submitted
//! back to front. Each caller frame the positions are sorted by squared
//! distance to the camera and copied into one slot of a small ring of
//! host-visible staging buffers (one per frame in flight). The gravity
//! byte array changes rarely, so it is restaged only when the simulation's
//! gravity version counter moves.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Upload slots in the staging ring; matches the renderer's maximum number
/// of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Per-particle vertex as the billboard shader consumes it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct WaterVertex {
    pub position: [f32; 3],
    pub radius: f32,
}

/// Result of staging one frame.
#[derive(Debug, Clone, Copy)]
pub struct StagedFrame {
    /// Ring slot the positions were written to.
    pub slot: usize,
    /// Particles ready to draw.
    pub count: usize,
    /// Whether the gravity byte buffer was restaged and needs re-upload.
    pub gravity_dirty: bool,
}

pub struct OutputStage {
    slots: [Vec<WaterVertex>; MAX_FRAMES_IN_FLIGHT],
    cursor: usize,
    order: Vec<u32>,
    keys: Vec<f32>,
    gravity_upload: Vec<u8>,
    staged_gravity_version: Option<u64>,
}

impl OutputStage {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            cursor: 0,
            order: Vec::new(),
            keys: Vec::new(),
            gravity_upload: Vec::new(),
            staged_gravity_version: None,
        }
    }

    /// Sorts the frame's particles back to front from `camera` and writes
    /// them into the next ring slot.
    pub fn stage(
        &mut self,
        positions: &[Vec3],
        gravity: &[u8],
        gravity_version: u64,
        camera: Vec3,
        radius: f32,
    ) -> StagedFrame {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % MAX_FRAMES_IN_FLIGHT;

        self.keys.clear();
        self.keys
            .extend(positions.iter().map(|p| p.distance_squared(camera)));
        self.order.clear();
        self.order.extend(0..positions.len() as u32);
        let keys = &self.keys;
        self.order
            .sort_unstable_by(|a, b| keys[*b as usize].total_cmp(&keys[*a as usize]));

        let buffer = &mut self.slots[slot];
        buffer.clear();
        buffer.extend(self.order.iter().map(|&i| WaterVertex {
            position: positions[i as usize].to_array(),
            radius,
        }));

        // Gravity bytes are unsorted; the shader indexes them by particle
        // id, and they only change when the version counter moves.
        let gravity_dirty = self.staged_gravity_version != Some(gravity_version);
        if gravity_dirty {
            self.gravity_upload.clear();
            self.gravity_upload.extend_from_slice(gravity);
            self.staged_gravity_version = Some(gravity_version);
        }

        StagedFrame {
            slot,
            count: positions.len(),
            gravity_dirty,
        }
    }

    /// Staged vertex data for a ring slot.
    pub fn slot_vertices(&self, slot: usize) -> &[WaterVertex] {
        &self.slots[slot]
    }

    /// Most recently staged gravity byte buffer.
    pub fn gravity_bytes(&self) -> &[u8] {
        &self.gravity_upload
    }
}

impl Default for OutputStage {
    fn default() -> Self {
        Self::new()
    }
}
