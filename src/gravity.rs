//! Per-particle gravity directions and their bit-packed representations.
//!
//! Gravity is the game's core mechanic: every particle carries one of six
//! axis-aligned "down" directions that can be flipped at runtime. The
//! direction travels to the GPU as a single byte (low bits direction, high
//! bit highlight), so the packing here must stay in sync with the renderer.

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Number of distinct gravity directions.
pub const GRAVITY_DIR_COUNT: usize = 6;

/// One of the six axis-aligned gravity directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GravityDir {
    XPos = 0,
    XNeg = 1,
    YPos = 2,
    YNeg = 3,
    ZPos = 4,
    ZNeg = 5,
}

impl GravityDir {
    pub const ALL: [GravityDir; GRAVITY_DIR_COUNT] = [
        GravityDir::XPos,
        GravityDir::XNeg,
        GravityDir::YPos,
        GravityDir::YNeg,
        GravityDir::ZPos,
        GravityDir::ZNeg,
    ];

    /// Unit vector pointing along this gravity direction ("down").
    pub fn unit(self) -> Vec3 {
        match self {
            GravityDir::XPos => Vec3::X,
            GravityDir::XNeg => Vec3::NEG_X,
            GravityDir::YPos => Vec3::Y,
            GravityDir::YNeg => Vec3::NEG_Y,
            GravityDir::ZPos => Vec3::Z,
            GravityDir::ZNeg => Vec3::NEG_Z,
        }
    }

    /// Unit vector opposing this gravity direction ("up").
    pub fn up(self) -> Vec3 {
        -self.unit()
    }

    /// Axis index (0 = X, 1 = Y, 2 = Z).
    pub fn axis(self) -> usize {
        (self as usize) >> 1
    }

    /// Sign along the axis: +1 for positive directions, -1 for negative.
    pub fn sign(self) -> f32 {
        if (self as u8) & 1 == 0 { 1.0 } else { -1.0 }
    }

    pub fn opposite(self) -> GravityDir {
        Self::from_index((self as u8) ^ 1).unwrap_or(self)
    }

    pub fn from_index(index: u8) -> Option<GravityDir> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn mask(self) -> GravityMask {
        GravityMask::from_bits_truncate(1 << (self as u8))
    }
}

bitflags! {
    /// Set of gravity directions, e.g. the directions a blocker blocks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GravityMask: u8 {
        const X_POS = 1 << 0;
        const X_NEG = 1 << 1;
        const Y_POS = 1 << 2;
        const Y_NEG = 1 << 3;
        const Z_POS = 1 << 4;
        const Z_NEG = 1 << 5;
    }
}

impl GravityMask {
    pub const ALL_DIRS: GravityMask = GravityMask::all();

    pub fn contains_dir(self, dir: GravityDir) -> bool {
        self.intersects(dir.mask())
    }
}

/// Bit layout of the per-particle gravity byte shared with the renderer.
pub mod gravity_byte {
    use super::GravityDir;

    pub const DIR_MASK: u8 = 0x07;
    pub const HIGHLIGHT: u8 = 0x80;

    pub fn pack(dir: GravityDir, highlight: bool) -> u8 {
        (dir as u8) | if highlight { HIGHLIGHT } else { 0 }
    }

    pub fn dir(byte: u8) -> GravityDir {
        GravityDir::from_index(byte & DIR_MASK).unwrap_or(GravityDir::YNeg)
    }

    pub fn is_highlighted(byte: u8) -> bool {
        byte & HIGHLIGHT != 0
    }
}

/// Oct-group index for a gravity direction within a spatial-hash cell.
///
/// Cells bucket their members by gravity context so neighbor iteration can
/// skip groups irrelevant to a particle's own gravity. Four groups per cell:
/// the Z pair folds onto the X pair's groups, which keeps the group count at
/// the budgeted maximum while still separating the common Y flips.
pub fn oct_group(dir: GravityDir) -> usize {
    (dir as usize) & (crate::grid::MAX_OCT_GROUPS_PER_CELL - 1)
}

/// Mask of all gravity directions that map to the given oct group.
pub fn oct_group_mask(group: usize) -> GravityMask {
    let mut mask = GravityMask::empty();
    for dir in GravityDir::ALL {
        if oct_group(dir) == group {
            mask |= dir.mask();
        }
    }
    mask
}
