//! Author-placed blocker volumes.
//!
//! A blocker is an oriented rectangle that forbids water from crossing it,
//! but only for particles whose current gravity direction is in the
//! blocker's mask. Level logic rebuilds the blocker list from live entity
//! state every frame; the simulator only ever sees a snapshot copy.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::gravity::{GravityDir, GravityMask};

/// Oriented rectangular blocker volume.
///
/// `tangent` and `bitangent` are half-extent vectors spanning the rectangle
/// from its center; `normal` is the unit facing direction particles are
/// pushed toward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaterBlocker {
    pub center: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
    /// Gravity directions this blocker applies to.
    pub blocks: GravityMask,
}

impl WaterBlocker {
    pub fn blocks_dir(&self, dir: GravityDir) -> bool {
        self.blocks.contains_dir(dir)
    }

    /// Signed local coordinates of a point: rectangle coordinates in
    /// half-extent units and the offset along the normal.
    pub fn local_coords(&self, point: Vec3) -> (f32, f32, f32) {
        let d = point - self.center;
        let t_len_sq = self.tangent.length_squared().max(f32::EPSILON);
        let b_len_sq = self.bitangent.length_squared().max(f32::EPSILON);
        (
            d.dot(self.tangent) / t_len_sq,
            d.dot(self.bitangent) / b_len_sq,
            d.dot(self.normal),
        )
    }

    /// One-sided planar pushback: a point inside the rectangle footprint
    /// and within `radius` of the plane is moved out along `+normal`.
    /// Points already behind by more than `radius` are on the far side and
    /// are left alone.
    pub fn resolve(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        let (s, t, n) = self.local_coords(point);
        if s.abs() > 1.0 || t.abs() > 1.0 {
            return None;
        }
        if n >= radius || n <= -radius {
            return None;
        }
        Some(point + self.normal * (radius - n))
    }
}
