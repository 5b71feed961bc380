//! Collision against solid voxels, blocker volumes, and the world bounds.
//!
//! Priority order: voxels first (hard boundary), then blockers (soft,
//! gravity-masked volumes), then the world-bounds clamp. Valid level data
//! keeps blockers out of solid voxels; if they do overlap, the voxel
//! resolution wins because it ran first and the blocker pass is one-sided.
//! Deep initial interpenetration converges over a few steps rather than
//! resolving instantly.

use glam::Vec3;

use crate::blocker::WaterBlocker;
use crate::config::WaterConfig;
use crate::gravity::GravityDir;
use crate::voxel::SolidVoxels;

pub struct CollisionResolver<'a> {
    config: &'a WaterConfig,
    voxels: &'a SolidVoxels,
    blockers: &'a [WaterBlocker],
}

impl<'a> CollisionResolver<'a> {
    pub fn new(
        config: &'a WaterConfig,
        voxels: &'a SolidVoxels,
        blockers: &'a [WaterBlocker],
    ) -> Self {
        Self {
            config,
            voxels,
            blockers,
        }
    }

    /// Position-only resolution, used while the density relaxation resolves
    /// its displacements. Returns the corrected position.
    pub fn resolve_position(&self, position: Vec3, dir: GravityDir) -> Vec3 {
        let mut p = self.push_out_of_voxels(position);
        for blocker in self.blockers {
            if blocker.blocks_dir(dir) {
                if let Some(resolved) = blocker.resolve(p, self.config.min_particle_radius) {
                    p = resolved;
                }
            }
        }
        self.voxels
            .bounds()
            .clamp_with_margin(p, self.config.min_particle_radius)
    }

    /// Full resolution for the final pass: corrects the position and damps
    /// the implicit velocity along the contact normal so particles settle
    /// against solids instead of oscillating.
    pub fn resolve(&self, position: &mut Vec3, prev: &mut Vec3, dir: GravityDir) {
        let corrected = self.resolve_position(*position, dir);
        if corrected == *position {
            return;
        }
        let normal = (corrected - *position).normalize_or_zero();
        let displacement = *position - *prev;
        let normal_speed = displacement.dot(normal);
        // Remove the motion into the contact and keep a small restitution
        // bounce scaled by the elasticity tunable.
        let damped =
            displacement - normal * (normal_speed * (1.0 + self.config.elasticity)).min(0.0);
        *position = corrected;
        *prev = corrected - damped;
    }

    /// Pushes a point out of solid voxels along the face of least
    /// penetration that has empty space behind it. A particle whose center
    /// cell is open is still kept `min_particle_radius` clear of solid face
    /// neighbors.
    fn push_out_of_voxels(&self, position: Vec3) -> Vec3 {
        let radius = self.config.min_particle_radius;
        let cell = self.voxels.cell_of(position);

        if self.voxels.is_solid(cell) {
            // Inside solid matter: exit through the cheapest open face.
            let center = self.voxels.cell_center(cell);
            let mut best: Option<(f32, Vec3, f32)> = None;
            for dir in GravityDir::ALL {
                let n = dir.unit();
                if self.voxels.is_solid(cell + n.as_ivec3()) {
                    continue;
                }
                // Distance from the point to this face, measured outward.
                let exit = 0.5 - (position - center).dot(n);
                let face = center.dot(n) + 0.5;
                if best.is_none_or(|(d, _, _)| exit < d) {
                    best = Some((exit, n, face));
                }
            }
            if let Some((_, n, face)) = best {
                return position + n * (face - position.dot(n) + radius);
            }
            // Fully enclosed; leave it and let later steps converge.
            return position;
        }

        // Open cell: keep clearance from solid face neighbors.
        let mut p = position;
        let center = self.voxels.cell_center(cell);
        for dir in GravityDir::ALL {
            let n = dir.unit();
            if !self.voxels.is_solid(cell + n.as_ivec3()) {
                continue;
            }
            // Shared face plane sits half a voxel from the cell center.
            let face = center.dot(n) + 0.5;
            let gap = face - p.dot(n);
            if gap < radius {
                p -= n * (radius - gap);
            }
        }
        p
    }
}
