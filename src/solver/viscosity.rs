//! Radial viscosity and short-range elastic cohesion.
//!
//! Works on the implicit velocities of the position-based scheme: the
//! per-tick displacement `position - prev_position` stands in for velocity.
//! For every neighbor pair the relative displacement is projected onto the
//! separation axis and partially cancelled, which damps compression and
//! expansion waves without touching tangential flow. A weak elastic term
//! pulls separating pairs back toward their natural spacing; bonds are
//! recomputed from proximity every step (no persisted bond graph) and break
//! naturally once a pair leaves the influence radius.

use glam::Vec3;

use crate::config::WaterConfig;
use crate::grid::SpatialHashGrid;

pub struct ViscosityElasticitySolver {
    pairs: Vec<usize>,
}

impl ViscosityElasticitySolver {
    pub fn new() -> Self {
        Self {
            pairs: Vec::with_capacity(64),
        }
    }

    /// Applies symmetric pairwise impulses to `positions`. `prev` is the
    /// position array from the start of the tick and is left untouched.
    pub fn apply(
        &mut self,
        config: &WaterConfig,
        grid: &SpatialHashGrid,
        positions: &mut [Vec3],
        prev: &[Vec3],
    ) {
        debug_assert_eq!(positions.len(), prev.len());
        let radius = config.influence_radius;
        let rest_length = 2.0 * config.min_particle_radius;

        for i in 0..positions.len() {
            // Each unordered pair is handled once.
            self.pairs.clear();
            grid.for_each_neighbor(i, positions, radius, |j| {
                if j > i {
                    self.pairs.push(j);
                }
            });
            for &j in &self.pairs {
                let delta = positions[j] - positions[i];
                let dist = delta.length();
                if dist >= radius || dist < config.distance_epsilon {
                    continue;
                }
                let dir = delta / dist;
                let q = 1.0 - dist / radius;

                // Relative radial motion this tick, positive = separating.
                let disp_i = positions[i] - prev[i];
                let disp_j = positions[j] - prev[j];
                let radial = (disp_j - disp_i).dot(dir);

                let mut correction = config.radial_viscosity_gain * q * radial;
                if radial > 0.0 && dist > rest_length {
                    // Elastic bond resisting stretch beyond natural length.
                    correction += config.elasticity * q * (dist - rest_length);
                }

                let half = dir * (correction * 0.5);
                positions[i] += half;
                positions[j] -= half;
            }
        }
    }
}

impl Default for ViscosityElasticitySolver {
    fn default() -> Self {
        Self::new()
    }
}
