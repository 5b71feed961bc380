//! Double density relaxation (Clavet et al.).
//!
//! Approximate incompressibility without a pressure solve: every particle
//! accumulates a far density (weighted `q²`) and a near density (weighted
//! `q³`) from its neighbors, derives a pressure and a close-packing
//! near-pressure from them, and the pair displacements those pressures imply
//! are applied directly to positions. Velocity stays implicit in the
//! position delta across the tick.
//!
//! One deliberate divergence from the Clavet formulation: far pressure is
//! clamped non-negative too, not just near pressure. Clavet lets an
//! under-dense neighborhood pull inward through negative pressure; here
//! that attraction would let an isolated pair collapse below the
//! coincidence epsilon, so cohesion is delegated entirely to the
//! elasticity solver and this pass only ever pushes.

use glam::Vec3;

use crate::config::WaterConfig;
use crate::grid::SpatialHashGrid;

/// Neighbor candidate cached for the displacement pass.
#[derive(Clone, Copy)]
struct Neighbor {
    index: usize,
    q: f32,
    dir: Vec3,
    degenerate: bool,
}

pub struct DensityRelaxationSolver {
    neighbors: Vec<Neighbor>,
}

impl DensityRelaxationSolver {
    pub fn new() -> Self {
        Self {
            neighbors: Vec::with_capacity(64),
        }
    }

    /// Runs one relaxation sweep over all particles, mutating positions in
    /// place. `clamp` is applied to every displaced position so particles
    /// never relax into solid matter (the final collision pass still covers
    /// motion from the other solver stages).
    ///
    /// Particles are processed sequentially; later particles see the
    /// already-displaced positions of earlier ones, which is what lets a
    /// single sweep per tick converge over a few ticks.
    pub fn relax<F>(
        &mut self,
        config: &WaterConfig,
        grid: &SpatialHashGrid,
        positions: &mut [Vec3],
        clamp: F,
    ) where
        F: Fn(usize, Vec3) -> Vec3,
    {
        let radius = config.influence_radius;
        let dt_sq = config.dt() * config.dt();

        for i in 0..positions.len() {
            let pos_i = positions[i];

            // Density pass, caching overlap factor and separation direction
            // for the displacement pass.
            self.neighbors.clear();
            let mut density = config.ambient_density;
            let mut near_density = 0.0;
            grid.for_each_neighbor(i, positions, radius, |j| {
                let delta = positions[j] - pos_i;
                let dist = delta.length();
                if dist >= radius {
                    return;
                }
                let q = 1.0 - dist / radius;
                density += q * q;
                near_density += q * q * q;
                let degenerate = dist < config.distance_epsilon;
                // Coincident pairs get a fixed deterministic axis instead
                // of a divide by (near) zero.
                let dir = if degenerate { Vec3::X } else { delta / dist };
                self.neighbors.push(Neighbor {
                    index: j,
                    q,
                    dir,
                    degenerate,
                });
            });

            let pressure = (config.stiffness * (density - config.target_density)).max(0.0);
            let near_pressure =
                (config.stiffness * config.near_to_far * near_density).max(0.0);

            // Displacement pass: half the pairwise correction to each side.
            let mut shift_i = Vec3::ZERO;
            for n in &self.neighbors {
                let mut magnitude = dt_sq * (pressure * n.q + near_pressure * n.q * n.q);
                if n.degenerate {
                    // Guarantee coincident pairs end the step at least an
                    // epsilon apart; this is a recoverable local correction,
                    // not a fault.
                    magnitude = magnitude.max(config.distance_epsilon);
                }
                let half = n.dir * (magnitude * 0.5);
                positions[n.index] = clamp(n.index, positions[n.index] + half);
                shift_i -= half;
            }
            positions[i] = clamp(i, pos_i + shift_i);
        }
    }
}

impl Default for DensityRelaxationSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gravity::{gravity_byte, GravityDir};

    fn relax_once(config: &WaterConfig, positions: &mut [Vec3]) {
        let gravity: Vec<u8> = positions
            .iter()
            .map(|_| gravity_byte::pack(GravityDir::YNeg, false))
            .collect();
        let mut grid = SpatialHashGrid::new(config.influence_radius);
        grid.build(positions, &gravity);
        let mut solver = DensityRelaxationSolver::new();
        solver.relax(config, &grid, positions, |_, p| p);
    }

    #[test]
    fn test_overpacked_pair_separates() {
        let config = WaterConfig::default();
        let mut positions = vec![
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.05, 1.0, 1.0),
        ];
        let before = (positions[1] - positions[0]).length();
        for _ in 0..20 {
            relax_once(&config, &mut positions);
        }
        let after = (positions[1] - positions[0]).length();
        assert!(
            after > before,
            "near pressure must push a tightly packed pair apart ({before} -> {after})"
        );
    }

    #[test]
    fn test_separation_never_collapses_below_epsilon() {
        let config = WaterConfig::default();
        let spacing = 2.0 * config.min_particle_radius;
        let mut positions = vec![
            Vec3::new(2.0, 2.0, 2.0),
            Vec3::new(2.0 + spacing, 2.0, 2.0),
        ];
        for _ in 0..60 {
            // Push the pair together, then let the solver respond.
            let mid = (positions[0] + positions[1]) * 0.5;
            positions[0] = positions[0].lerp(mid, 0.3);
            positions[1] = positions[1].lerp(mid, 0.3);
            relax_once(&config, &mut positions);
            let sep = (positions[1] - positions[0]).length();
            assert!(
                sep >= config.distance_epsilon,
                "separation {sep} fell below the epsilon floor"
            );
        }
    }

    #[test]
    fn test_coincident_pair_resolves_deterministically() {
        let config = WaterConfig::default();
        let p = Vec3::splat(3.0);
        let mut a = vec![p, p];
        let mut b = vec![p, p];
        for _ in 0..5 {
            relax_once(&config, &mut a);
            relax_once(&config, &mut b);
        }
        assert_eq!(a, b, "degenerate pairs must resolve identically");
        assert!(
            a[0].is_finite() && a[1].is_finite(),
            "no NaN from zero separation"
        );
        assert!(
            (a[0] - a[1]).length() >= config.distance_epsilon,
            "coincident pair must end at least an epsilon apart"
        );
    }

    #[test]
    fn test_isolated_particle_is_stationary() {
        let config = WaterConfig::default();
        let mut positions = vec![Vec3::splat(5.0)];
        relax_once(&config, &mut positions);
        assert_eq!(
            positions[0],
            Vec3::splat(5.0),
            "lone particle has no neighbors and must not move"
        );
    }

    #[test]
    fn test_clamp_is_applied_to_displacements() {
        let config = WaterConfig::default();
        let mut positions = vec![
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.02, 1.0, 1.0),
        ];
        let gravity: Vec<u8> = vec![gravity_byte::pack(GravityDir::YNeg, false); 2];
        let mut grid = SpatialHashGrid::new(config.influence_radius);
        grid.build(&positions, &gravity);
        let mut solver = DensityRelaxationSolver::new();
        let ceiling = 1.01;
        solver.relax(&config, &grid, &mut positions, |_, p| {
            Vec3::new(p.x.min(ceiling), p.y, p.z)
        });
        assert!(positions.iter().all(|p| p.x <= ceiling));
    }
}
