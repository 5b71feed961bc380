//! Water simulation tunables.
//!
//! An explicit config struct passed at construction; nothing here is a
//! global tweakable. Defaults mirror the values the fluid was tuned
//! against. The solver coefficients (stiffness, target
//! density, near/far ratio, viscosity gain) follow the double density
//! relaxation method and are calibration parameters, not a correctness
//! contract. Retune them against reference footage, not against the tests.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    /// Neighbor influence radius; also the spatial hash cell size.
    pub influence_radius: f32,
    /// Smallest implicit particle radius (dense packing).
    pub min_particle_radius: f32,
    /// Largest implicit particle radius (isolated particles, rendering).
    pub max_particle_radius: f32,
    /// Below this separation a pair is treated as coincident and separated
    /// along a fixed axis instead of dividing by the distance.
    pub distance_epsilon: f32,

    /// Pressure stiffness `k` in `pressure = k * (density - target)`.
    pub stiffness: f32,
    /// Rest density the relaxation converges toward.
    pub target_density: f32,
    /// Baseline density credited to every particle so sparse surface
    /// particles are not over-corrected.
    pub ambient_density: f32,
    /// Near-pressure multiplier relative to far pressure.
    pub near_to_far: f32,

    /// Gain applied to radial relative motion damping.
    pub radial_viscosity_gain: f32,
    /// Short-range cohesion strength; also the restitution damping used
    /// when particles settle against solids.
    pub elasticity: f32,

    /// Gravity acceleration magnitude, applied along each particle's own
    /// gravity direction.
    pub gravity_accel: f32,
    /// Velocity retained per step (mild air drag keeps stacks from ringing).
    pub velocity_damping: f32,

    /// Fixed simulation rate in steps per second.
    pub steps_per_second: u32,

    /// Scale applied to the submerged-fraction buoyancy estimate reported
    /// through query AABBs.
    pub buoyancy_gain: f32,
    /// Accumulated pump budget is clamped to this many whole particles
    /// while a pump is starved of eligible input.
    pub pump_backlog_cap: f32,
}

impl WaterConfig {
    /// Fixed timestep implied by `steps_per_second`.
    pub fn dt(&self) -> f32 {
        1.0 / self.steps_per_second.max(1) as f32
    }
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            influence_radius: 0.4,
            min_particle_radius: 0.1,
            max_particle_radius: 0.2,
            distance_epsilon: 1e-4,

            stiffness: 0.04,
            target_density: 10.0,
            ambient_density: 1.5,
            near_to_far: 1.5,

            radial_viscosity_gain: 0.4,
            elasticity: 0.1,

            gravity_accel: 10.0,
            velocity_damping: 0.999,

            steps_per_second: 60,

            buoyancy_gain: 12.0,
            pump_backlog_cap: 4.0,
        }
    }
}
