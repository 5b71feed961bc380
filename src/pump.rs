//! Pumps: bounded-rate particle relocation.
//!
//! A pump teleports the nearest particle in its source neighborhood to a
//! jittered point in its destination neighborhood. It is not a velocity
//! field; the relocation is instantaneous and independent of the pressure
//! solve. Pump descriptions are stateless level data; the fractional
//! particle budget lives here, owned by the simulator, keyed by the pump's
//! position in the (stable, registration-ordered) pump list.

use glam::Vec3;
use log::debug;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::config::WaterConfig;

/// Level-authored pump description.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaterPump {
    pub source: Vec3,
    pub dest: Vec3,
    pub particles_per_second: f32,
    /// Squared radius around `source` from which particles may be taken.
    pub max_input_dist_sq: f32,
    /// Radius around `dest` within which relocated particles land.
    pub max_output_dist: f32,
}

/// Fractional-budget state for all pumps of the current step's snapshot.
pub struct PumpSystem {
    accumulators: Vec<f32>,
}

impl PumpSystem {
    pub fn new() -> Self {
        Self {
            accumulators: Vec::new(),
        }
    }

    /// Runs all pumps for one step, in list order. Returns the number of
    /// particles relocated.
    ///
    /// Whenever a pump's accumulated budget crosses a whole particle, the
    /// nearest eligible particle is teleported and the budget decrements.
    /// A starved pump keeps accruing budget up to `pump_backlog_cap` so the
    /// backlog it can dump once particles reappear stays bounded.
    pub fn run(
        &mut self,
        config: &WaterConfig,
        pumps: &[WaterPump],
        positions: &mut [Vec3],
        prev_positions: &mut [Vec3],
        dt: f32,
        rng: &mut Xoshiro256PlusPlus,
    ) -> usize {
        self.accumulators.resize(pumps.len(), 0.0);
        let mut relocated = 0;

        for (pump, accumulator) in pumps.iter().zip(self.accumulators.iter_mut()) {
            *accumulator += pump.particles_per_second.max(0.0) * dt;
            while *accumulator >= 1.0 {
                let Some(best) = nearest_eligible(pump, positions) else {
                    if *accumulator > config.pump_backlog_cap {
                        debug!(
                            "pump at {:?} starved, clamping backlog {:.2} -> {:.2}",
                            pump.source, *accumulator, config.pump_backlog_cap
                        );
                        *accumulator = config.pump_backlog_cap;
                    }
                    break;
                };
                positions[best] = pump.dest + jitter_in_sphere(rng) * pump.max_output_dist;
                // A teleport carries no momentum into the next tick.
                prev_positions[best] = positions[best];
                *accumulator -= 1.0;
                relocated += 1;
            }
        }
        relocated
    }
}

impl Default for PumpSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn nearest_eligible(pump: &WaterPump, positions: &[Vec3]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, p) in positions.iter().enumerate() {
        let dist_sq = (*p - pump.source).length_squared();
        if dist_sq > pump.max_input_dist_sq {
            continue;
        }
        if best.is_none_or(|(_, d)| dist_sq < d) {
            best = Some((i, dist_sq));
        }
    }
    best.map(|(i, _)| i)
}

/// Uniform sample in the unit sphere by rejection.
pub(crate) fn jitter_in_sphere(rng: &mut Xoshiro256PlusPlus) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if v.length_squared() <= 1.0 {
            return v;
        }
    }
}
