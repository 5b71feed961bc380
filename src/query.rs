//! Query AABB registry: thread-safe sampling points for external objects.
//!
//! External code (a floating crate, a pressure plate) registers an
//! axis-aligned box and reads back how much water intersects it, the local
//! water velocity, and a buoyancy estimate. The registry holds no owning
//! reference to the caller: entries carry a liveness flag that the handle's
//! drop clears, and the worker prunes dead entries at the start of each
//! step. Results are only ever written whole, under the simulation mutex,
//! from one completed step.

use ahash::AHashMap;
use glam::Vec3;

use crate::aabb::Aabb;
use crate::config::WaterConfig;
use crate::gravity::gravity_byte;

/// Self-consistent sample from one completed simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QueryResults {
    /// Particles intersecting the box.
    pub num_intersecting: u32,
    /// Mean implicit velocity of the intersecting particles.
    pub water_velocity: Vec3,
    /// Buoyant force estimate: mean "up" (anti-gravity) of the intersecting
    /// particles, scaled by the submerged volume fraction.
    pub buoyancy: Vec3,
    /// Step index the sample was taken from.
    pub step: u64,
}

pub(crate) struct QueryEntry {
    pub alive: bool,
    pub aabb: Aabb,
    pub results: QueryResults,
}

/// Registry of live query boxes, keyed by stable handle id.
#[derive(Default)]
pub(crate) struct QueryRegistry {
    entries: AHashMap<u64, QueryEntry>,
    next_id: u64,
}

impl QueryRegistry {
    pub fn insert(&mut self, aabb: Aabb) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            QueryEntry {
                alive: true,
                aabb,
                results: QueryResults::default(),
            },
        );
        id
    }

    pub fn set_aabb(&mut self, id: u64, aabb: Aabb) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.aabb = aabb;
        }
    }

    pub fn results(&self, id: u64) -> QueryResults {
        self.entries
            .get(&id)
            .map(|e| e.results)
            .unwrap_or_default()
    }

    pub fn mark_dead(&mut self, id: u64) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.alive = false;
        }
    }

    /// Drops owner-destroyed entries. Run at the start of each step.
    pub fn prune_dead(&mut self) {
        self.entries.retain(|_, e| e.alive);
    }

    /// Cheap copy of the live boxes, taken under the mutex so the solver
    /// work can happen without holding any lock.
    pub fn snapshot(&self) -> Vec<(u64, Aabb)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.alive)
            .map(|(id, e)| (*id, e.aabb))
            .collect()
    }

    pub fn store_results(&mut self, id: u64, results: QueryResults) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.results = results;
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Computes a query sample against the just-completed particle state.
/// Called by the worker with no lock held.
pub(crate) fn compute_results(
    config: &WaterConfig,
    aabb: Aabb,
    positions: &[Vec3],
    velocities: &[Vec3],
    gravity: &[u8],
    step: u64,
) -> QueryResults {
    let mut num = 0u32;
    let mut velocity_sum = Vec3::ZERO;
    let mut up_sum = Vec3::ZERO;
    for (i, p) in positions.iter().enumerate() {
        if !aabb.contains(*p) {
            continue;
        }
        num += 1;
        velocity_sum += velocities[i];
        up_sum += gravity_byte::dir(gravity[i]).up();
    }
    if num == 0 {
        return QueryResults {
            step,
            ..Default::default()
        };
    }

    let inv = 1.0 / num as f32;
    let nominal_radius = 0.5 * (config.min_particle_radius + config.max_particle_radius);
    let particle_volume = 4.0 / 3.0 * std::f32::consts::PI * nominal_radius.powi(3);
    let submerged =
        (num as f32 * particle_volume / aabb.volume().max(f32::EPSILON)).clamp(0.0, 1.0);

    QueryResults {
        num_intersecting: num,
        water_velocity: velocity_sum * inv,
        buoyancy: up_sum * inv * submerged * config.buoyancy_gain,
        step,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gravity::GravityDir;

    #[test]
    fn test_registry_lifecycle() {
        let mut registry = QueryRegistry::default();
        let a = registry.insert(Aabb::new(Vec3::ZERO, Vec3::ONE));
        let b = registry.insert(Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert_ne!(a, b, "handle ids must be unique");
        assert_eq!(registry.len(), 2);

        registry.mark_dead(a);
        assert_eq!(registry.snapshot().len(), 1, "dead entries leave snapshots");
        registry.prune_dead();
        assert_eq!(registry.len(), 1);
        // Results for a pruned id are neutral, not an error.
        assert_eq!(registry.results(a), QueryResults::default());
    }

    #[test]
    fn test_empty_box_returns_neutral_results() {
        let config = WaterConfig::default();
        let results = compute_results(
            &config,
            Aabb::new(Vec3::ZERO, Vec3::ONE),
            &[Vec3::splat(10.0)],
            &[Vec3::X],
            &[gravity_byte::pack(GravityDir::YNeg, false)],
            5,
        );
        assert_eq!(results.num_intersecting, 0);
        assert_eq!(results.water_velocity, Vec3::ZERO);
        assert_eq!(results.buoyancy, Vec3::ZERO);
        assert_eq!(results.step, 5);
    }

    #[test]
    fn test_velocity_is_mean_of_intersecting() {
        let config = WaterConfig::default();
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let positions = [Vec3::ONE, Vec3::splat(1.5), Vec3::splat(9.0)];
        let velocities = [Vec3::X, Vec3::new(3.0, 0.0, 0.0), Vec3::Y * 100.0];
        let gravity = [gravity_byte::pack(GravityDir::YNeg, false); 3];
        let results =
            compute_results(&config, aabb, &positions, &velocities, &gravity, 0);
        assert_eq!(results.num_intersecting, 2);
        assert_eq!(results.water_velocity, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_buoyancy_opposes_gravity() {
        let config = WaterConfig::default();
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let positions = [Vec3::splat(0.5); 4];
        let velocities = [Vec3::ZERO; 4];
        let gravity = [gravity_byte::pack(GravityDir::YNeg, false); 4];
        let results =
            compute_results(&config, aabb, &positions, &velocities, &gravity, 0);
        assert!(results.buoyancy.y > 0.0, "buoyancy must point up for YNeg gravity");
        assert_eq!(results.buoyancy.x, 0.0);

        // Sideways gravity pushes the other way.
        let gravity = [gravity_byte::pack(GravityDir::XPos, false); 4];
        let results =
            compute_results(&config, aabb, &positions, &velocities, &gravity, 0);
        assert!(results.buoyancy.x < 0.0);
    }

    #[test]
    fn test_submerged_fraction_saturates() {
        let config = WaterConfig::default();
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(0.2));
        let positions = vec![Vec3::splat(0.1); 1000];
        let velocities = vec![Vec3::ZERO; 1000];
        let gravity = vec![gravity_byte::pack(GravityDir::YNeg, false); 1000];
        let results =
            compute_results(&config, aabb, &positions, &velocities, &gravity, 0);
        assert!(
            results.buoyancy.length() <= config.buoyancy_gain + 1e-4,
            "submerged fraction must clamp at full"
        );
    }
}
