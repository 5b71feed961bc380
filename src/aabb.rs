//! Axis-aligned boxes and the particle raycast types.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn volume(&self) -> f32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Clamps a point into the box, leaving `margin` of clearance on every
    /// side. A box thinner than `2 * margin` collapses to its center.
    pub fn clamp_with_margin(&self, point: Vec3, margin: f32) -> Vec3 {
        let min = self.min + Vec3::splat(margin);
        let max = self.max - Vec3::splat(margin);
        if min.cmpgt(max).any() {
            self.center()
        } else {
            point.clamp(min, max)
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}

/// Ray for intersection queries against the fluid surface.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Nearest non-negative hit parameter against a sphere, if any.
    pub fn hit_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - radius * radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let sqrt_disc = disc.sqrt();
        let t = -b - sqrt_disc;
        if t >= 0.0 {
            Some(t)
        } else {
            let t = -b + sqrt_disc;
            (t >= 0.0).then_some(t)
        }
    }
}

/// Result of a successful [`Ray`] intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub position: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_contains() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        assert!(aabb.contains(Vec3::ONE));
        assert!(aabb.contains(Vec3::ZERO), "boundary points are inside");
        assert!(!aabb.contains(Vec3::splat(2.1)));
    }

    #[test]
    fn test_aabb_normalizes_corners() {
        let aabb = Aabb::new(Vec3::splat(3.0), Vec3::ZERO);
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(3.0));
        assert_eq!(aabb.volume(), 27.0);
    }

    #[test]
    fn test_clamp_with_margin() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
        let p = aabb.clamp_with_margin(Vec3::new(-5.0, 12.0, 5.0), 0.5);
        assert_eq!(p, Vec3::new(0.5, 9.5, 5.0));
        // Degenerate thin box collapses to center instead of inverting.
        let thin = Aabb::new(Vec3::ZERO, Vec3::new(0.1, 10.0, 10.0));
        let p = thin.clamp_with_margin(Vec3::splat(5.0), 0.5);
        assert_eq!(p.x, 0.05);
    }

    #[test]
    fn test_ray_hits_sphere_head_on() {
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        let t = ray.hit_sphere(Vec3::ZERO, 1.0).expect("must hit");
        assert!((t - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_from_inside_sphere() {
        let ray = Ray::new(Vec3::ZERO, Vec3::Y);
        let t = ray.hit_sphere(Vec3::ZERO, 1.0).expect("must hit exit point");
        assert!((t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_misses_behind() {
        let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::X);
        assert!(ray.hit_sphere(Vec3::ZERO, 1.0).is_none());
    }
}
