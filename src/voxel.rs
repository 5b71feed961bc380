//! Solid-voxel occupancy for particle collision.
//!
//! The world hands the simulator a packed solidity bitset at init; after that
//! the buffer is read-only for the worker thread, so no locking is needed.

use glam::{IVec3, UVec3, Vec3};

use crate::aabb::Aabb;

/// Packed bit array over the world's voxel grid. Voxels are unit cubes whose
/// integer coordinates are relative to the world bounds minimum.
#[derive(Debug, Clone)]
pub struct SolidVoxels {
    bounds: Aabb,
    dims: UVec3,
    bits: Vec<u64>,
}

impl SolidVoxels {
    /// Wraps a packed bitset covering `bounds` with one bit per unit voxel,
    /// ordered x-major, then y, then z. Bits beyond `dims` volume are
    /// ignored; a short buffer reads as empty space.
    pub fn new(bounds: Aabb, bits: Vec<u64>) -> Self {
        let dims = bounds.size().ceil().as_uvec3().max(UVec3::ONE);
        Self { bounds, dims, bits }
    }

    /// An all-empty field covering `bounds`.
    pub fn empty(bounds: Aabb) -> Self {
        let dims = bounds.size().ceil().as_uvec3().max(UVec3::ONE);
        let words = (dims.x as usize * dims.y as usize * dims.z as usize).div_ceil(64);
        Self {
            bounds,
            dims,
            bits: vec![0; words],
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    /// Voxel cell containing a world-space point.
    pub fn cell_of(&self, point: Vec3) -> IVec3 {
        (point - self.bounds.min).floor().as_ivec3()
    }

    /// World-space center of a voxel cell.
    pub fn cell_center(&self, cell: IVec3) -> Vec3 {
        self.bounds.min + cell.as_vec3() + Vec3::splat(0.5)
    }

    /// Whether the voxel at integer coordinates is solid. Out-of-range
    /// coordinates read as empty so the world-bounds clamp stays the only
    /// authority at the edges.
    pub fn is_solid(&self, cell: IVec3) -> bool {
        if cell.cmplt(IVec3::ZERO).any() || cell.cmpge(self.dims.as_ivec3()).any() {
            return false;
        }
        let idx = (cell.z as usize * self.dims.y as usize + cell.y as usize)
            * self.dims.x as usize
            + cell.x as usize;
        self.bits
            .get(idx / 64)
            .is_some_and(|word| word & (1 << (idx % 64)) != 0)
    }

    /// Whether the world-space point lies inside solid matter.
    pub fn is_solid_at(&self, point: Vec3) -> bool {
        self.is_solid(self.cell_of(point))
    }

    /// Marks a voxel solid. Test and level-construction helper; the worker
    /// never calls this after init.
    pub fn set_solid(&mut self, cell: IVec3, solid: bool) {
        if cell.cmplt(IVec3::ZERO).any() || cell.cmpge(self.dims.as_ivec3()).any() {
            return;
        }
        let idx = (cell.z as usize * self.dims.y as usize + cell.y as usize)
            * self.dims.x as usize
            + cell.x as usize;
        let word = idx / 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        if solid {
            self.bits[word] |= 1 << (idx % 64);
        } else {
            self.bits[word] &= !(1 << (idx % 64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bounds() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::splat(8.0))
    }

    #[test]
    fn test_empty_field_has_no_solids() {
        let voxels = SolidVoxels::empty(test_bounds());
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    assert!(!voxels.is_solid(IVec3::new(x, y, z)));
                }
            }
        }
    }

    #[test]
    fn test_set_and_query_roundtrip() {
        let mut voxels = SolidVoxels::empty(test_bounds());
        let cell = IVec3::new(3, 0, 7);
        voxels.set_solid(cell, true);
        assert!(voxels.is_solid(cell));
        assert!(voxels.is_solid_at(voxels.cell_center(cell)));
        voxels.set_solid(cell, false);
        assert!(!voxels.is_solid(cell));
    }

    #[test]
    fn test_out_of_range_reads_empty() {
        let voxels = SolidVoxels::empty(test_bounds());
        assert!(!voxels.is_solid(IVec3::new(-1, 0, 0)));
        assert!(!voxels.is_solid(IVec3::new(0, 8, 0)));
        assert!(!voxels.is_solid_at(Vec3::splat(100.0)));
    }

    #[test]
    fn test_short_bit_buffer_reads_empty() {
        let voxels = SolidVoxels::new(test_bounds(), vec![u64::MAX]);
        // First 64 voxels solid, the rest of the volume reads empty.
        assert!(voxels.is_solid(IVec3::new(0, 0, 0)));
        assert!(voxels.is_solid(IVec3::new(7, 7, 0)));
        assert!(!voxels.is_solid(IVec3::new(0, 0, 7)));
    }

    #[test]
    fn test_cell_of_offsets_by_bounds_min() {
        let bounds = Aabb::new(Vec3::splat(-4.0), Vec3::splat(4.0));
        let voxels = SolidVoxels::empty(bounds);
        assert_eq!(voxels.cell_of(Vec3::splat(-3.5)), IVec3::ZERO);
        assert_eq!(voxels.cell_of(Vec3::splat(3.5)), IVec3::splat(7));
    }
}
