//! Spatial hash over particle positions.
//!
//! Rebuilt from scratch every step; the rebuild is cheap next to the solver
//! passes and sidesteps incremental-update bugs. The table is fixed size:
//! cell coordinates hash into one of [`NUM_CELL_CHUNKS`] chunks of
//! [`CELLS_PER_CHUNK`]³ cells each, so memory does not depend on world size.
//! Hash collisions alias distant regions into the same bucket; callers must
//! distance-check every candidate anyway, so aliasing only ever adds
//! candidates, never hides a true neighbor.
//!
//! Each cell splits its members into up to [`MAX_OCT_GROUPS_PER_CELL`]
//! oct groups keyed by gravity context, so a lookup restricted to specific
//! gravity directions skips the rest of the bucket. The solver passes
//! themselves (density, viscosity, collision) model interactions that span
//! gravity contexts, so they scan every group via [`for_each_neighbor`];
//! the masked entry point [`for_each_neighbor_at`] is for gravity-selective
//! callers such as gameplay probes.
//!
//! [`for_each_neighbor`]: SpatialHashGrid::for_each_neighbor
//! [`for_each_neighbor_at`]: SpatialHashGrid::for_each_neighbor_at

use glam::{IVec3, Vec3};

use crate::gravity::{self, gravity_byte, GravityMask};

/// Cells per chunk edge.
pub const CELLS_PER_CHUNK: usize = 16;
/// Chunk slots in the hash table.
pub const NUM_CELL_CHUNKS: usize = 64;
/// Oct groups per cell.
pub const MAX_OCT_GROUPS_PER_CELL: usize = 4;

const CELLS_PER_CHUNK_VOLUME: usize = CELLS_PER_CHUNK * CELLS_PER_CHUNK * CELLS_PER_CHUNK;
const BUCKET_COUNT: usize = NUM_CELL_CHUNKS * CELLS_PER_CHUNK_VOLUME * MAX_OCT_GROUPS_PER_CELL;

/// Head/next intrusive bucket lists over particle indices.
pub struct SpatialHashGrid {
    cell_size: f32,
    heads: Vec<i32>,
    next: Vec<i32>,
}

impl SpatialHashGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            heads: vec![-1; BUCKET_COUNT],
            next: Vec::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn cell_of(&self, point: Vec3) -> IVec3 {
        (point / self.cell_size).floor().as_ivec3()
    }

    fn chunk_slot(chunk: IVec3) -> usize {
        // Ericson-style integer hash on the chunk coordinates.
        let h = (chunk.x.wrapping_mul(0x8da6_b343_u32 as i32)
            ^ chunk.y.wrapping_mul(0xd816_3841_u32 as i32)
            ^ chunk.z.wrapping_mul(0xcb1a_b31f_u32 as i32)) as u32;
        h as usize % NUM_CELL_CHUNKS
    }

    /// Bucket base (start of the cell's oct-group run) for a cell coordinate.
    fn cell_base(cell: IVec3) -> usize {
        let chunk = IVec3::new(
            cell.x.div_euclid(CELLS_PER_CHUNK as i32),
            cell.y.div_euclid(CELLS_PER_CHUNK as i32),
            cell.z.div_euclid(CELLS_PER_CHUNK as i32),
        );
        let local = IVec3::new(
            cell.x.rem_euclid(CELLS_PER_CHUNK as i32),
            cell.y.rem_euclid(CELLS_PER_CHUNK as i32),
            cell.z.rem_euclid(CELLS_PER_CHUNK as i32),
        );
        let cell_index = (local.z as usize * CELLS_PER_CHUNK + local.y as usize)
            * CELLS_PER_CHUNK
            + local.x as usize;
        (Self::chunk_slot(chunk) * CELLS_PER_CHUNK_VOLUME + cell_index) * MAX_OCT_GROUPS_PER_CELL
    }

    /// Rebuilds all buckets from the current positions and gravity bytes.
    pub fn build(&mut self, positions: &[Vec3], gravity: &[u8]) {
        debug_assert_eq!(positions.len(), gravity.len());
        self.heads.fill(-1);
        self.next.clear();
        self.next.resize(positions.len(), -1);
        for (i, position) in positions.iter().enumerate() {
            let group = gravity::oct_group(gravity_byte::dir(gravity[i]));
            let bucket = Self::cell_base(self.cell_of(*position)) + group;
            self.next[i] = self.heads[bucket];
            self.heads[bucket] = i as i32;
        }
    }

    /// Calls `f` for every particle index that may lie within `radius` of
    /// `point`, restricted to oct groups whose gravity set intersects
    /// `mask`. Candidates are not distance-filtered and carry no ordering
    /// guarantee; `skip` (usually the querying particle itself) is omitted.
    pub fn for_each_neighbor_at<F: FnMut(usize)>(
        &self,
        point: Vec3,
        radius: f32,
        mask: GravityMask,
        skip: Option<usize>,
        mut f: F,
    ) {
        let min_cell = self.cell_of(point - Vec3::splat(radius));
        let max_cell = self.cell_of(point + Vec3::splat(radius));

        // Aliased cells in the window would yield their bucket twice;
        // remember visited bucket bases and skip repeats.
        let mut visited = [usize::MAX; 27];
        let mut visited_len = 0;

        for z in min_cell.z..=max_cell.z {
            for y in min_cell.y..=max_cell.y {
                for x in min_cell.x..=max_cell.x {
                    let base = Self::cell_base(IVec3::new(x, y, z));
                    if visited[..visited_len].contains(&base) {
                        continue;
                    }
                    if visited_len < visited.len() {
                        visited[visited_len] = base;
                        visited_len += 1;
                    }
                    for group in 0..MAX_OCT_GROUPS_PER_CELL {
                        if !gravity::oct_group_mask(group).intersects(mask) {
                            continue;
                        }
                        let mut j = self.heads[base + group];
                        while j >= 0 {
                            let idx = j as usize;
                            if Some(idx) != skip {
                                f(idx);
                            }
                            j = self.next[idx];
                        }
                    }
                }
            }
        }
    }

    /// Neighbor candidates of particle `index`, all gravity contexts.
    pub fn for_each_neighbor<F: FnMut(usize)>(
        &self,
        index: usize,
        positions: &[Vec3],
        radius: f32,
        f: F,
    ) {
        self.for_each_neighbor_at(
            positions[index],
            radius,
            GravityMask::ALL_DIRS,
            Some(index),
            f,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gravity::GravityDir;

    fn bytes(dirs: &[GravityDir]) -> Vec<u8> {
        dirs.iter().map(|d| gravity_byte::pack(*d, false)).collect()
    }

    fn collect_neighbors(grid: &SpatialHashGrid, i: usize, positions: &[Vec3]) -> Vec<usize> {
        let mut out = Vec::new();
        grid.for_each_neighbor(i, positions, 0.4, |j| out.push(j));
        out.sort_unstable();
        out.dedup();
        out
    }

    #[test]
    fn test_finds_true_neighbors() {
        let positions = vec![
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.2, 1.0, 1.0),
            Vec3::new(1.0, 1.3, 1.0),
            Vec3::new(50.0, 50.0, 50.0),
        ];
        let gravity = bytes(&[GravityDir::YNeg; 4]);
        let mut grid = SpatialHashGrid::new(0.4);
        grid.build(&positions, &gravity);

        let neighbors = collect_neighbors(&grid, 0, &positions);
        assert!(neighbors.contains(&1), "in-radius neighbor must be yielded");
        assert!(neighbors.contains(&2), "in-radius neighbor must be yielded");
        assert!(!neighbors.contains(&0), "query particle is skipped");
    }

    #[test]
    fn test_mixed_gravity_neighbors_still_found() {
        // Density interactions span gravity contexts; with a full mask the
        // oct-group split must not hide anyone.
        let positions = vec![Vec3::splat(2.0), Vec3::new(2.1, 2.0, 2.0)];
        let gravity = bytes(&[GravityDir::YNeg, GravityDir::ZPos]);
        let mut grid = SpatialHashGrid::new(0.4);
        grid.build(&positions, &gravity);
        assert_eq!(collect_neighbors(&grid, 0, &positions), vec![1]);
    }

    #[test]
    fn test_mask_filters_gravity_groups() {
        let positions = vec![Vec3::splat(2.0), Vec3::new(2.1, 2.0, 2.0)];
        let gravity = bytes(&[GravityDir::YNeg, GravityDir::YPos]);
        let mut grid = SpatialHashGrid::new(0.4);
        grid.build(&positions, &gravity);

        let mut out = Vec::new();
        grid.for_each_neighbor_at(
            positions[0],
            0.4,
            GravityDir::YNeg.mask(),
            Some(0),
            |j| out.push(j),
        );
        assert!(
            out.is_empty(),
            "YPos particle sits in a different oct group and must be skipped"
        );
    }

    #[test]
    fn test_negative_coordinates() {
        let positions = vec![Vec3::splat(-3.05), Vec3::new(-3.2, -3.05, -3.05)];
        let gravity = bytes(&[GravityDir::YNeg; 2]);
        let mut grid = SpatialHashGrid::new(0.4);
        grid.build(&positions, &gravity);
        assert_eq!(collect_neighbors(&grid, 0, &positions), vec![1]);
    }

    #[test]
    fn test_rebuild_discards_previous_step() {
        let mut positions = vec![Vec3::splat(1.0), Vec3::new(1.1, 1.0, 1.0)];
        let gravity = bytes(&[GravityDir::YNeg; 2]);
        let mut grid = SpatialHashGrid::new(0.4);
        grid.build(&positions, &gravity);
        assert_eq!(collect_neighbors(&grid, 0, &positions), vec![1]);

        positions[1] = Vec3::splat(30.0);
        grid.build(&positions, &gravity);
        assert!(collect_neighbors(&grid, 0, &positions).is_empty());
    }

    #[test]
    fn test_candidates_are_not_duplicated() {
        let positions = vec![Vec3::splat(1.0), Vec3::new(1.1, 1.0, 1.0)];
        let gravity = bytes(&[GravityDir::YNeg; 2]);
        let mut grid = SpatialHashGrid::new(0.4);
        grid.build(&positions, &gravity);
        let mut hits = 0;
        grid.for_each_neighbor(0, &positions, 0.4, |j| {
            if j == 1 {
                hits += 1;
            }
        });
        assert_eq!(hits, 1, "a neighbor must be yielded exactly once");
    }
}
