// World query surface and the dense reference voxel grid.
//
// The navigation core never owns world content. It reads it through the
// `WorldQuery` trait: solidity, climbability, and an extra per-voxel terrain
// cost. Locomotions (see `locomotion.rs`) turn those answers into movement
// costs. Anything that can answer these questions cheaply (many calls per
// tick) can drive the nav maps.
//
// `VoxelWorld` is the dense implementation used by `SimState` and the tests.
// It is stored as a flat `Vec<VoxelType>` indexed by
// `x + z * size_x + y * size_x * size_z`, giving O(1) read/write access.
// Out-of-bounds reads return `Stone` so the world behaves as if enclosed;
// out-of-bounds writes are no-ops.
//
// Changing a voxel does not notify anybody by itself. Callers that mutate the
// world must invalidate the affected region on every nav map. `SimState`
// does this in `set_voxel` and when applying task `WorldEdit`s.
//
// See also: `locomotion.rs` for cost functions over this surface, `nav.rs`
// for the connectivity map built on top of it, `sim.rs` which owns the
// `VoxelWorld`.
//
// **Critical constraint: determinism.** All world modifications go through
// deterministic sim logic on the tick thread.

use crate::types::VoxelCoord;
use serde::{Deserialize, Serialize};

/// Face-adjacent offsets (±x, ±y, ±z).
pub const FACE_OFFSETS: [VoxelCoord; 6] = [
    VoxelCoord::new(1, 0, 0),
    VoxelCoord::new(-1, 0, 0),
    VoxelCoord::new(0, 1, 0),
    VoxelCoord::new(0, -1, 0),
    VoxelCoord::new(0, 0, 1),
    VoxelCoord::new(0, 0, -1),
];

/// Read-only view of world content consumed by locomotions.
pub trait WorldQuery {
    /// Whether `pos` lies inside the world.
    fn in_bounds(&self, pos: VoxelCoord) -> bool;

    /// Whether `pos` blocks movement. Out-of-bounds voxels must report `true`.
    fn is_solid(&self, pos: VoxelCoord) -> bool;

    /// Whether an agent can hold on to `pos` without ground beneath it.
    fn is_climbable(&self, _pos: VoxelCoord) -> bool {
        false
    }

    /// Extra cost (>= 0) of entering `pos` on top of the move length.
    fn terrain_cost(&self, _pos: VoxelCoord) -> f32 {
        0.0
    }

    /// Returns `true` if any of the 6 face-adjacent voxels is solid.
    fn has_solid_face_neighbor(&self, pos: VoxelCoord) -> bool {
        FACE_OFFSETS.iter().any(|&d| self.is_solid(pos + d))
    }
}

/// The material of a single voxel in the reference world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoxelType {
    #[default]
    Air,
    Stone,
    Dirt,
    /// Open and climbable.
    Ladder,
    /// Open, walkable-through, slow.
    Water,
}

impl VoxelType {
    pub fn is_solid(self) -> bool {
        matches!(self, VoxelType::Stone | VoxelType::Dirt)
    }
}

/// Extra traversal cost of water voxels.
const WATER_COST: f32 = 2.0;

/// Dense 3D voxel grid.
#[derive(Clone, Debug, Default)]
pub struct VoxelWorld {
    /// Flat storage: index = x + z * size_x + y * size_x * size_z.
    voxels: Vec<VoxelType>,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
}

impl VoxelWorld {
    /// Create a new world filled with `Air`.
    pub fn new(size_x: u32, size_y: u32, size_z: u32) -> Self {
        let total = (size_x as usize) * (size_y as usize) * (size_z as usize);
        Self {
            voxels: vec![VoxelType::Air; total],
            size_x,
            size_y,
            size_z,
        }
    }

    /// Convert a coordinate to a flat index. Returns `None` if out of bounds.
    fn index(&self, coord: VoxelCoord) -> Option<usize> {
        if self.in_bounds(coord) {
            let x = coord.x as usize;
            let y = coord.y as usize;
            let z = coord.z as usize;
            let sx = self.size_x as usize;
            let sz = self.size_z as usize;
            Some(x + z * sx + y * sx * sz)
        } else {
            None
        }
    }

    /// Read a voxel. Returns `Stone` for out-of-bounds coordinates.
    pub fn get(&self, coord: VoxelCoord) -> VoxelType {
        self.index(coord)
            .map(|i| self.voxels[i])
            .unwrap_or(VoxelType::Stone)
    }

    /// Write a voxel. No-op for out-of-bounds coordinates.
    pub fn set(&mut self, coord: VoxelCoord, voxel: VoxelType) {
        if let Some(i) = self.index(coord) {
            self.voxels[i] = voxel;
        }
    }

    /// Fill the inclusive box `[min, max]` (clamped to the world).
    pub fn fill_box(&mut self, min: VoxelCoord, max: VoxelCoord, voxel: VoxelType) {
        let lo = min.min(max);
        let hi = min.max(max);
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                for x in lo.x..=hi.x {
                    self.set(VoxelCoord::new(x, y, z), voxel);
                }
            }
        }
    }

    /// Largest in-bounds coordinate, or `None` for an empty world.
    pub fn max_coord(&self) -> Option<VoxelCoord> {
        if self.voxels.is_empty() {
            return None;
        }
        Some(VoxelCoord::new(
            self.size_x as i32 - 1,
            self.size_y as i32 - 1,
            self.size_z as i32 - 1,
        ))
    }
}

impl WorldQuery for VoxelWorld {
    fn in_bounds(&self, coord: VoxelCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && (coord.x as u32) < self.size_x
            && (coord.y as u32) < self.size_y
            && (coord.z as u32) < self.size_z
    }

    fn is_solid(&self, pos: VoxelCoord) -> bool {
        self.get(pos).is_solid()
    }

    fn is_climbable(&self, pos: VoxelCoord) -> bool {
        self.get(pos) == VoxelType::Ladder
    }

    fn terrain_cost(&self, pos: VoxelCoord) -> f32 {
        match self.get(pos) {
            VoxelType::Water => WATER_COST,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_world_is_all_air() {
        let world = VoxelWorld::new(4, 4, 4);
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    assert_eq!(world.get(VoxelCoord::new(x, y, z)), VoxelType::Air);
                }
            }
        }
    }

    #[test]
    fn set_and_get() {
        let mut world = VoxelWorld::new(8, 8, 8);
        let coord = VoxelCoord::new(3, 5, 2);
        world.set(coord, VoxelType::Dirt);
        assert_eq!(world.get(coord), VoxelType::Dirt);
        // Neighbors are still air.
        assert_eq!(world.get(VoxelCoord::new(3, 5, 3)), VoxelType::Air);
    }

    #[test]
    fn out_of_bounds_is_solid_stone() {
        let world = VoxelWorld::new(4, 4, 4);
        assert_eq!(world.get(VoxelCoord::new(-1, 0, 0)), VoxelType::Stone);
        assert_eq!(world.get(VoxelCoord::new(0, 4, 0)), VoxelType::Stone);
        assert!(world.is_solid(VoxelCoord::new(100, 100, 100)));
        assert!(!world.in_bounds(VoxelCoord::new(4, 0, 0)));
    }

    #[test]
    fn out_of_bounds_write_is_noop() {
        let mut world = VoxelWorld::new(4, 4, 4);
        // Should not panic.
        world.set(VoxelCoord::new(-1, 0, 0), VoxelType::Air);
        world.set(VoxelCoord::new(100, 0, 0), VoxelType::Air);
        assert!(world.is_solid(VoxelCoord::new(-1, 0, 0)));
    }

    #[test]
    fn indexing_is_correct() {
        // Verify the specific indexing scheme: x + z * size_x + y * size_x * size_z
        let mut world = VoxelWorld::new(10, 8, 6);
        let coord = VoxelCoord::new(5, 3, 4);
        world.set(coord, VoxelType::Stone);
        assert_eq!(world.get(coord), VoxelType::Stone);
        assert_eq!(world.get(VoxelCoord::new(4, 3, 4)), VoxelType::Air);
        assert_eq!(world.get(VoxelCoord::new(5, 2, 4)), VoxelType::Air);
        assert_eq!(world.get(VoxelCoord::new(5, 3, 3)), VoxelType::Air);
    }

    #[test]
    fn fill_box_accepts_swapped_corners() {
        let mut world = VoxelWorld::new(8, 8, 8);
        world.fill_box(
            VoxelCoord::new(3, 1, 3),
            VoxelCoord::new(1, 0, 1),
            VoxelType::Stone,
        );
        assert!(world.is_solid(VoxelCoord::new(2, 1, 2)));
        assert!(!world.is_solid(VoxelCoord::new(2, 2, 2)));
    }

    #[test]
    fn ladder_and_water_properties() {
        let mut world = VoxelWorld::new(4, 4, 4);
        world.set(VoxelCoord::new(1, 1, 1), VoxelType::Ladder);
        world.set(VoxelCoord::new(2, 1, 1), VoxelType::Water);
        assert!(world.is_climbable(VoxelCoord::new(1, 1, 1)));
        assert!(!world.is_solid(VoxelCoord::new(1, 1, 1)));
        assert_eq!(world.terrain_cost(VoxelCoord::new(2, 1, 1)), WATER_COST);
        assert_eq!(world.terrain_cost(VoxelCoord::new(0, 1, 1)), 0.0);
    }

    #[test]
    fn has_solid_face_neighbor_at_boundary() {
        let world = VoxelWorld::new(8, 8, 8);
        // Out-of-bounds neighbors count as solid.
        assert!(world.has_solid_face_neighbor(VoxelCoord::new(0, 4, 4)));
        assert!(!world.has_solid_face_neighbor(VoxelCoord::new(4, 4, 4)));
    }
}
