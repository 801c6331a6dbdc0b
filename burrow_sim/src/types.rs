// Core types shared across the navigation and scheduling core.
//
// Defines spatial coordinates (`VoxelCoord`, `CellCoord`), the handles used to
// refer to scheduler-owned entities (`TaskId`, `AgentId`, generational arena
// indices), nav-map handles (`ComponentRef`, `PartitionId`), and small shared
// enums (`Priority`, `LocomotionKind`). Value types derive `Serialize` and
// `Deserialize` so they can appear in events and config.
//
// See also: `arena.rs` for the slab storage behind `TaskId`/`AgentId`,
// `nav.rs` for the cell grid that `CellCoord` addresses.
//
// **Critical constraint: determinism.** Handles are plain integers assigned
// in a fixed order. Nothing here reads time, entropy, or hashes pointers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// Edge length of a nav cell, in voxels.
pub const CELL_SIZE: i32 = 8;

/// Number of voxels in one nav cell.
pub const CELL_VOLUME: usize = (CELL_SIZE * CELL_SIZE * CELL_SIZE) as usize;

/// A position in the 3D voxel grid. Each component is in voxel units.
///
/// The coordinate system uses right-handed conventions:
/// - X: east  (positive) / west  (negative)
/// - Y: up    (positive) / down  (negative)
/// - Z: south (positive) / north (negative)
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Manhattan distance between two coordinates.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        ((self.x - other.x).unsigned_abs())
            + ((self.y - other.y).unsigned_abs())
            + ((self.z - other.z).unsigned_abs())
    }

    /// Straight-line distance between two coordinates.
    pub fn distance(self, other: Self) -> f32 {
        let d = self - other;
        ((d.x * d.x + d.y * d.y + d.z * d.z) as f32).sqrt()
    }

    /// Euclidean length of this coordinate treated as an offset.
    pub fn length(self) -> f32 {
        self.distance(Self::default())
    }

    /// Center of the voxel in world space.
    pub fn center(self) -> [f32; 3] {
        [
            self.x as f32 + 0.5,
            self.y as f32 + 0.5,
            self.z as f32 + 0.5,
        ]
    }

    /// Component-wise minimum.
    pub fn min(self, other: Self) -> Self {
        Self::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    /// Component-wise maximum.
    pub fn max(self, other: Self) -> Self {
        Self::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }
}

impl Add for VoxelCoord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for VoxelCoord {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for VoxelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Coordinate of a nav cell: `voxel.div_euclid(CELL_SIZE)` per axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The cell that contains `voxel`. Correct for negative coordinates.
    pub fn containing(voxel: VoxelCoord) -> Self {
        Self::new(
            voxel.x.div_euclid(CELL_SIZE),
            voxel.y.div_euclid(CELL_SIZE),
            voxel.z.div_euclid(CELL_SIZE),
        )
    }

    /// Lowest-coordinate voxel of the cell.
    pub fn origin(self) -> VoxelCoord {
        VoxelCoord::new(self.x * CELL_SIZE, self.y * CELL_SIZE, self.z * CELL_SIZE)
    }

    /// Flat index of `voxel` within this cell, or `None` if it lies outside.
    /// Layout matches `VoxelWorld`: `x + z * size + y * size * size`.
    pub fn local_index(self, voxel: VoxelCoord) -> Option<usize> {
        let local = voxel - self.origin();
        let inside = |v: i32| (0..CELL_SIZE).contains(&v);
        if inside(local.x) && inside(local.y) && inside(local.z) {
            let index = local.x + local.z * CELL_SIZE + local.y * CELL_SIZE * CELL_SIZE;
            Some(index as usize)
        } else {
            None
        }
    }

    /// Inverse of `local_index`.
    pub fn voxel_at(self, index: usize) -> VoxelCoord {
        let i = index as i32;
        let x = i % CELL_SIZE;
        let z = (i / CELL_SIZE) % CELL_SIZE;
        let y = i / (CELL_SIZE * CELL_SIZE);
        self.origin() + VoxelCoord::new(x, y, z)
    }

    /// Offset this cell by a cell-space delta.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell[{}, {}, {}]", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Nav map handles
// ---------------------------------------------------------------------------

/// A component within a specific nav cell. Valid until that cell is rescanned;
/// `NavMap::revision()` changes whenever that can have happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentRef {
    pub cell: CellCoord,
    pub local: u16,
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.cell, self.local)
    }
}

/// Global connectivity tag shared by mutually reachable components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

// ---------------------------------------------------------------------------
// Scheduler handles (generational arena indices)
// ---------------------------------------------------------------------------

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            pub index: u32,
            pub generation: u32,
        }

        impl crate::arena::ArenaId for $name {
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            fn index(self) -> u32 {
                self.index
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}v{})", stringify!($name), self.index, self.generation)
            }
        }
    };
}

arena_id!(/// Handle to a task owned by the scheduler.
TaskId);
arena_id!(/// Handle to an agent owned by the scheduler.
AgentId);

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// Priority tier of a task. Reassignment visits tiers in `Priority::ALL` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Tiers from most to least urgent.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Position of this tier in `ALL`.
    pub fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// Identifies a movement model. Each kind gets its own nav map in the
/// `NavRegistry`, since connectivity depends on how an agent moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocomotionKind {
    /// Walks on solid ground, steps up or down one voxel, climbs ladders.
    Walker,
    /// Moves through any open voxel that touches a solid face.
    Climber,
    /// Moves through any open voxel.
    Flyer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voxel_coord_manhattan_distance() {
        let a = VoxelCoord::new(0, 0, 0);
        let b = VoxelCoord::new(3, 4, 5);
        assert_eq!(a.manhattan_distance(b), 12);
        assert_eq!(b.manhattan_distance(a), 12);
    }

    #[test]
    fn voxel_coord_distance_is_euclidean() {
        let a = VoxelCoord::new(1, 1, 1);
        let b = VoxelCoord::new(4, 5, 1);
        assert_eq!(a.distance(b), 5.0);
    }

    #[test]
    fn cell_containing_handles_negative_coords() {
        assert_eq!(
            CellCoord::containing(VoxelCoord::new(-1, 0, 7)),
            CellCoord::new(-1, 0, 0)
        );
        assert_eq!(
            CellCoord::containing(VoxelCoord::new(-8, 8, -9)),
            CellCoord::new(-1, 1, -2)
        );
    }

    #[test]
    fn local_index_roundtrips_every_voxel() {
        let cell = CellCoord::new(2, -1, 3);
        for i in 0..CELL_VOLUME {
            let v = cell.voxel_at(i);
            assert_eq!(CellCoord::containing(v), cell);
            assert_eq!(cell.local_index(v), Some(i));
        }
        assert_eq!(
            cell.local_index(cell.origin() + VoxelCoord::new(8, 0, 0)),
            None
        );
    }

    #[test]
    fn priority_tiers_are_ordered_high_first() {
        assert_eq!(Priority::ALL[0], Priority::High);
        assert!(Priority::High < Priority::Low);
        for (i, p) in Priority::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn handle_display_includes_generation() {
        let id = TaskId {
            index: 4,
            generation: 2,
        };
        assert_eq!(id.to_string(), "TaskId(4v2)");
    }
}
