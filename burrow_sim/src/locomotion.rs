// Movement models: how an agent moves and what each step costs.
//
// A `Locomotion` turns world content (`WorldQuery`) into costs:
// - `voxel_cost(pos)`: 0 for freely passable, a positive finite value for
//   passable-with-cost, `IMPASSABLE` (infinity) for voxels the agent can never
//   occupy.
// - `transition_cost(from, to)`: full cost of one step along one of `moves()`.
//   May depend on both endpoints (step-height and headroom rules), so it is
//   not just `voxel_cost(to)`.
//
// `moves()` lists the movement directions as offsets with every axis in
// -1..=1. The set must be closed under negation: the nav map pairs each
// direction with its opposite when resolving portals between cells.
//
// Built-in models, one per `LocomotionKind`:
// - `Walker`: stands on solid ground or on climbable voxels. Walks the four
//   horizontal directions, steps up/down one voxel diagonally (needs
//   headroom above the lower endpoint), and climbs straight up/down only when
//   one endpoint is climbable.
// - `Climber`: any open voxel touching a solid face; six face moves.
// - `Flyer`: any open voxel; six face moves.
//
// All built-in rules are symmetric (a step is allowed iff its reverse is),
// but the nav map does not rely on that and checks both directions.
//
// See also: `world.rs` for `WorldQuery`, `nav.rs` which scans cells with
// these costs, `path.rs` for fine-grained A* over `moves()`.

use crate::types::{LocomotionKind, VoxelCoord};
use crate::world::WorldQuery;

/// Cost of a voxel or step the agent cannot take.
pub const IMPASSABLE: f32 = f32::INFINITY;

const UP: VoxelCoord = VoxelCoord::new(0, 1, 0);
const DOWN: VoxelCoord = VoxelCoord::new(0, -1, 0);

/// A pluggable movement-cost function plus its movement directions.
pub trait Locomotion {
    fn kind(&self) -> LocomotionKind;

    /// Movement directions. Closed under negation.
    fn moves(&self) -> &[VoxelCoord];

    /// Cost of occupying `pos`; `IMPASSABLE` if the agent can't be there.
    fn voxel_cost(&self, world: &dyn WorldQuery, pos: VoxelCoord) -> f32;

    /// Cost of stepping from `from` to `to`, where `to - from` is one of
    /// `moves()`. `IMPASSABLE` if the step is not allowed.
    fn transition_cost(&self, world: &dyn WorldQuery, from: VoxelCoord, to: VoxelCoord) -> f32;

    fn is_passable(&self, world: &dyn WorldQuery, pos: VoxelCoord) -> bool {
        self.voxel_cost(world, pos).is_finite()
    }

    /// How far (per axis, in voxels) a world change can reach into the costs
    /// of other voxels. Walker support and headroom read the voxels above and
    /// below, climbers read their face neighbours.
    fn influence_radius(&self) -> i32 {
        1
    }
}

/// Construct the built-in locomotion for `kind`.
pub fn builtin(kind: LocomotionKind) -> Box<dyn Locomotion> {
    match kind {
        LocomotionKind::Walker => Box::new(Walker::new()),
        LocomotionKind::Climber => Box::new(Climber::new()),
        LocomotionKind::Flyer => Box::new(Flyer::new()),
    }
}

fn face_moves() -> Vec<VoxelCoord> {
    crate::world::FACE_OFFSETS.to_vec()
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Ground-bound movement with one-voxel steps and ladder climbing.
#[derive(Clone, Debug)]
pub struct Walker {
    moves: Vec<VoxelCoord>,
}

impl Walker {
    pub fn new() -> Self {
        let horizontal = [(1, 0), (-1, 0), (0, 1), (0, -1)];
        let mut moves = Vec::with_capacity(14);
        for &(dx, dz) in &horizontal {
            moves.push(VoxelCoord::new(dx, 0, dz));
        }
        for &(dx, dz) in &horizontal {
            moves.push(VoxelCoord::new(dx, 1, dz));
            moves.push(VoxelCoord::new(dx, -1, dz));
        }
        moves.push(UP);
        moves.push(DOWN);
        Self { moves }
    }
}

impl Default for Walker {
    fn default() -> Self {
        Self::new()
    }
}

impl Locomotion for Walker {
    fn kind(&self) -> LocomotionKind {
        LocomotionKind::Walker
    }

    fn moves(&self) -> &[VoxelCoord] {
        &self.moves
    }

    fn voxel_cost(&self, world: &dyn WorldQuery, pos: VoxelCoord) -> f32 {
        if world.is_solid(pos) {
            return IMPASSABLE;
        }
        let supported = world.is_solid(pos + DOWN) || world.is_climbable(pos);
        if !supported {
            return IMPASSABLE;
        }
        world.terrain_cost(pos)
    }

    fn transition_cost(&self, world: &dyn WorldQuery, from: VoxelCoord, to: VoxelCoord) -> f32 {
        let to_cost = self.voxel_cost(world, to);
        if to_cost.is_infinite() || !self.is_passable(world, from) {
            return IMPASSABLE;
        }
        let d = to - from;
        let horizontal = d.x != 0 || d.z != 0;
        match (horizontal, d.y) {
            (true, 0) => d.length() + to_cost,
            (true, _) => {
                // Stepping between levels needs headroom above the lower end.
                let lower = if d.y > 0 { from } else { to };
                if world.is_solid(lower + UP) {
                    IMPASSABLE
                } else {
                    d.length() + to_cost
                }
            }
            (false, 0) => IMPASSABLE,
            (false, _) => {
                if world.is_climbable(from) || world.is_climbable(to) {
                    1.0 + to_cost
                } else {
                    IMPASSABLE
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Climber
// ---------------------------------------------------------------------------

/// Clings to any surface: open voxels touching a solid face.
#[derive(Clone, Debug)]
pub struct Climber {
    moves: Vec<VoxelCoord>,
}

impl Climber {
    pub fn new() -> Self {
        Self {
            moves: face_moves(),
        }
    }
}

impl Default for Climber {
    fn default() -> Self {
        Self::new()
    }
}

impl Locomotion for Climber {
    fn kind(&self) -> LocomotionKind {
        LocomotionKind::Climber
    }

    fn moves(&self) -> &[VoxelCoord] {
        &self.moves
    }

    fn voxel_cost(&self, world: &dyn WorldQuery, pos: VoxelCoord) -> f32 {
        if world.is_solid(pos) || !world.has_solid_face_neighbor(pos) {
            return IMPASSABLE;
        }
        world.terrain_cost(pos)
    }

    fn transition_cost(&self, world: &dyn WorldQuery, from: VoxelCoord, to: VoxelCoord) -> f32 {
        if !self.is_passable(world, from) {
            return IMPASSABLE;
        }
        1.0 + self.voxel_cost(world, to)
    }
}

// ---------------------------------------------------------------------------
// Flyer
// ---------------------------------------------------------------------------

/// Free movement through open voxels.
#[derive(Clone, Debug)]
pub struct Flyer {
    moves: Vec<VoxelCoord>,
}

impl Flyer {
    pub fn new() -> Self {
        Self {
            moves: face_moves(),
        }
    }
}

impl Default for Flyer {
    fn default() -> Self {
        Self::new()
    }
}

impl Locomotion for Flyer {
    fn kind(&self) -> LocomotionKind {
        LocomotionKind::Flyer
    }

    fn moves(&self) -> &[VoxelCoord] {
        &self.moves
    }

    fn voxel_cost(&self, world: &dyn WorldQuery, pos: VoxelCoord) -> f32 {
        if world.is_solid(pos) {
            IMPASSABLE
        } else {
            world.terrain_cost(pos)
        }
    }

    fn transition_cost(&self, world: &dyn WorldQuery, from: VoxelCoord, to: VoxelCoord) -> f32 {
        if !self.is_passable(world, from) {
            return IMPASSABLE;
        }
        1.0 + self.voxel_cost(world, to)
    }

    fn influence_radius(&self) -> i32 {
        0
    }
}
