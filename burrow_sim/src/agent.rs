// Agents: entities that carry out tasks.
//
// An `Agent` is plain data: where it stands, how it moves, and how fast it
// walks and works. The scheduler owns every registered agent and hands a
// `&mut Agent` to the assigned task's `execute`. Tasks move agents with
// `Agent::follow`, which spends the agent's accumulated movement budget on
// path steps, one voxel per unit of budget.
//
// See also: `task.rs` for the task contract, `path.rs` for `Path`,
// `scheduler.rs` for the Free/Busy pools.

use crate::path::{Path, PathStep};
use crate::task::TaskContext;
use crate::types::{LocomotionKind, VoxelCoord};
use serde::{Deserialize, Serialize};

/// Outcome of one `Agent::follow` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Travel {
    /// Standing on one of the path's destinations.
    Arrived,
    /// Still on the way.
    Moving,
    /// The path can't be followed from here.
    Blocked,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub position: VoxelCoord,
    pub locomotion: LocomotionKind,
    /// Voxels per second.
    pub speed: f32,
    /// Work units per second.
    pub work_rate: f32,
    /// Unspent movement carried over between ticks, in voxels.
    pub move_budget: f32,
}

impl Agent {
    pub fn new(name: impl Into<String>, position: VoxelCoord, locomotion: LocomotionKind) -> Self {
        Self {
            name: name.into(),
            position,
            locomotion,
            speed: 4.0,
            work_rate: 1.0,
            move_budget: 0.0,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_work_rate(mut self, work_rate: f32) -> Self {
        self.work_rate = work_rate;
        self
    }

    /// Seconds this agent needs to reach any of `destinations`, or infinity
    /// if it can't.
    pub fn travel_time(&self, ctx: &mut TaskContext<'_>, destinations: &[VoxelCoord]) -> f32 {
        if self.speed <= 0.0 {
            return f32::INFINITY;
        }
        if destinations.contains(&self.position) {
            return 0.0;
        }
        let mut path = Path::new(self.locomotion, self.position, destinations.iter().copied());
        match ctx.estimated_cost(&mut path) {
            Some(cost) => cost / self.speed,
            None => f32::INFINITY,
        }
    }

    /// Move along `path` for `dt` seconds.
    pub fn follow(&mut self, path: &mut Path, ctx: &mut TaskContext<'_>, dt: f32) -> Travel {
        if path.is_destination(self.position) {
            self.move_budget = 0.0;
            return Travel::Arrived;
        }
        if path.position() != self.position && !ctx.restart(path, self.position) {
            return Travel::Blocked;
        }
        self.move_budget += self.speed * dt;
        while self.move_budget >= 1.0 {
            match ctx.advance(path) {
                PathStep::Step(next) => {
                    self.move_budget -= self.position.distance(next).max(1.0);
                    self.position = next;
                }
                PathStep::Arrived => break,
                PathStep::Blocked => {
                    self.move_budget = 0.0;
                    return Travel::Blocked;
                }
            }
            if path.is_destination(self.position) {
                break;
            }
        }
        if path.is_destination(self.position) {
            self.move_budget = 0.0;
            Travel::Arrived
        } else {
            Travel::Moving
        }
    }
}
