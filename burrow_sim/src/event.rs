// Simulation events: narrative output of each update.
//
// The scheduler records what it did as `SchedulerEvent`s in an outbox that
// `SimState` drains after every update. `SimState` wraps them, together with
// its own world and agent events, into `SimEvent`s stamped with the tick
// they happened on. Events are output only; nothing in the sim reads them
// back.
//
// See also: `scheduler.rs` which emits `SchedulerEvent`s, `sim.rs` which
// returns `SimEvent`s from `update`.
//
// **Critical constraint: determinism.** Events are emitted in processing
// order, which is fixed by bucket insertion order and agent registration
// order.

use crate::types::{AgentId, Priority, TaskId, VoxelCoord};
use crate::world::VoxelType;
use serde::{Deserialize, Serialize};

/// Something the scheduler did.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SchedulerEvent {
    Assigned { task: TaskId, agent: AgentId },
    /// The task went back to the pool (or was dropped, see `Removed`).
    Unassigned { task: TaskId, agent: AgentId },
    Completed { task: TaskId, agent: AgentId },
    Failed { task: TaskId, agent: AgentId },
    /// Moved into its tier's backlog, on insertion or for infeasibility.
    Backlogged { task: TaskId, priority: Priority },
    /// Moved from the backlog back to Unassigned.
    Promoted { task: TaskId, priority: Priority },
    Removed { task: TaskId },
}

/// A narrative event emitted by the simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    Scheduler(SchedulerEvent),
    AgentSpawned { agent: AgentId, name: String },
    AgentRemoved { agent: AgentId },
    /// A voxel changed, by a task edit or an external `set_voxel`.
    VoxelChanged { pos: VoxelCoord, voxel: VoxelType },
}
