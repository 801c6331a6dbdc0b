// The task contract: units of work the scheduler hands to agents.
//
// Game logic creates tasks when a need appears (a dig is marked, something
// must be built, an agent must flee) and gives them to the `Scheduler`. The
// scheduler decides *who* does *what*; the task decides *how*:
//
// - `estimate_cost(agent, ctx)`: seconds this agent would need, usually a
//   real path search. `f32::INFINITY` means this agent can't do it.
// - `is_strictly_impossible(ctx)`: a cheap necessary-condition check run
//   before the expensive estimates ("no worker position is open at all").
//   Impossible tasks wait in the backlog.
// - `execute(dt, agent, ctx)`: one tick of work for the assigned agent.
// - `clear_memory()`: drop per-agent scratch state on unassignment.
// - `end()`: final hook when the scheduler drops the task.
//
// Tasks keep their scratch state in typed `Memo<T>` fields rather than a
// string-keyed bag.
//
// `TaskContext` is everything a task may touch during those calls: the world
// (read-only), the nav maps, the nav budgets and the capability table. Tasks
// never write the world directly; they queue `WorldEdit`s, which `SimState`
// applies after the scheduler update and forwards to the nav maps as region
// invalidations.
//
// See also: `work.rs` for the built-in tasks, `scheduler.rs` for the buckets
// and assignment, `agent.rs` for movement.

use crate::agent::Agent;
use crate::capability::CapabilityTable;
use crate::config::NavConfig;
use crate::path::{Path, PathStep};
use crate::registry::NavRegistry;
use crate::types::VoxelCoord;
use crate::world::{VoxelType, WorldQuery};
use serde::{Deserialize, Serialize};

/// Result of one `Task::execute` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Working,
    Completed,
    /// This agent can't finish the task; the scheduler unassigns it.
    Failed,
}

/// A change a task wants made to the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldEdit {
    /// Set the voxel to air.
    Clear(VoxelCoord),
    /// Set the voxel to the given material.
    Fill(VoxelCoord, VoxelType),
}

impl WorldEdit {
    pub fn position(self) -> VoxelCoord {
        match self {
            WorldEdit::Clear(pos) | WorldEdit::Fill(pos, _) => pos,
        }
    }

    pub fn voxel(self) -> VoxelType {
        match self {
            WorldEdit::Clear(_) => VoxelType::Air,
            WorldEdit::Fill(_, voxel) => voxel,
        }
    }
}

/// A unit of schedulable work.
pub trait Task {
    /// Short human-readable description for logs and events.
    fn label(&self) -> String;

    /// Whether the task may go back to the pool when unassigned. Tasks that
    /// return `false` are dropped instead.
    fn reassignable(&self) -> bool {
        true
    }

    /// Set once the underlying need is gone. The scheduler removes ended
    /// tasks.
    fn is_ended(&self) -> bool {
        false
    }

    fn estimate_cost(&mut self, agent: &Agent, ctx: &mut TaskContext<'_>) -> f32;

    fn is_strictly_impossible(&mut self, _ctx: &mut TaskContext<'_>) -> bool {
        false
    }

    fn execute(&mut self, dt: f32, agent: &mut Agent, ctx: &mut TaskContext<'_>) -> TaskStatus;

    fn clear_memory(&mut self) {}

    fn end(&mut self) {}
}

/// Lazily computed scratch value.
#[derive(Clone, Debug)]
pub struct Memo<T> {
    value: Option<T>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    pub fn get_or_insert_with(&mut self, f: impl FnOnce() -> T) -> &mut T {
        self.value.get_or_insert_with(f)
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// What a task may touch while the scheduler runs it.
pub struct TaskContext<'a> {
    pub world: &'a dyn WorldQuery,
    pub nav: &'a mut NavRegistry,
    pub nav_config: &'a NavConfig,
    pub capabilities: &'a CapabilityTable,
    edits: Vec<WorldEdit>,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        world: &'a dyn WorldQuery,
        nav: &'a mut NavRegistry,
        nav_config: &'a NavConfig,
        capabilities: &'a CapabilityTable,
    ) -> Self {
        Self {
            world,
            nav,
            nav_config,
            capabilities,
            edits: Vec::new(),
        }
    }

    /// Queue a world change, applied after the current update.
    pub fn queue_edit(&mut self, edit: WorldEdit) {
        self.edits.push(edit);
    }

    pub fn pending_edits(&self) -> &[WorldEdit] {
        &self.edits
    }

    pub fn take_edits(&mut self) -> Vec<WorldEdit> {
        std::mem::take(&mut self.edits)
    }

    /// Whether any registered locomotion can stand at `pos`.
    pub fn is_standable(&self, pos: VoxelCoord) -> bool {
        self.nav.is_standable(self.world, pos)
    }

    /// Whether `path` leads anywhere, planning it if needed.
    pub fn path_exists(&mut self, path: &mut Path) -> bool {
        match self.nav.get_mut(path.kind()) {
            Some(map) => path.exists(map, self.world, self.nav_config),
            None => false,
        }
    }

    pub fn estimated_cost(&mut self, path: &mut Path) -> Option<f32> {
        let map = self.nav.get_mut(path.kind())?;
        path.estimated_cost(map, self.world, self.nav_config)
    }

    pub fn advance(&mut self, path: &mut Path) -> PathStep {
        match self.nav.get_mut(path.kind()) {
            Some(map) => path.advance(map, self.world, self.nav_config),
            None => PathStep::Blocked,
        }
    }

    pub fn restart(&mut self, path: &mut Path, source: VoxelCoord) -> bool {
        match self.nav.get_mut(path.kind()) {
            Some(map) => path.restart(source, map, self.world, self.nav_config),
            None => false,
        }
    }
}
