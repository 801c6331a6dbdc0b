// Built-in tasks.
//
// - `GoToTask`: reach any of a set of destination voxels.
// - `FleeTask`: reach a safe spot at least some distance from a threat.
//   Safe spots are filtered once at creation. Flight orders are tied to the
//   agent that received them, so they are not reassignable.
// - `WorkTask`: walk to a worker position for the target (from the
//   `CapabilityTable`), then accumulate `work_rate * dt` until the job's work
//   units are done. Digging clears the target and building fills it; the
//   edit is queued on the `TaskContext`.
//
// Each task keeps its route in a `Memo<Path>` that is dropped on
// unassignment, so the next agent plans from its own position.
//
// See also: `task.rs` for the contract, `capability.rs` for work ranges.

use crate::agent::{Agent, Travel};
use crate::capability::WorkKind;
use crate::path::Path;
use crate::task::{Memo, Task, TaskContext, TaskStatus, WorldEdit};
use crate::types::VoxelCoord;
use crate::world::VoxelType;

// ---------------------------------------------------------------------------
// GoTo
// ---------------------------------------------------------------------------

pub struct GoToTask {
    destinations: Vec<VoxelCoord>,
    path: Memo<Path>,
}

impl GoToTask {
    pub fn new(destinations: impl IntoIterator<Item = VoxelCoord>) -> Self {
        let mut destinations: Vec<VoxelCoord> = destinations.into_iter().collect();
        destinations.sort();
        destinations.dedup();
        Self {
            destinations,
            path: Memo::new(),
        }
    }

    pub fn destinations(&self) -> &[VoxelCoord] {
        &self.destinations
    }

    /// Move `agent` toward the destinations for `dt` seconds.
    fn travel(&mut self, dt: f32, agent: &mut Agent, ctx: &mut TaskContext<'_>) -> Travel {
        let destinations = &self.destinations;
        let fresh = || Path::new(agent.locomotion, agent.position, destinations.iter().copied());
        let path = self.path.get_or_insert_with(fresh);
        if path.kind() != agent.locomotion {
            *path = fresh();
        }
        agent.follow(path, ctx, dt)
    }
}

impl Task for GoToTask {
    fn label(&self) -> String {
        match self.destinations.as_slice() {
            [only] => format!("go to {only}"),
            many => format!("go to one of {} spots", many.len()),
        }
    }

    fn estimate_cost(&mut self, agent: &Agent, ctx: &mut TaskContext<'_>) -> f32 {
        agent.travel_time(ctx, &self.destinations)
    }

    fn is_strictly_impossible(&mut self, ctx: &mut TaskContext<'_>) -> bool {
        !self.destinations.iter().any(|&d| ctx.is_standable(d))
    }

    fn execute(&mut self, dt: f32, agent: &mut Agent, ctx: &mut TaskContext<'_>) -> TaskStatus {
        match self.travel(dt, agent, ctx) {
            Travel::Arrived => TaskStatus::Completed,
            Travel::Moving => TaskStatus::Working,
            Travel::Blocked => TaskStatus::Failed,
        }
    }

    fn clear_memory(&mut self) {
        self.path.clear();
    }
}

// ---------------------------------------------------------------------------
// Flee
// ---------------------------------------------------------------------------

pub struct FleeTask {
    threat: VoxelCoord,
    inner: GoToTask,
}

impl FleeTask {
    /// Flee from `threat` to any of `candidates` at least `min_distance`
    /// away from it.
    pub fn new(
        threat: VoxelCoord,
        min_distance: f32,
        candidates: impl IntoIterator<Item = VoxelCoord>,
    ) -> Self {
        let safe = candidates
            .into_iter()
            .filter(|c| c.distance(threat) >= min_distance);
        Self {
            threat,
            inner: GoToTask::new(safe),
        }
    }

    pub fn safe_spots(&self) -> &[VoxelCoord] {
        self.inner.destinations()
    }
}

impl Task for FleeTask {
    fn label(&self) -> String {
        format!("flee from {}", self.threat)
    }

    fn reassignable(&self) -> bool {
        false
    }

    fn estimate_cost(&mut self, agent: &Agent, ctx: &mut TaskContext<'_>) -> f32 {
        self.inner.estimate_cost(agent, ctx)
    }

    fn is_strictly_impossible(&mut self, ctx: &mut TaskContext<'_>) -> bool {
        self.inner.is_strictly_impossible(ctx)
    }

    fn execute(&mut self, dt: f32, agent: &mut Agent, ctx: &mut TaskContext<'_>) -> TaskStatus {
        self.inner.execute(dt, agent, ctx)
    }

    fn clear_memory(&mut self) {
        self.inner.clear_memory();
    }
}

// ---------------------------------------------------------------------------
// Work
// ---------------------------------------------------------------------------

pub struct WorkTask {
    kind: WorkKind,
    target: VoxelCoord,
    /// Material placed by `Build`.
    material: VoxelType,
    required: f32,
    progress: f32,
    approach: Memo<Path>,
    ended: bool,
}

impl WorkTask {
    /// A job of `kind` at `target` taking `work_units` of effort.
    pub fn new(kind: WorkKind, target: VoxelCoord, work_units: f32) -> Self {
        Self {
            kind,
            target,
            material: VoxelType::Dirt,
            required: work_units,
            progress: 0.0,
            approach: Memo::new(),
            ended: false,
        }
    }

    pub fn with_material(mut self, material: VoxelType) -> Self {
        self.material = material;
        self
    }

    pub fn kind(&self) -> WorkKind {
        self.kind
    }

    pub fn target(&self) -> VoxelCoord {
        self.target
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    fn remaining(&self) -> f32 {
        (self.required - self.progress).max(0.0)
    }

    fn worker_positions(&self, ctx: &TaskContext<'_>) -> Vec<VoxelCoord> {
        ctx.capabilities.worker_positions(self.kind, self.target)
    }

    fn finish(&mut self, ctx: &mut TaskContext<'_>) {
        match self.kind {
            WorkKind::Dig => ctx.queue_edit(WorldEdit::Clear(self.target)),
            WorkKind::Build => ctx.queue_edit(WorldEdit::Fill(self.target, self.material)),
            WorkKind::Operate | WorkKind::Heal => {}
        }
        self.ended = true;
    }
}

impl Task for WorkTask {
    fn label(&self) -> String {
        format!("{:?} at {}", self.kind, self.target).to_lowercase()
    }

    fn is_ended(&self) -> bool {
        self.ended
    }

    fn estimate_cost(&mut self, agent: &Agent, ctx: &mut TaskContext<'_>) -> f32 {
        if agent.work_rate <= 0.0 {
            return f32::INFINITY;
        }
        let positions = self.worker_positions(ctx);
        agent.travel_time(ctx, &positions) + self.remaining() / agent.work_rate
    }

    fn is_strictly_impossible(&mut self, ctx: &mut TaskContext<'_>) -> bool {
        !self
            .worker_positions(ctx)
            .into_iter()
            .any(|p| ctx.is_standable(p))
    }

    fn execute(&mut self, dt: f32, agent: &mut Agent, ctx: &mut TaskContext<'_>) -> TaskStatus {
        if self.ended {
            return TaskStatus::Completed;
        }
        if !ctx.capabilities.can_work_from(self.kind, agent.position, self.target) {
            let positions = self.worker_positions(ctx);
            let path = self.approach.get_or_insert_with(|| {
                Path::new(agent.locomotion, agent.position, positions.iter().copied())
            });
            match agent.follow(path, ctx, dt) {
                // Start working next tick.
                Travel::Arrived | Travel::Moving => return TaskStatus::Working,
                Travel::Blocked => return TaskStatus::Failed,
            }
        }

        self.progress += agent.work_rate * dt;
        if self.progress + f32::EPSILON >= self.required {
            tracing::debug!(task = %self.label(), worker = %agent.name, "work finished");
            self.finish(ctx);
            TaskStatus::Completed
        } else {
            TaskStatus::Working
        }
    }

    fn clear_memory(&mut self) {
        self.approach.clear();
    }
}
