// Top-level simulation state and update loop.
//
// `SimState` owns everything one simulation needs: the config, the voxel
// world, one nav map per locomotion (`NavRegistry`), and the `Scheduler`
// with its tasks and agents. Nothing is process-wide, so several sims can
// run side by side.
//
// ## Update
//
// `update(dt)` advances the simulation by `dt` seconds:
//
//   1. Lend the world, nav maps, nav budgets and capability table to a
//      `TaskContext` and run `Scheduler::update` (reassignment when due,
//      then one `execute` per busy agent).
//   2. Apply the `WorldEdit`s tasks queued, in queue order. Each changed
//      voxel invalidates its region in every nav map before the next update
//      plans anything.
//   3. Collect the scheduler's events, stamped with the current tick, and
//      return them in a `StepResult`.
//
// External world changes go through `set_voxel` or `invalidate_region` so
// the nav maps never see a stale world.
//
// See also: `scheduler.rs` for task distribution, `registry.rs` for the nav
// maps, `event.rs` for `SimEvent`, `config.rs` for `SimConfig`.
//
// **Critical constraint: determinism.** The sim is a pure function of its
// config, the calls made on it, and the `dt` values passed to `update`. No
// system time, no randomness, no hash-ordered iteration.

use crate::agent::Agent;
use crate::capability::WorkKind;
use crate::config::{ConfigError, SimConfig};
use crate::event::{SimEvent, SimEventKind};
use crate::path::Path;
use crate::registry::NavRegistry;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::task::{Task, TaskContext, WorldEdit};
use crate::types::{AgentId, LocomotionKind, Priority, TaskId, VoxelCoord};
use crate::work::WorkTask;
use crate::world::{VoxelType, VoxelWorld, WorldQuery};

/// Result of a single `SimState::update` call.
#[derive(Clone, Debug, Default)]
pub struct StepResult {
    /// Narrative events emitted during this update, in order.
    pub events: Vec<SimEvent>,
}

pub struct SimState {
    /// Number of completed updates.
    pub tick: u64,
    /// Simulated seconds elapsed.
    pub elapsed: f64,
    config: SimConfig,
    world: VoxelWorld,
    nav: NavRegistry,
    scheduler: Scheduler,
    /// Events from calls made between updates, flushed by the next update.
    pending: Vec<SimEvent>,
}

impl SimState {
    /// Create a simulation with an all-air world of the configured size.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let (x, y, z) = config.world_size;
        Self::with_world(config, VoxelWorld::new(x, y, z))
    }

    /// Create a simulation over an existing world. The config's
    /// `world_size` is ignored.
    pub fn with_world(config: SimConfig, world: VoxelWorld) -> Result<Self, ConfigError> {
        config.validate()?;
        let nav = NavRegistry::with_builtins(&config.locomotions, &config.nav);
        let scheduler = Scheduler::new(config.scheduler.clone());
        tracing::info!(
            size_x = world.size_x,
            size_y = world.size_y,
            size_z = world.size_z,
            locomotions = config.locomotions.len(),
            "simulation created"
        );
        Ok(Self {
            tick: 0,
            elapsed: 0.0,
            config,
            world,
            nav,
            scheduler,
            pending: Vec::new(),
        })
    }

    /// Load the config from a JSON file and create a simulation.
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::new(SimConfig::load(path)?)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &VoxelWorld {
        &self.world
    }

    pub fn nav(&self) -> &NavRegistry {
        &self.nav
    }

    pub fn nav_mut(&mut self) -> &mut NavRegistry {
        &mut self.nav
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Advance the simulation by `dt` seconds.
    pub fn update(&mut self, dt: f32) -> StepResult {
        let mut ctx = TaskContext::new(
            &self.world,
            &mut self.nav,
            &self.config.nav,
            &self.config.capabilities,
        );
        self.scheduler.update(dt, &mut ctx);
        let edits = ctx.take_edits();

        let mut events = std::mem::take(&mut self.pending);
        let tick = self.tick;
        events.extend(
            self.scheduler
                .drain_events()
                .into_iter()
                .map(|e| SimEvent {
                    tick,
                    kind: SimEventKind::Scheduler(e),
                }),
        );
        for edit in edits {
            if let Some(event) = self.apply_edit(edit) {
                events.push(event);
            }
        }

        self.tick += 1;
        self.elapsed += f64::from(dt);
        StepResult { events }
    }

    /// Run one reassignment pass immediately, outside the normal interval.
    pub fn reassign(&mut self) {
        let mut ctx = TaskContext::new(
            &self.world,
            &mut self.nav,
            &self.config.nav,
            &self.config.capabilities,
        );
        self.scheduler.reassign(&mut ctx);
        let tick = self.tick;
        let drained = self.scheduler.drain_events();
        self.pending.extend(drained.into_iter().map(|e| SimEvent {
            tick,
            kind: SimEventKind::Scheduler(e),
        }));
    }

    fn apply_edit(&mut self, edit: WorldEdit) -> Option<SimEvent> {
        let pos = edit.position();
        let voxel = edit.voxel();
        if !self.write_voxel(pos, voxel) {
            return None;
        }
        Some(SimEvent {
            tick: self.tick,
            kind: SimEventKind::VoxelChanged { pos, voxel },
        })
    }

    /// Set a voxel and invalidate the nav maps around it. Returns whether
    /// anything changed.
    fn write_voxel(&mut self, pos: VoxelCoord, voxel: VoxelType) -> bool {
        if !self.world.in_bounds(pos) || self.world.get(pos) == voxel {
            return false;
        }
        self.world.set(pos, voxel);
        self.nav.invalidate_region(pos, pos);
        true
    }

    /// Change a voxel from outside the task system.
    pub fn set_voxel(&mut self, pos: VoxelCoord, voxel: VoxelType) {
        if self.write_voxel(pos, voxel) {
            self.pending.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::VoxelChanged { pos, voxel },
            });
        }
    }

    /// Plan a path over the current world.
    pub fn find_path(
        &mut self,
        kind: LocomotionKind,
        source: VoxelCoord,
        destinations: impl IntoIterator<Item = VoxelCoord>,
    ) -> Path {
        self.nav
            .find_path(&self.world, &self.config.nav, kind, source, destinations)
    }

    pub fn path_exists(
        &mut self,
        kind: LocomotionKind,
        source: VoxelCoord,
        destinations: impl IntoIterator<Item = VoxelCoord>,
    ) -> bool {
        let mut path = self.find_path(kind, source, destinations);
        match self.nav.get_mut(kind) {
            Some(map) => path.exists(map, &self.world, &self.config.nav),
            None => false,
        }
    }

    /// Fill an inclusive box and invalidate it once.
    pub fn fill_box(&mut self, min: VoxelCoord, max: VoxelCoord, voxel: VoxelType) {
        self.world.fill_box(min, max, voxel);
        self.nav.invalidate_region(min.min(max), min.max(max));
    }

    /// Tell the nav maps a region changed without going through `set_voxel`.
    pub fn invalidate_region(&mut self, min: VoxelCoord, max: VoxelCoord) {
        self.nav.invalidate_region(min, max);
    }

    pub fn spawn_agent(&mut self, agent: Agent) -> AgentId {
        let name = agent.name.clone();
        let id = self.scheduler.add_agent(agent);
        self.pending.push(SimEvent {
            tick: self.tick,
            kind: SimEventKind::AgentSpawned { agent: id, name },
        });
        id
    }

    pub fn remove_agent(&mut self, id: AgentId) -> Result<Agent, SchedulerError> {
        let agent = self.scheduler.remove_agent(id)?;
        self.flush_scheduler_events();
        self.pending.push(SimEvent {
            tick: self.tick,
            kind: SimEventKind::AgentRemoved { agent: id },
        });
        Ok(agent)
    }

    pub fn add_task(&mut self, task: impl Task + 'static, priority: Priority) -> TaskId {
        let id = self.scheduler.add_task(task, priority);
        self.flush_scheduler_events();
        id
    }

    /// Queue a dig or build job with the configured work units.
    pub fn add_work(&mut self, kind: WorkKind, target: VoxelCoord, priority: Priority) -> TaskId {
        let units = self.config.capabilities.work_units(kind);
        self.add_task(WorkTask::new(kind, target, units), priority)
    }

    pub fn remove_task(&mut self, id: TaskId) -> Result<Box<dyn Task>, SchedulerError> {
        let task = self.scheduler.remove_task(id)?;
        self.flush_scheduler_events();
        Ok(task)
    }

    fn flush_scheduler_events(&mut self) {
        let tick = self.tick;
        let drained = self.scheduler.drain_events();
        self.pending.extend(drained.into_iter().map(|e| SimEvent {
            tick,
            kind: SimEventKind::Scheduler(e),
        }));
    }
}
