// Task distribution: priority tiers, backlog management, and greedy
// cost-matrix assignment of free agents to tasks.
//
// ## Buckets
//
// Every task sits in exactly one bucket of its priority tier:
// - **Unassigned**: waiting for an agent; capped at `buildup_limit` tasks.
// - **Backlog**: overflow beyond the cap, plus tasks that are currently
//   strictly impossible or that no free agent could do at a finite cost.
// - **Assigned**: being executed by exactly one agent.
//
// Agents sit in the Free or Busy pool. Within a bucket or pool, order is
// insertion order (a sequence number taken when the task or agent was
// added), so every pass visits tasks and agents in the same order for the
// same history. Tasks and agents are owned here, in generational arenas; the
// task-agent cross reference is a pair of handles.
//
// ## Reassignment
//
// Every `reassign_interval` seconds of `update` time, tiers are processed
// High, then Medium, then Low:
//
//   1. Drop ended tasks.
//   2. Promote backlog tasks that are not strictly impossible while the
//      Unassigned bucket has room.
//   3. Move strictly impossible Unassigned tasks to the backlog.
//   4. If any agent is free, run the assignment pass.
//
// The assignment pass builds a free-agents x unassigned-tasks cost matrix
// (`Task::estimate_cost`). Tasks no agent can do at a finite cost go to the
// backlog. Each pair is scored `max(row_max, col_max) - cost`, where the
// extra row and column of the matrix hold each agent's and each task's
// largest finite cost, so an agent or task with expensive alternatives gets
// priority on its cheap option. The best-scoring finite pair is assigned,
// its row and column are struck out, and the selection repeats up to
// `min(agents, tasks)` times or until no finite pair remains. Ties go to the
// earliest agent, then the earliest task.
//
// ## Execution
//
// Every `update` runs each busy agent's task once, in agent order.
// `Completed` removes the task and frees the agent; `Failed` unassigns it.
//
// Handles that don't refer to a live task or agent are contract violations:
// the public operations log them and return `SchedulerError` before changing
// anything.
//
// See also: `task.rs` for the `Task` contract, `arena.rs` for storage,
// `event.rs` for `SchedulerEvent`, `sim.rs` which drives `update`.
//
// **Critical constraint: determinism.** No hash-ordered iteration; buckets
// and pools are `BTreeMap`s keyed by insertion sequence.

use crate::agent::Agent;
use crate::arena::Arena;
use crate::config::SchedulerConfig;
use crate::event::SchedulerEvent;
use crate::task::{Task, TaskContext, TaskStatus};
use crate::types::{AgentId, Priority, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Which bucket of its tier a task is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    Unassigned,
    Backlog,
    Assigned,
}

/// Misuse of the scheduler API.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unknown or removed task {0}")]
    UnknownTask(TaskId),
    #[error("unknown or removed agent {0}")]
    UnknownAgent(AgentId),
}

struct TaskEntry {
    task: Box<dyn Task>,
    priority: Priority,
    bucket: Bucket,
    seq: u64,
    agent: Option<AgentId>,
}

struct AgentEntry {
    agent: Agent,
    seq: u64,
    task: Option<TaskId>,
}

/// The three buckets of one priority tier, keyed by insertion sequence.
#[derive(Default)]
struct Tier {
    unassigned: BTreeMap<u64, TaskId>,
    backlog: BTreeMap<u64, TaskId>,
    assigned: BTreeMap<u64, TaskId>,
}

impl Tier {
    fn bucket(&self, bucket: Bucket) -> &BTreeMap<u64, TaskId> {
        match bucket {
            Bucket::Unassigned => &self.unassigned,
            Bucket::Backlog => &self.backlog,
            Bucket::Assigned => &self.assigned,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut BTreeMap<u64, TaskId> {
        match bucket {
            Bucket::Unassigned => &mut self.unassigned,
            Bucket::Backlog => &mut self.backlog,
            Bucket::Assigned => &mut self.assigned,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    tasks: Arena<TaskId, TaskEntry>,
    agents: Arena<AgentId, AgentEntry>,
    tiers: [Tier; 3],
    free: BTreeMap<u64, AgentId>,
    busy: BTreeMap<u64, AgentId>,
    next_seq: u64,
    /// Seconds of update time since the last reassignment pass.
    since_reassign: f32,
    events: Vec<SchedulerEvent>,
}

impl Scheduler {
    /// A new scheduler runs its first reassignment pass on the first
    /// `update`.
    pub fn new(config: SchedulerConfig) -> Self {
        let since_reassign = config.reassign_interval;
        Self {
            config,
            tasks: Arena::new(),
            agents: Arena::new(),
            tiers: Default::default(),
            free: BTreeMap::new(),
            busy: BTreeMap::new(),
            next_seq: 0,
            since_reassign,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Register a task. It lands in Unassigned, or in the backlog if its
    /// tier's Unassigned bucket is full.
    pub fn add_task(&mut self, task: impl Task + 'static, priority: Priority) -> TaskId {
        let seq = self.take_seq();
        let label = task.label();
        let bucket = if self.tiers[priority.index()].unassigned.len() < self.config.buildup_limit {
            Bucket::Unassigned
        } else {
            Bucket::Backlog
        };
        let id = self.tasks.insert(TaskEntry {
            task: Box::new(task),
            priority,
            bucket,
            seq,
            agent: None,
        });
        self.tiers[priority.index()]
            .bucket_mut(bucket)
            .insert(seq, id);
        if bucket == Bucket::Backlog {
            self.events
                .push(SchedulerEvent::Backlogged { task: id, priority });
        }
        tracing::debug!(task = %id, %label, ?priority, ?bucket, "task added");
        id
    }

    /// Drop a task, freeing its agent if it had one. The task's `end` hook
    /// has run by the time it is returned.
    pub fn remove_task(&mut self, id: TaskId) -> Result<Box<dyn Task>, SchedulerError> {
        self.detach_task(id).ok_or_else(|| unknown_task(id))
    }

    /// Take the task away from its agent. Reassignable tasks lose their
    /// scratch memory and go back to Unassigned (or the backlog when full);
    /// the rest are removed. Unassigning an unassigned task does nothing.
    pub fn unassign_task(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        if !self.tasks.contains(id) {
            return Err(unknown_task(id));
        }
        self.release_task(id);
        Ok(())
    }

    fn detach_task(&mut self, id: TaskId) -> Option<Box<dyn Task>> {
        let entry = self.tasks.remove(id)?;
        self.tiers[entry.priority.index()]
            .bucket_mut(entry.bucket)
            .remove(&entry.seq);
        if let Some(agent_id) = entry.agent {
            self.free_agent(agent_id);
        }
        let mut task = entry.task;
        task.end();
        self.events.push(SchedulerEvent::Removed { task: id });
        tracing::debug!(task = %id, label = %task.label(), "task removed");
        Some(task)
    }

    fn release_task(&mut self, id: TaskId) {
        let Some(entry) = self.tasks.get_mut(id) else {
            return;
        };
        let Some(agent_id) = entry.agent.take() else {
            return;
        };
        let reassignable = entry.task.reassignable();
        self.free_agent(agent_id);
        self.events.push(SchedulerEvent::Unassigned {
            task: id,
            agent: agent_id,
        });
        tracing::debug!(task = %id, agent = %agent_id, reassignable, "task unassigned");

        if !reassignable {
            self.detach_task(id);
            return;
        }
        if let Some(entry) = self.tasks.get_mut(id) {
            entry.task.clear_memory();
        }
        self.requeue(id);
    }

    /// Put a task that is not in Unassigned back there, or in the backlog
    /// if its tier is full.
    fn requeue(&mut self, id: TaskId) {
        let Some(priority) = self.tasks.get(id).map(|e| e.priority) else {
            return;
        };
        if self.tiers[priority.index()].unassigned.len() < self.config.buildup_limit {
            self.move_task(id, Bucket::Unassigned);
        } else {
            self.move_task(id, Bucket::Backlog);
            self.events
                .push(SchedulerEvent::Backlogged { task: id, priority });
        }
    }

    /// Move a task between buckets of its tier, keeping its sequence.
    fn move_task(&mut self, id: TaskId, to: Bucket) {
        let Some(entry) = self.tasks.get_mut(id) else {
            return;
        };
        let tier = &mut self.tiers[entry.priority.index()];
        tier.bucket_mut(entry.bucket).remove(&entry.seq);
        tier.bucket_mut(to).insert(entry.seq, id);
        entry.bucket = to;
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    pub fn add_agent(&mut self, agent: Agent) -> AgentId {
        let seq = self.take_seq();
        let name = agent.name.clone();
        let id = self.agents.insert(AgentEntry {
            agent,
            seq,
            task: None,
        });
        self.free.insert(seq, id);
        tracing::debug!(agent = %id, %name, "agent added");
        id
    }

    /// Unregister an agent, unassigning its task first.
    pub fn remove_agent(&mut self, id: AgentId) -> Result<Agent, SchedulerError> {
        let Some(task) = self.agents.get(id).map(|a| a.task) else {
            return Err(unknown_agent(id));
        };
        if let Some(task_id) = task {
            self.release_task(task_id);
        }
        let entry = self.agents.remove(id).ok_or_else(|| unknown_agent(id))?;
        self.free.remove(&entry.seq);
        self.busy.remove(&entry.seq);
        tracing::debug!(agent = %id, name = %entry.agent.name, "agent removed");
        Ok(entry.agent)
    }

    /// Unassign whatever task the agent is doing. Returns that task.
    pub fn unassign_agent(&mut self, id: AgentId) -> Result<Option<TaskId>, SchedulerError> {
        let Some(task) = self.agents.get(id).map(|a| a.task) else {
            return Err(unknown_agent(id));
        };
        if let Some(task_id) = task {
            self.release_task(task_id);
        }
        Ok(task)
    }

    fn free_agent(&mut self, id: AgentId) {
        if let Some(entry) = self.agents.get_mut(id) {
            entry.task = None;
            self.busy.remove(&entry.seq);
            self.free.insert(entry.seq, id);
        }
    }

    fn assign(&mut self, agent_id: AgentId, task_id: TaskId) {
        let (Some(agent), Some(task)) = (self.agents.get_mut(agent_id), self.tasks.get_mut(task_id))
        else {
            return;
        };
        agent.task = Some(task_id);
        task.agent = Some(agent_id);
        self.free.remove(&agent.seq);
        self.busy.insert(agent.seq, agent_id);
        tracing::info!(
            task = %task_id,
            label = %task.task.label(),
            agent = %agent.agent.name,
            "task assigned"
        );
        self.move_task(task_id, Bucket::Assigned);
        self.events.push(SchedulerEvent::Assigned {
            task: task_id,
            agent: agent_id,
        });
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Advance by `dt` seconds: reassign if the interval has elapsed, then
    /// run every busy agent's task once.
    pub fn update(&mut self, dt: f32, ctx: &mut TaskContext<'_>) {
        self.since_reassign += dt;
        if self.since_reassign >= self.config.reassign_interval {
            self.reassign(ctx);
        }
        self.execute(dt, ctx);
    }

    /// Run one reassignment pass over all tiers now.
    pub fn reassign(&mut self, ctx: &mut TaskContext<'_>) {
        self.since_reassign = 0.0;
        let mut assigned = 0;
        for priority in Priority::ALL {
            self.drop_ended(priority);
            self.promote_backlog(priority, ctx);
            self.backlog_impossible(priority, ctx);
            if !self.free.is_empty() {
                assigned += self.assign_tier(priority, ctx);
            }
        }
        tracing::debug!(
            assigned,
            free = self.free.len(),
            busy = self.busy.len(),
            "reassignment pass"
        );
    }

    fn drop_ended(&mut self, priority: Priority) {
        let tier = &self.tiers[priority.index()];
        let ended: Vec<TaskId> = tier
            .unassigned
            .values()
            .chain(tier.backlog.values())
            .copied()
            .filter(|&id| self.tasks.get(id).is_some_and(|e| e.task.is_ended()))
            .collect();
        for id in ended {
            self.detach_task(id);
        }
    }

    fn promote_backlog(&mut self, priority: Priority, ctx: &mut TaskContext<'_>) {
        let backlog: Vec<TaskId> = self.tiers[priority.index()]
            .backlog
            .values()
            .copied()
            .collect();
        for id in backlog {
            if self.tiers[priority.index()].unassigned.len() >= self.config.buildup_limit {
                break;
            }
            let Some(entry) = self.tasks.get_mut(id) else {
                continue;
            };
            if entry.task.is_strictly_impossible(ctx) {
                continue;
            }
            self.move_task(id, Bucket::Unassigned);
            self.events
                .push(SchedulerEvent::Promoted { task: id, priority });
        }
    }

    fn backlog_impossible(&mut self, priority: Priority, ctx: &mut TaskContext<'_>) {
        let unassigned: Vec<TaskId> = self.tiers[priority.index()]
            .unassigned
            .values()
            .copied()
            .collect();
        for id in unassigned {
            let Some(entry) = self.tasks.get_mut(id) else {
                continue;
            };
            if entry.task.is_strictly_impossible(ctx) {
                self.move_task(id, Bucket::Backlog);
                self.events
                    .push(SchedulerEvent::Backlogged { task: id, priority });
            }
        }
    }

    /// Greedy fairness-weighted matching of free agents to this tier's
    /// unassigned tasks. Returns the number of assignments made.
    fn assign_tier(&mut self, priority: Priority, ctx: &mut TaskContext<'_>) -> usize {
        let agents: Vec<AgentId> = self.free.values().copied().collect();
        let tasks: Vec<TaskId> = self.tiers[priority.index()]
            .unassigned
            .values()
            .copied()
            .collect();
        let (rows, cols) = (agents.len(), tasks.len());
        if rows == 0 || cols == 0 {
            return 0;
        }

        let mut cost = vec![f32::INFINITY; rows * cols];
        for (i, &agent_id) in agents.iter().enumerate() {
            let Some(agent) = self.agents.get(agent_id) else {
                continue;
            };
            for (j, &task_id) in tasks.iter().enumerate() {
                let Some(entry) = self.tasks.get_mut(task_id) else {
                    continue;
                };
                let c = entry.task.estimate_cost(&agent.agent, ctx);
                if c.is_finite() {
                    cost[i * cols + j] = c.max(0.0);
                }
            }
        }

        let mut task_taken = vec![false; cols];
        for (j, &task_id) in tasks.iter().enumerate() {
            if (0..rows).all(|i| cost[i * cols + j].is_infinite()) {
                task_taken[j] = true;
                self.move_task(task_id, Bucket::Backlog);
                self.events.push(SchedulerEvent::Backlogged {
                    task: task_id,
                    priority,
                });
            }
        }

        let row_max: Vec<f32> = (0..rows)
            .map(|i| finite_max((0..cols).map(|j| cost[i * cols + j])))
            .collect();
        let col_max: Vec<f32> = (0..cols)
            .map(|j| finite_max((0..rows).map(|i| cost[i * cols + j])))
            .collect();

        let mut agent_taken = vec![false; rows];
        let mut made = 0;
        for _ in 0..rows.min(cols) {
            let mut best: Option<(f32, usize, usize)> = None;
            for i in (0..rows).filter(|&i| !agent_taken[i]) {
                for j in (0..cols).filter(|&j| !task_taken[j]) {
                    let c = cost[i * cols + j];
                    if c.is_infinite() {
                        continue;
                    }
                    let score = row_max[i].max(col_max[j]) - c;
                    // Strict comparison keeps the earliest pair on ties.
                    if best.is_none_or(|(s, _, _)| score > s) {
                        best = Some((score, i, j));
                    }
                }
            }
            let Some((_, i, j)) = best else {
                break;
            };
            agent_taken[i] = true;
            task_taken[j] = true;
            self.assign(agents[i], tasks[j]);
            made += 1;
        }
        made
    }

    fn execute(&mut self, dt: f32, ctx: &mut TaskContext<'_>) {
        let busy: Vec<AgentId> = self.busy.values().copied().collect();
        for agent_id in busy {
            let Some(task_id) = self.agents.get(agent_id).and_then(|a| a.task) else {
                continue;
            };
            let (Some(agent), Some(entry)) =
                (self.agents.get_mut(agent_id), self.tasks.get_mut(task_id))
            else {
                continue;
            };
            let status = entry.task.execute(dt, &mut agent.agent, ctx);
            let ended = entry.task.is_ended();
            match status {
                TaskStatus::Completed => {
                    tracing::info!(
                        task = %task_id,
                        label = %entry.task.label(),
                        agent = %agent.agent.name,
                        "task completed"
                    );
                    self.events.push(SchedulerEvent::Completed {
                        task: task_id,
                        agent: agent_id,
                    });
                    self.detach_task(task_id);
                }
                TaskStatus::Failed => {
                    self.events.push(SchedulerEvent::Failed {
                        task: task_id,
                        agent: agent_id,
                    });
                    self.release_task(task_id);
                }
                TaskStatus::Working if ended => {
                    self.detach_task(task_id);
                }
                TaskStatus::Working => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn task(&self, id: TaskId) -> Option<&dyn Task> {
        self.tasks.get(id).map(|e| e.task.as_ref())
    }

    pub fn task_bucket(&self, id: TaskId) -> Option<Bucket> {
        self.tasks.get(id).map(|e| e.bucket)
    }

    pub fn task_priority(&self, id: TaskId) -> Option<Priority> {
        self.tasks.get(id).map(|e| e.priority)
    }

    pub fn assigned_agent(&self, task: TaskId) -> Option<AgentId> {
        self.tasks.get(task).and_then(|e| e.agent)
    }

    pub fn agent_task(&self, agent: AgentId) -> Option<TaskId> {
        self.agents.get(agent).and_then(|e| e.task)
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id).map(|e| &e.agent)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id).map(|e| &mut e.agent)
    }

    pub fn bucket_len(&self, priority: Priority, bucket: Bucket) -> usize {
        self.tiers[priority.index()].bucket(bucket).len()
    }

    /// Tasks in a bucket, in insertion order.
    pub fn bucket_tasks(&self, priority: Priority, bucket: Bucket) -> Vec<TaskId> {
        self.tiers[priority.index()]
            .bucket(bucket)
            .values()
            .copied()
            .collect()
    }

    /// Free agents in registration order.
    pub fn free_agents(&self) -> Vec<AgentId> {
        self.free.values().copied().collect()
    }

    pub fn busy_agents(&self) -> Vec<AgentId> {
        self.busy.values().copied().collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Take the events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Largest finite value, or 0 if there is none.
fn finite_max(values: impl Iterator<Item = f32>) -> f32 {
    values.filter(|c| c.is_finite()).fold(0.0, f32::max)
}

fn unknown_task(id: TaskId) -> SchedulerError {
    tracing::error!(task = %id, "scheduler called with unknown task");
    SchedulerError::UnknownTask(id)
}

fn unknown_agent(id: AgentId) -> SchedulerError {
    tracing::error!(agent = %id, "scheduler called with unknown agent");
    SchedulerError::UnknownAgent(id)
}
