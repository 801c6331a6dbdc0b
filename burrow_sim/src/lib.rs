// burrow_sim: task scheduling and hierarchical voxel navigation.
//
// This crate contains the simulation core for Burrow: a voxel world, lazily
// built connectivity maps per locomotion kind, two-level path search over
// them, and a scheduler that hands tasks to agents by priority and cost. It
// has no rendering or engine dependencies and runs headless.
//
// Module overview:
// - `sim.rs`:        Top-level SimState and update loop.
// - `world.rs`:      Dense 3D voxel grid and the `WorldQuery` read interface.
// - `locomotion.rs`: How walkers, climbers and flyers move and what it costs.
// - `nav.rs`:        NavMap: per-cell components, links, partitions, invalidation.
// - `path.rs`:       Path: coarse component search plus bounded fine segments.
// - `registry.rs`:   NavRegistry: one NavMap per locomotion kind.
// - `scheduler.rs`:  Scheduler: priority tiers, backlog, greedy assignment.
// - `task.rs`:       The Task contract and TaskContext.
// - `work.rs`:       Built-in tasks (go to, flee, dig/build work).
// - `agent.rs`:      Agent data and path following.
// - `capability.rs`: Work ranges per work kind.
// - `arena.rs`:      Generational arena behind task and agent handles.
// - `event.rs`:      Narrative SimEvents and SchedulerEvents.
// - `config.rs`:     SimConfig: all tunable parameters, loaded from JSON.
// - `types.rs`:      VoxelCoord, CellCoord, handles, Priority, LocomotionKind.
//
// **Critical constraint: determinism.** The simulation is a pure function of
// its config and inputs. No `HashMap` iteration, no system time, no OS
// entropy. Use `BTreeMap` for ordered collections.

pub mod agent;
pub mod arena;
pub mod capability;
pub mod config;
pub mod event;
pub mod locomotion;
pub mod nav;
pub mod path;
pub mod registry;
pub mod scheduler;
pub mod sim;
pub mod task;
pub mod types;
pub mod work;
pub mod world;
