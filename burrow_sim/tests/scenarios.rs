// End-to-end scenarios across navigation, scheduling and the sim loop.
//
// Run with `RUST_LOG=burrow_sim=debug` to see scheduler and nav logs.

use burrow_sim::agent::Agent;
use burrow_sim::capability::WorkKind;
use burrow_sim::config::{NavConfig, SimConfig};
use burrow_sim::event::{SchedulerEvent, SimEventKind};
use burrow_sim::locomotion::builtin;
use burrow_sim::nav::NavMap;
use burrow_sim::path::{Path, PathStep};
use burrow_sim::scheduler::Bucket;
use burrow_sim::sim::SimState;
use burrow_sim::types::{CellCoord, LocomotionKind, Priority, VoxelCoord};
use burrow_sim::work::GoToTask;
use burrow_sim::world::{VoxelType, VoxelWorld};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn floor(size_x: u32, size_y: u32, size_z: u32) -> VoxelWorld {
    let mut world = VoxelWorld::new(size_x, size_y, size_z);
    world.fill_box(
        VoxelCoord::new(0, 0, 0),
        VoxelCoord::new(size_x as i32 - 1, 0, size_z as i32 - 1),
        VoxelType::Stone,
    );
    world
}

fn walker_map() -> NavMap {
    let probe_limit = NavConfig::default().probe_limit;
    NavMap::new(builtin(LocomotionKind::Walker), probe_limit)
}

#[test]
fn disconnected_rooms_have_no_path() {
    init_tracing();
    let mut world = floor(24, 6, 8);
    world.fill_box(
        VoxelCoord::new(11, 1, 0),
        VoxelCoord::new(12, 5, 7),
        VoxelType::Stone,
    );
    let config = NavConfig::default();
    let mut map = walker_map();

    let mut path = Path::new(
        LocomotionKind::Walker,
        VoxelCoord::new(2, 1, 3),
        [VoxelCoord::new(20, 1, 3)],
    );
    assert!(!path.exists(&mut map, &world, &config));
    assert_eq!(path.advance(&mut map, &world, &config), PathStep::Blocked);

    let west = map.find_component(&world, VoxelCoord::new(2, 1, 3)).unwrap();
    let east = map.find_component(&world, VoxelCoord::new(20, 1, 3)).unwrap();
    assert!(!map.same_partition(&world, west, east));
}

#[test]
fn open_field_is_one_component_per_cell_and_one_partition() {
    init_tracing();
    let world = floor(80, 2, 80);
    let mut map = walker_map();

    let mut refs = Vec::new();
    for cz in 0..10 {
        for cx in 0..10 {
            let cell = CellCoord { x: cx, y: 0, z: cz };
            assert_eq!(map.components_in(&world, cell).len(), 1, "cell {cx},{cz}");
            let inside = cell.origin() + VoxelCoord::new(3, 1, 3);
            refs.push(map.find_component(&world, inside).unwrap());
        }
    }
    map.compute_partitions(&world, &refs[..1]);
    let first = map.partition_of(refs[0]).unwrap();
    for r in &refs {
        assert_eq!(map.partition_of(*r), Some(first));
    }
}

/// Rooms along x, split by walls at x = 12 and x = 26 with a doorway at z = 3
/// in each, plus a sealed room beyond x = 34.
fn chained_rooms() -> VoxelWorld {
    let mut world = floor(40, 4, 8);
    for x in [12, 26, 34] {
        world.fill_box(
            VoxelCoord::new(x, 1, 0),
            VoxelCoord::new(x, 3, 7),
            VoxelType::Stone,
        );
    }
    for x in [12, 26] {
        world.fill_box(
            VoxelCoord::new(x, 1, 3),
            VoxelCoord::new(x, 3, 3),
            VoxelType::Air,
        );
    }
    world
}

#[test]
fn reachability_is_transitive_across_chained_rooms() {
    init_tracing();
    let world = chained_rooms();
    let config = NavConfig::default();
    let (a, b, c, sealed) = (
        VoxelCoord::new(2, 1, 6),
        VoxelCoord::new(19, 1, 1),
        VoxelCoord::new(31, 1, 6),
        VoxelCoord::new(37, 1, 4),
    );

    let mut map = walker_map();
    let exists = |from: VoxelCoord, to: VoxelCoord, map: &mut NavMap| {
        Path::new(LocomotionKind::Walker, from, [to]).exists(map, &world, &config)
    };
    assert!(exists(a, b, &mut map));
    assert!(exists(b, c, &mut map));
    assert!(exists(a, c, &mut map));
    assert!(exists(c, a, &mut map));
    assert!(exists(a, a, &mut map));
    assert!(!exists(a, sealed, &mut map));
    assert!(!exists(c, sealed, &mut map));

    // Frontiers started at both ends meet in the middle room and must end
    // up as one partition.
    let mut map = walker_map();
    let ra = map.find_component(&world, a).unwrap();
    let rb = map.find_component(&world, b).unwrap();
    let rc = map.find_component(&world, c).unwrap();
    let rs = map.find_component(&world, sealed).unwrap();
    map.compute_partitions(&world, &[ra, rc]);
    map.compute_partitions(&world, &[rs]);
    map.compute_partitions(&world, &[rb]);
    let pa = map.partition_of(ra).unwrap();
    assert_eq!(map.partition_of(rb), Some(pa));
    assert_eq!(map.partition_of(rc), Some(pa));
    assert_ne!(map.partition_of(rs).unwrap(), pa);
    assert!(map.same_partition(&world, rc, ra));
}

#[test]
fn bridging_a_trench_on_a_cell_top_layer_opens_a_path() {
    init_tracing();
    // Ground fills y = 0..=7 so walkers stand at y = 8, in the next cell
    // layer; a trench at x = 8 cuts it in two.
    let mut world = VoxelWorld::new(16, 12, 8);
    world.fill_box(
        VoxelCoord::new(0, 0, 0),
        VoxelCoord::new(15, 7, 7),
        VoxelType::Stone,
    );
    world.fill_box(
        VoxelCoord::new(8, 0, 0),
        VoxelCoord::new(8, 7, 7),
        VoxelType::Air,
    );
    let mut sim = SimState::with_world(
        SimConfig {
            locomotions: vec![LocomotionKind::Walker, LocomotionKind::Climber],
            ..SimConfig::default()
        },
        world,
    )
    .unwrap();
    let (west, east) = (VoxelCoord::new(2, 8, 3), VoxelCoord::new(13, 8, 3));
    assert!(!sim.path_exists(LocomotionKind::Walker, west, [east]));

    sim.set_voxel(VoxelCoord::new(8, 7, 3), VoxelType::Stone);
    assert!(sim.path_exists(LocomotionKind::Walker, west, [east]));
}

#[test]
fn closing_and_reopening_a_wall_updates_reachability() {
    init_tracing();
    let mut sim = SimState::with_world(
        SimConfig {
            locomotions: vec![LocomotionKind::Walker],
            ..SimConfig::default()
        },
        floor(24, 6, 8),
    )
    .unwrap();
    let (a, b) = (VoxelCoord::new(2, 1, 3), VoxelCoord::new(20, 1, 3));
    assert!(sim.path_exists(LocomotionKind::Walker, a, [b]));

    sim.fill_box(
        VoxelCoord::new(12, 1, 0),
        VoxelCoord::new(12, 5, 7),
        VoxelType::Stone,
    );
    assert!(!sim.path_exists(LocomotionKind::Walker, a, [b]));

    sim.set_voxel(VoxelCoord::new(12, 1, 3), VoxelType::Air);
    sim.set_voxel(VoxelCoord::new(12, 2, 3), VoxelType::Air);
    assert!(sim.path_exists(LocomotionKind::Walker, a, [b]));
}

#[test]
fn backlog_holds_overflow_until_room_opens() {
    init_tracing();
    let mut sim = SimState::with_world(SimConfig::default(), floor(16, 4, 16)).unwrap();
    let spot = VoxelCoord::new(4, 1, 4);
    let ids: Vec<_> = (0..21)
        .map(|_| sim.add_task(GoToTask::new([spot]), Priority::Low))
        .collect();
    let scheduler = sim.scheduler();
    assert_eq!(scheduler.bucket_len(Priority::Low, Bucket::Unassigned), 20);
    assert_eq!(scheduler.bucket_len(Priority::Low, Bucket::Backlog), 1);

    sim.remove_task(ids[0]).unwrap();
    let events = sim.update(0.1).events;
    let scheduler = sim.scheduler();
    assert_eq!(scheduler.bucket_len(Priority::Low, Bucket::Unassigned), 20);
    assert_eq!(scheduler.bucket_len(Priority::Low, Bucket::Backlog), 0);
    let promoted = events
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                SimEventKind::Scheduler(SchedulerEvent::Promoted { .. })
            )
        })
        .count();
    assert_eq!(promoted, 1);
}

#[test]
fn high_priority_work_goes_first() {
    init_tracing();
    let mut sim = SimState::with_world(SimConfig::default(), floor(16, 4, 16)).unwrap();
    let low = sim.add_task(GoToTask::new([VoxelCoord::new(2, 1, 2)]), Priority::Low);
    let high = sim.add_task(GoToTask::new([VoxelCoord::new(14, 1, 14)]), Priority::High);
    let agent = sim.spawn_agent(Agent::new(
        "worker",
        VoxelCoord::new(2, 1, 3),
        LocomotionKind::Walker,
    ));

    sim.update(0.1);
    assert_eq!(sim.scheduler().agent_task(agent), Some(high));
    assert_eq!(sim.scheduler().task_bucket(low), Some(Bucket::Unassigned));
}

#[test]
fn every_agent_gets_distinct_work() {
    init_tracing();
    let mut sim = SimState::with_world(SimConfig::default(), floor(32, 4, 32)).unwrap();
    let agents: Vec<_> = (0..3)
        .map(|i| {
            sim.spawn_agent(Agent::new(
                format!("worker{i}"),
                VoxelCoord::new(2 + 10 * i, 1, 2),
                LocomotionKind::Walker,
            ))
        })
        .collect();
    for i in 0..5 {
        sim.add_task(
            GoToTask::new([VoxelCoord::new(3 + 6 * i, 1, 20)]),
            Priority::Medium,
        );
    }
    sim.update(0.1);

    let scheduler = sim.scheduler();
    let mut tasks: Vec<_> = agents
        .iter()
        .map(|&a| scheduler.agent_task(a).unwrap())
        .collect();
    tasks.sort();
    tasks.dedup();
    assert_eq!(tasks.len(), 3);
    assert_eq!(scheduler.bucket_len(Priority::Medium, Bucket::Assigned), 3);
    assert_eq!(
        scheduler.bucket_len(Priority::Medium, Bucket::Unassigned),
        2
    );
}

#[test]
fn unreachable_task_waits_in_backlog() {
    init_tracing();
    let mut world = floor(24, 6, 8);
    world.fill_box(
        VoxelCoord::new(11, 1, 0),
        VoxelCoord::new(12, 5, 7),
        VoxelType::Stone,
    );
    let mut sim = SimState::with_world(SimConfig::default(), world).unwrap();
    sim.spawn_agent(Agent::new(
        "west",
        VoxelCoord::new(2, 1, 3),
        LocomotionKind::Walker,
    ));
    let task = sim.add_task(GoToTask::new([VoxelCoord::new(20, 1, 3)]), Priority::Medium);
    sim.update(0.1);
    assert_eq!(sim.scheduler().task_bucket(task), Some(Bucket::Backlog));
}

#[test]
fn digging_through_a_wall_lets_a_walker_cross() {
    init_tracing();
    let mut world = floor(24, 6, 8);
    world.fill_box(
        VoxelCoord::new(12, 1, 0),
        VoxelCoord::new(12, 5, 7),
        VoxelType::Stone,
    );
    let mut sim = SimState::with_world(
        SimConfig {
            locomotions: vec![LocomotionKind::Walker],
            ..SimConfig::default()
        },
        world,
    )
    .unwrap();
    let agent = sim.spawn_agent(Agent::new(
        "digger",
        VoxelCoord::new(4, 1, 3),
        LocomotionKind::Walker,
    ));
    sim.add_work(WorkKind::Dig, VoxelCoord::new(12, 1, 3), Priority::High);
    sim.add_work(WorkKind::Dig, VoxelCoord::new(12, 2, 3), Priority::High);

    for _ in 0..300 {
        sim.update(0.1);
        if sim.scheduler().task_count() == 0 {
            break;
        }
    }
    assert_eq!(sim.scheduler().task_count(), 0);

    let goal = VoxelCoord::new(20, 1, 3);
    sim.add_task(GoToTask::new([goal]), Priority::Medium);
    for _ in 0..300 {
        sim.update(0.1);
        if sim.scheduler().task_count() == 0 {
            break;
        }
    }
    assert_eq!(sim.scheduler().agent(agent).unwrap().position, goal);
}
