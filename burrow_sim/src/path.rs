// Two-level path search over a `NavMap`.
//
// A `Path` is created with a source voxel and a set of destination voxels and
// planned lazily. Planning has two levels:
//
// - **Coarse**: A* over components, run backward from every destination
//   component that shares the source's partition toward the source. Edge
//   cost is the distance between component anchors, the heuristic is the
//   distance to the source anchor. Because the search runs backward, walking
//   `came_from` from the source yields the route in forward order.
// - **Fine**: forward A* over voxels, restricted to the component the agent
//   is in and the next one on the coarse route. Only the current segment is
//   ever materialized; the next one is computed when the previous one runs
//   out.
//
// Both searches cap their open set (`NavConfig::coarse_open_limit`,
// `NavConfig::fine_open_limit`). Overflowing is logged and treated as "no
// path", so a single hard query can't stall a tick.
//
// `advance()` consumes one fine step at a time, greedily cutting same-height
// "L" corners when both straight alternatives are open, and replans from the
// current voxel when the map's revision shows the plan may be stale.
//
// See also: `nav.rs` for components, partitions and adjacency,
// `registry.rs` for `NavRegistry::find_path`, `work.rs` for the tasks that
// drive agents along paths.
//
// **Critical constraint: determinism.** Open-set ties break on node order
// (`ComponentRef` / `VoxelCoord` `Ord`), and destinations are kept sorted.

use crate::config::NavConfig;
use crate::nav::{NavMap, Probe, anchor_distance};
use crate::types::{ComponentRef, LocomotionKind, VoxelCoord};
use crate::world::WorldQuery;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// Result of one `Path::advance` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStep {
    /// Moved to this voxel.
    Step(VoxelCoord),
    /// Already standing on a destination.
    Arrived,
    /// No way forward from the current voxel.
    Blocked,
}

#[derive(Clone, Debug)]
enum Plan {
    Unplanned,
    /// No route. `revision` is the map revision the search ran against;
    /// `None` means the path can never exist (wrong map kind).
    NotFound {
        revision: Option<u64>,
    },
    Planned {
        /// Components from the source's to a destination's.
        coarse: Vec<ComponentRef>,
        /// Index into `coarse` of the component currently being crossed.
        segment: usize,
        fine: VecDeque<VoxelCoord>,
        cost: f32,
        /// Map revision the plan was computed against.
        revision: u64,
    },
}

/// A lazily planned route from the current position to any destination.
#[derive(Clone, Debug)]
pub struct Path {
    kind: LocomotionKind,
    position: VoxelCoord,
    /// Sorted, deduplicated.
    destinations: Vec<VoxelCoord>,
    plan: Plan,
}

impl Path {
    pub fn new(
        kind: LocomotionKind,
        source: VoxelCoord,
        destinations: impl IntoIterator<Item = VoxelCoord>,
    ) -> Self {
        let mut destinations: Vec<VoxelCoord> = destinations.into_iter().collect();
        destinations.sort();
        destinations.dedup();
        Self {
            kind,
            position: source,
            destinations,
            plan: Plan::Unplanned,
        }
    }

    /// A path already known not to exist.
    pub fn unreachable(
        kind: LocomotionKind,
        source: VoxelCoord,
        destinations: impl IntoIterator<Item = VoxelCoord>,
    ) -> Self {
        Self {
            plan: Plan::NotFound { revision: None },
            ..Self::new(kind, source, destinations)
        }
    }

    pub fn kind(&self) -> LocomotionKind {
        self.kind
    }

    /// Where the traversing agent currently is, as far as the path knows.
    pub fn position(&self) -> VoxelCoord {
        self.position
    }

    pub fn destinations(&self) -> &[VoxelCoord] {
        &self.destinations
    }

    pub fn is_destination(&self, voxel: VoxelCoord) -> bool {
        self.destinations.binary_search(&voxel).is_ok()
    }

    /// Number of components on the coarse route, 0 if unplanned or missing.
    pub fn coarse_len(&self) -> usize {
        match &self.plan {
            Plan::Planned { coarse, .. } => coarse.len(),
            _ => 0,
        }
    }

    /// Whether a destination is reachable from the current position. Plans
    /// the coarse route on first call and again whenever the map has been
    /// invalidated since; the partition check short-circuits most negative
    /// answers.
    pub fn exists(&mut self, map: &mut NavMap, world: &dyn WorldQuery, config: &NavConfig) -> bool {
        if self.is_stale(map) {
            self.plan = self.plan_coarse(map, world, config);
        }
        matches!(self.plan, Plan::Planned { .. })
    }

    /// Replan from `source`, keeping the destination set. Returns whether a
    /// route exists from there.
    pub fn restart(
        &mut self,
        source: VoxelCoord,
        map: &mut NavMap,
        world: &dyn WorldQuery,
        config: &NavConfig,
    ) -> bool {
        self.position = source;
        self.plan = self.plan_coarse(map, world, config);
        if matches!(self.plan, Plan::Planned { .. }) && !self.is_destination(source) {
            self.extend_fine(map, world, config);
        }
        matches!(self.plan, Plan::Planned { .. })
    }

    /// Approximate travel distance along the coarse route, `None` if no
    /// route exists.
    pub fn estimated_cost(
        &mut self,
        map: &mut NavMap,
        world: &dyn WorldQuery,
        config: &NavConfig,
    ) -> Option<f32> {
        if self.is_stale(map) {
            self.plan = self.plan_coarse(map, world, config);
        }
        match &self.plan {
            Plan::Planned { cost, .. } => Some(*cost),
            _ => None,
        }
    }

    /// Take one step along the route.
    pub fn advance(
        &mut self,
        map: &mut NavMap,
        world: &dyn WorldQuery,
        config: &NavConfig,
    ) -> PathStep {
        if self.is_destination(self.position) {
            return PathStep::Arrived;
        }
        if self.is_stale(map) {
            if matches!(self.plan, Plan::Planned { .. }) {
                tracing::debug!(position = %self.position, "replanning stale path");
            }
            self.plan = self.plan_coarse(map, world, config);
        }
        if !matches!(self.plan, Plan::Planned { .. }) {
            return PathStep::Blocked;
        }
        if self.fine_is_empty() && !self.extend_fine(map, world, config) {
            // The coarse route no longer matches where we are; try once more
            // from scratch.
            self.plan = self.plan_coarse(map, world, config);
            if !self.extend_fine(map, world, config) {
                return PathStep::Blocked;
            }
        }

        let position = self.position;
        let Plan::Planned { fine, .. } = &mut self.plan else {
            return PathStep::Blocked;
        };
        let Some(mut next) = fine.pop_front() else {
            return PathStep::Blocked;
        };
        let loco = map.locomotion();
        if loco.transition_cost(world, position, next).is_infinite() {
            // World changed under us without an invalidation reaching the map.
            self.plan = Plan::Unplanned;
            return PathStep::Blocked;
        }
        if let Some(&after) = fine.front() {
            if is_corner(position, next, after) {
                let other = position + (after - next);
                let open = [(next, after), (position, other), (other, after)]
                    .iter()
                    .all(|&(a, b)| loco.transition_cost(world, a, b).is_finite());
                if open {
                    fine.pop_front();
                    next = after;
                }
            }
        }
        self.position = next;
        PathStep::Step(next)
    }

    fn is_stale(&self, map: &NavMap) -> bool {
        match &self.plan {
            Plan::Unplanned => true,
            Plan::NotFound { revision } => revision.is_some_and(|r| r != map.revision()),
            Plan::Planned { revision, .. } => *revision != map.revision(),
        }
    }

    fn fine_is_empty(&self) -> bool {
        match &self.plan {
            Plan::Planned { fine, .. } => fine.is_empty(),
            _ => true,
        }
    }

    // -----------------------------------------------------------------------
    // Coarse level
    // -----------------------------------------------------------------------

    fn plan_coarse(&self, map: &mut NavMap, world: &dyn WorldQuery, config: &NavConfig) -> Plan {
        if map.kind() != self.kind {
            tracing::error!(
                path = ?self.kind,
                map = ?map.kind(),
                "path planned against another locomotion's map"
            );
            return Plan::NotFound { revision: None };
        }
        let source = self.position;
        // Solid endpoints are rejected without forcing a cell scan.
        if map.probe_component(world, source) == Probe::Impassable {
            return not_found(map);
        }
        let Some(source_comp) = map.find_component(world, source) else {
            return not_found(map);
        };

        let mut dest_comps: Vec<(VoxelCoord, ComponentRef)> = Vec::new();
        for &d in &self.destinations {
            if map.probe_component(world, d) == Probe::Impassable {
                continue;
            }
            if let Some(c) = map.find_component(world, d) {
                dest_comps.push((d, c));
            }
        }

        let mut seeds = vec![source_comp];
        for &(_, c) in &dest_comps {
            if !seeds.contains(&c) {
                seeds.push(c);
            }
        }
        map.compute_partitions(world, &seeds);
        let Some(source_partition) = map.partition_of(source_comp) else {
            return not_found(map);
        };
        dest_comps.retain(|&(_, c)| map.partition_of(c) == Some(source_partition));
        if dest_comps.is_empty() {
            return not_found(map);
        }

        let mut goals: Vec<ComponentRef> = dest_comps.iter().map(|&(_, c)| c).collect();
        goals.sort();
        goals.dedup();
        let Some(coarse) = coarse_search(map, world, config, source_comp, &goals) else {
            return not_found(map);
        };
        let cost = coarse_cost(map, &coarse, source, &dest_comps);
        tracing::trace!(
            %source,
            components = coarse.len(),
            cost,
            "planned coarse route"
        );
        Plan::Planned {
            coarse,
            segment: 0,
            fine: VecDeque::new(),
            cost,
            revision: map.revision(),
        }
    }

    // -----------------------------------------------------------------------
    // Fine level
    // -----------------------------------------------------------------------

    /// Compute the fine steps across the current coarse segment. Returns
    /// `false` if the current position is off the route or no steps exist.
    fn extend_fine(
        &mut self,
        map: &mut NavMap,
        world: &dyn WorldQuery,
        config: &NavConfig,
    ) -> bool {
        let Plan::Planned {
            coarse,
            segment,
            fine,
            ..
        } = &mut self.plan
        else {
            return false;
        };
        let Some(here) = map.find_component(world, self.position) else {
            return false;
        };
        let Some(offset) = coarse.iter().skip(*segment).position(|&c| c == here) else {
            return false;
        };
        *segment += offset;

        let next = coarse.get(*segment + 1).copied();
        let (allowed, target) = match next {
            Some(n) => {
                let mid = match (map.component(here), map.component(n)) {
                    (Some(a), Some(b)) => midpoint(a.anchor, b.anchor),
                    _ => self.position.center(),
                };
                (vec![here, n], Target::Point(mid))
            }
            None => (vec![here], final_target(&self.destinations, config)),
        };

        let search = FineSearch {
            allowed: &allowed,
            goal_component: next,
            destinations: &self.destinations,
            target,
            open_limit: config.fine_open_limit,
        };
        let Some(steps) = search.run(map, world, self.position) else {
            return false;
        };
        if next.is_some() {
            *segment += 1;
        }
        fine.extend(steps);
        !fine.is_empty()
    }
}

/// A failed search, to be retried once the map changes.
fn not_found(map: &NavMap) -> Plan {
    Plan::NotFound {
        revision: Some(map.revision()),
    }
}

/// A* over the component graph, from `goals` back to `source`.
fn coarse_search(
    map: &mut NavMap,
    world: &dyn WorldQuery,
    config: &NavConfig,
    source: ComponentRef,
    goals: &[ComponentRef],
) -> Option<Vec<ComponentRef>> {
    let source_anchor = map.component(source)?.anchor;
    let mut g_score: FxHashMap<ComponentRef, f32> = FxHashMap::default();
    // came_from[n] = the neighbour of n one step closer to a destination.
    let mut came_from: FxHashMap<ComponentRef, ComponentRef> = FxHashMap::default();
    let mut closed: FxHashSet<ComponentRef> = FxHashSet::default();
    let mut open = BinaryHeap::new();

    for &goal in goals {
        let Some(anchor) = map.component(goal).map(|c| c.anchor) else {
            continue;
        };
        g_score.insert(goal, 0.0);
        open.push(OpenEntry {
            node: goal,
            f_score: anchor_distance(anchor, source_anchor),
        });
    }

    while let Some(current) = open.pop() {
        let node = current.node;
        if node == source {
            let mut route = vec![source];
            let mut cur = source;
            while let Some(&next) = came_from.get(&cur) {
                route.push(next);
                cur = next;
            }
            return Some(route);
        }
        if !closed.insert(node) {
            continue;
        }
        let Some(here_anchor) = map.component(node).map(|c| c.anchor) else {
            continue;
        };
        let here_g = g_score.get(&node).copied().unwrap_or(f32::INFINITY);

        for neighbor in map.neighbors(world, node) {
            if closed.contains(&neighbor) {
                continue;
            }
            let Some(anchor) = map.component(neighbor).map(|c| c.anchor) else {
                continue;
            };
            let tentative = here_g + anchor_distance(here_anchor, anchor);
            if tentative < g_score.get(&neighbor).copied().unwrap_or(f32::INFINITY) {
                g_score.insert(neighbor, tentative);
                came_from.insert(neighbor, node);
                open.push(OpenEntry {
                    node: neighbor,
                    f_score: tentative + anchor_distance(anchor, source_anchor),
                });
                if open.len() > config.coarse_open_limit {
                    tracing::warn!(
                        limit = config.coarse_open_limit,
                        source = %source,
                        "coarse path search exceeded open-set limit"
                    );
                    return None;
                }
            }
        }
    }
    None
}

/// Source leg + anchor-to-anchor legs + nearest destination leg.
fn coarse_cost(
    map: &NavMap,
    coarse: &[ComponentRef],
    source: VoxelCoord,
    dest_comps: &[(VoxelCoord, ComponentRef)],
) -> f32 {
    let anchors: Vec<[f32; 3]> = coarse
        .iter()
        .filter_map(|&c| map.component(c).map(|comp| comp.anchor))
        .collect();
    let (Some(&first), Some(&last)) = (anchors.first(), anchors.last()) else {
        return 0.0;
    };
    let mut cost = anchor_distance(source.center(), first);
    for pair in anchors.windows(2) {
        cost += anchor_distance(pair[0], pair[1]);
    }
    let last_comp = coarse.last().copied();
    let dest_leg = dest_comps
        .iter()
        .filter(|&&(_, c)| Some(c) == last_comp)
        .map(|&(d, _)| anchor_distance(last, d.center()))
        .fold(f32::INFINITY, f32::min);
    if dest_leg.is_finite() {
        cost += dest_leg;
    }
    cost
}

#[derive(Clone, Copy, Debug)]
enum Target {
    Point([f32; 3]),
    NearestDestination,
}

/// Heuristic target for the last segment: the destinations' centroid when
/// they are tightly clustered, otherwise the nearest one per node.
fn final_target(destinations: &[VoxelCoord], config: &NavConfig) -> Target {
    if destinations.is_empty() {
        return Target::NearestDestination;
    }
    let n = destinations.len() as f32;
    let mut centroid = [0.0f32; 3];
    for d in destinations {
        let c = d.center();
        for axis in 0..3 {
            centroid[axis] += c[axis] / n;
        }
    }
    let variance = destinations
        .iter()
        .map(|d| anchor_distance(d.center(), centroid).powi(2))
        .sum::<f32>()
        / n;
    if variance.sqrt() < config.cluster_stddev {
        Target::Point(centroid)
    } else {
        Target::NearestDestination
    }
}

fn midpoint(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0, (a[2] + b[2]) / 2.0]
}

/// Three same-height voxels forming a right-angle turn of unit steps.
fn is_corner(a: VoxelCoord, b: VoxelCoord, c: VoxelCoord) -> bool {
    if a.y != b.y || b.y != c.y {
        return false;
    }
    let d1 = b - a;
    let d2 = c - b;
    d1.manhattan_distance(VoxelCoord::default()) == 1
        && d2.manhattan_distance(VoxelCoord::default()) == 1
        && d1.x * d2.x + d1.z * d2.z == 0
}

/// One bounded voxel-level search across a coarse segment.
struct FineSearch<'a> {
    allowed: &'a [ComponentRef],
    goal_component: Option<ComponentRef>,
    destinations: &'a [VoxelCoord],
    target: Target,
    open_limit: usize,
}

impl FineSearch<'_> {
    fn heuristic(&self, v: VoxelCoord) -> f32 {
        match self.target {
            Target::Point(p) => anchor_distance(v.center(), p),
            Target::NearestDestination => self
                .destinations
                .iter()
                .map(|d| v.distance(*d))
                .fold(f32::INFINITY, f32::min),
        }
    }

    fn is_goal(&self, map: &mut NavMap, world: &dyn WorldQuery, v: VoxelCoord) -> bool {
        if self.destinations.binary_search(&v).is_ok() {
            return true;
        }
        match self.goal_component {
            Some(goal) => map.find_component(world, v) == Some(goal),
            None => false,
        }
    }

    /// Steps from `start` (exclusive) to the first goal voxel (inclusive).
    fn run(
        &self,
        map: &mut NavMap,
        world: &dyn WorldQuery,
        start: VoxelCoord,
    ) -> Option<Vec<VoxelCoord>> {
        let moves: Vec<VoxelCoord> = map.locomotion().moves().to_vec();
        let mut g_score: FxHashMap<VoxelCoord, f32> = FxHashMap::default();
        let mut came_from: FxHashMap<VoxelCoord, VoxelCoord> = FxHashMap::default();
        let mut closed: FxHashSet<VoxelCoord> = FxHashSet::default();
        let mut open = BinaryHeap::new();

        g_score.insert(start, 0.0);
        open.push(OpenEntry {
            node: start,
            f_score: self.heuristic(start),
        });

        while let Some(current) = open.pop() {
            let v = current.node;
            if self.is_goal(map, world, v) {
                let mut steps = Vec::new();
                let mut cur = v;
                while cur != start {
                    steps.push(cur);
                    match came_from.get(&cur) {
                        Some(&prev) => cur = prev,
                        None => break,
                    }
                }
                steps.reverse();
                return Some(steps);
            }
            if !closed.insert(v) {
                continue;
            }
            let here_g = g_score.get(&v).copied().unwrap_or(f32::INFINITY);

            for &m in &moves {
                let q = v + m;
                if closed.contains(&q) {
                    continue;
                }
                let Some(comp) = map.find_component(world, q) else {
                    continue;
                };
                if !self.allowed.contains(&comp) {
                    continue;
                }
                let step = map.locomotion().transition_cost(world, v, q);
                if step.is_infinite() {
                    continue;
                }
                let tentative = here_g + step;
                if tentative < g_score.get(&q).copied().unwrap_or(f32::INFINITY) {
                    g_score.insert(q, tentative);
                    came_from.insert(q, v);
                    open.push(OpenEntry {
                        node: q,
                        f_score: tentative + self.heuristic(q),
                    });
                    if open.len() > self.open_limit {
                        tracing::warn!(
                            limit = self.open_limit,
                            %start,
                            "fine path search exceeded open-set limit"
                        );
                        return None;
                    }
                }
            }
        }
        None
    }
}

/// Entry in an A* open set (min-heap via reversed ordering).
struct OpenEntry<N> {
    node: N,
    f_score: f32,
}

impl<N: Ord> PartialEq for OpenEntry<N> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<N: Ord> Eq for OpenEntry<N> {}

impl<N: Ord> PartialOrd for OpenEntry<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<N: Ord> Ord for OpenEntry<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locomotion::builtin;
    use crate::world::{VoxelType, VoxelWorld};

    fn map(kind: LocomotionKind) -> NavMap {
        NavMap::new(builtin(kind), 64)
    }

    fn floor_world(sx: u32, sz: u32) -> VoxelWorld {
        let mut world = VoxelWorld::new(sx, 4, sz);
        world.fill_box(
            VoxelCoord::new(0, 0, 0),
            VoxelCoord::new(sx as i32 - 1, 0, sz as i32 - 1),
            VoxelType::Stone,
        );
        world
    }

    /// Walk the path until it arrives or blocks; returns visited voxels.
    fn walk(
        path: &mut Path,
        map: &mut NavMap,
        world: &VoxelWorld,
        config: &NavConfig,
    ) -> (Vec<VoxelCoord>, PathStep) {
        let mut visited = Vec::new();
        for _ in 0..500 {
            match path.advance(map, world, config) {
                PathStep::Step(v) => visited.push(v),
                other => return (visited, other),
            }
        }
        (visited, PathStep::Blocked)
    }

    #[test]
    fn disconnected_rooms_have_no_path() {
        let mut world = VoxelWorld::new(9, 5, 5);
        world.fill_box(
            VoxelCoord::new(0, 0, 0),
            VoxelCoord::new(8, 4, 4),
            VoxelType::Stone,
        );
        world.fill_box(
            VoxelCoord::new(1, 1, 1),
            VoxelCoord::new(3, 3, 3),
            VoxelType::Air,
        );
        world.fill_box(
            VoxelCoord::new(5, 1, 1),
            VoxelCoord::new(7, 3, 3),
            VoxelType::Air,
        );
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);

        let mut across = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(1, 1, 1),
            [VoxelCoord::new(6, 1, 2)],
        );
        assert!(!across.exists(&mut nav, &world, &config));
        assert_eq!(across.estimated_cost(&mut nav, &world, &config), None);

        let mut within = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(1, 1, 1),
            [VoxelCoord::new(3, 1, 3)],
        );
        assert!(within.exists(&mut nav, &world, &config));
    }

    #[test]
    fn walks_across_open_field_to_destination() {
        let world = floor_world(24, 24);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let dest = VoxelCoord::new(20, 1, 21);
        let mut path = Path::new(LocomotionKind::Walker, VoxelCoord::new(1, 1, 2), [dest]);
        assert!(path.exists(&mut nav, &world, &config));
        assert!(path.coarse_len() >= 3);

        let (visited, end) = walk(&mut path, &mut nav, &world, &config);
        assert_eq!(end, PathStep::Arrived);
        assert_eq!(visited.last(), Some(&dest));
        assert_eq!(path.position(), dest);
        for v in &visited {
            assert_eq!(v.y, 1, "walker left the floor at {v}");
        }
    }

    #[test]
    fn source_on_destination_arrives_immediately() {
        let world = floor_world(8, 8);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let here = VoxelCoord::new(3, 1, 3);
        let mut path = Path::new(LocomotionKind::Walker, here, [here]);
        assert!(path.exists(&mut nav, &world, &config));
        assert_eq!(path.advance(&mut nav, &world, &config), PathStep::Arrived);
    }

    #[test]
    fn corner_cutting_skips_l_turns() {
        let world = floor_world(8, 8);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Flyer);
        let start = VoxelCoord::new(1, 1, 1);
        let dest = VoxelCoord::new(3, 1, 3);
        let mut path = Path::new(LocomotionKind::Flyer, start, [dest]);
        let (visited, end) = walk(&mut path, &mut nav, &world, &config);
        assert_eq!(end, PathStep::Arrived);
        // Four face moves without cutting.
        assert!(visited.len() < 4, "took {} steps", visited.len());
    }

    #[test]
    fn no_corner_cut_past_an_obstacle() {
        let mut world = floor_world(8, 8);
        // A pillar right on the inside of the only turn.
        world.fill_box(
            VoxelCoord::new(2, 1, 1),
            VoxelCoord::new(2, 3, 1),
            VoxelType::Stone,
        );
        world.fill_box(
            VoxelCoord::new(3, 1, 0),
            VoxelCoord::new(3, 3, 2),
            VoxelType::Stone,
        );
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let start = VoxelCoord::new(1, 1, 1);
        let dest = VoxelCoord::new(2, 1, 2);
        let mut path = Path::new(LocomotionKind::Walker, start, [dest]);
        let (visited, end) = walk(&mut path, &mut nav, &world, &config);
        assert_eq!(end, PathStep::Arrived);
        assert_eq!(visited, vec![VoxelCoord::new(1, 1, 2), dest]);
    }

    #[test]
    fn picks_a_reachable_destination_among_several() {
        let mut world = floor_world(16, 8);
        // Sealed pocket around (14, 1, 6).
        world.fill_box(
            VoxelCoord::new(12, 1, 4),
            VoxelCoord::new(15, 3, 7),
            VoxelType::Stone,
        );
        world.set(VoxelCoord::new(14, 1, 6), VoxelType::Air);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let reachable = VoxelCoord::new(5, 1, 5);
        let mut path = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(1, 1, 1),
            [VoxelCoord::new(14, 1, 6), reachable],
        );
        let (visited, end) = walk(&mut path, &mut nav, &world, &config);
        assert_eq!(end, PathStep::Arrived);
        assert_eq!(visited.last(), Some(&reachable));
    }

    #[test]
    fn stale_plan_replans_around_new_wall() {
        let mut world = floor_world(16, 16);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let dest = VoxelCoord::new(14, 1, 4);
        let mut path = Path::new(LocomotionKind::Walker, VoxelCoord::new(1, 1, 4), [dest]);
        assert!(
            matches!(path.advance(&mut nav, &world, &config), PathStep::Step(_))
        );

        world.fill_box(
            VoxelCoord::new(8, 1, 0),
            VoxelCoord::new(8, 3, 12),
            VoxelType::Stone,
        );
        nav.invalidate_region(VoxelCoord::new(8, 1, 0), VoxelCoord::new(8, 3, 12));

        let (visited, end) = walk(&mut path, &mut nav, &world, &config);
        assert_eq!(end, PathStep::Arrived);
        assert!(visited.iter().all(|&v| !world.get(v).is_solid()));
        // Had to go around the end of the wall.
        assert!(visited.iter().any(|v| v.z > 12));
    }

    #[test]
    fn exists_rechecks_after_invalidation() {
        let mut world = floor_world(24, 8);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let mut path = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(2, 1, 3),
            [VoxelCoord::new(20, 1, 3)],
        );
        assert!(path.exists(&mut nav, &world, &config));

        world.fill_box(
            VoxelCoord::new(12, 1, 0),
            VoxelCoord::new(12, 3, 7),
            VoxelType::Stone,
        );
        nav.invalidate_region(VoxelCoord::new(12, 1, 0), VoxelCoord::new(12, 3, 7));
        assert!(!path.exists(&mut nav, &world, &config));
        assert_eq!(path.estimated_cost(&mut nav, &world, &config), None);

        world.fill_box(
            VoxelCoord::new(12, 1, 3),
            VoxelCoord::new(12, 3, 3),
            VoxelType::Air,
        );
        nav.invalidate_region(VoxelCoord::new(12, 1, 3), VoxelCoord::new(12, 3, 3));
        assert!(path.exists(&mut nav, &world, &config));
        assert!(path.estimated_cost(&mut nav, &world, &config).is_some());
    }

    #[test]
    fn solid_endpoints_do_not_scan_their_cells() {
        let world = floor_world(24, 8);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);

        let mut buried = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(20, 0, 3),
            [VoxelCoord::new(2, 1, 3)],
        );
        assert!(!buried.exists(&mut nav, &world, &config));
        assert_eq!(nav.scan_count(), 0);

        let mut path = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(2, 1, 3),
            [VoxelCoord::new(20, 0, 3), VoxelCoord::new(5, 1, 3)],
        );
        assert!(path.exists(&mut nav, &world, &config));

        // The solid destination costs no more scans than leaving it out.
        let mut fresh = map(LocomotionKind::Walker);
        let mut open_only = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(2, 1, 3),
            [VoxelCoord::new(5, 1, 3)],
        );
        assert!(open_only.exists(&mut fresh, &world, &config));
        assert_eq!(nav.scan_count(), fresh.scan_count());
    }

    #[test]
    fn restart_keeps_destinations() {
        let world = floor_world(16, 16);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let dest = VoxelCoord::new(12, 1, 12);
        let mut path = Path::new(LocomotionKind::Walker, VoxelCoord::new(1, 1, 1), [dest]);
        assert!(path.exists(&mut nav, &world, &config));

        assert!(
            path.restart(VoxelCoord::new(10, 1, 3), &mut nav, &world, &config)
        );
        assert_eq!(path.destinations(), &[dest]);
        let (visited, end) = walk(&mut path, &mut nav, &world, &config);
        assert_eq!(end, PathStep::Arrived);
        assert!(visited.iter().all(|v| v.x >= 8));

        // Restarting inside solid rock finds nothing.
        assert!(
            !path.restart(VoxelCoord::new(4, 0, 4), &mut nav, &world, &config)
        );
        assert_eq!(path.advance(&mut nav, &world, &config), PathStep::Blocked);
    }

    #[test]
    fn coarse_overflow_counts_as_missing() {
        let world = floor_world(32, 32);
        let config = NavConfig {
            coarse_open_limit: 2,
            ..NavConfig::default()
        };
        let mut nav = map(LocomotionKind::Walker);
        let mut path = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(1, 1, 1),
            [VoxelCoord::new(30, 1, 30)],
        );
        assert!(!path.exists(&mut nav, &world, &config));
    }

    #[test]
    fn estimated_cost_is_at_least_straight_line() {
        let world = floor_world(24, 8);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Walker);
        let start = VoxelCoord::new(1, 1, 3);
        let dest = VoxelCoord::new(21, 1, 3);
        let mut path = Path::new(LocomotionKind::Walker, start, [dest]);
        let cost = path.estimated_cost(&mut nav, &world, &config).unwrap();
        assert!(cost >= start.distance(dest) - 0.01, "cost {cost}");
        assert!(cost < start.distance(dest) * 2.0, "cost {cost}");
    }

    #[test]
    fn wrong_map_kind_finds_nothing() {
        let world = floor_world(8, 8);
        let config = NavConfig::default();
        let mut nav = map(LocomotionKind::Flyer);
        let mut path = Path::new(
            LocomotionKind::Walker,
            VoxelCoord::new(1, 1, 1),
            [VoxelCoord::new(3, 1, 3)],
        );
        assert!(!path.exists(&mut nav, &world, &config));
    }

    #[test]
    fn corner_detection() {
        let a = VoxelCoord::new(0, 1, 0);
        assert!(
            is_corner(a, VoxelCoord::new(1, 1, 0), VoxelCoord::new(1, 1, 1))
        );
        assert!(
            !is_corner(a, VoxelCoord::new(1, 1, 0), VoxelCoord::new(2, 1, 0))
        );
        assert!(
            !is_corner(a, VoxelCoord::new(1, 1, 0), VoxelCoord::new(1, 2, 0))
        );
    }
}
