// Spatial connectivity map over the voxel world.
//
// The world is divided into 8x8x8 `NavCell`s, created lazily on first access.
// Scanning a cell partitions its passable voxels (under one `Locomotion`)
// into `Component`s: maximal sets of voxels that can reach each other without
// leaving the cell. Components are the nodes of the coarse path graph in
// `path.rs`.
//
// ## Scanning
//
// `scan` computes every voxel's cost once, then runs union-find over a flat
// `Vec<u16>` parent array sized to the cell (no per-voxel allocation). A
// voxel is unioned with each lower-indexed in-cell neighbour when the step is
// finite in both directions, so a component always means *mutual*
// reachability even for asymmetric locomotions. Moves that leave the cell are
// recorded as portals on the voxel's component, one `Link` per movement
// direction. Roots are always the lowest voxel index in their set, so
// components are numbered in first-voxel order.
//
// ## Adjacency and invalidation
//
// `find_adjacent_components` resolves a link's portals against the
// neighbouring cells and caches the result on the link. Because the cache
// lives on the owning cell but depends on neighbour content,
// `invalidate_region` clears caches on both sides: cells inside the region go
// dirty (their previous component table is kept only for `probe_component`),
// and cells just outside drop the link caches for every direction that can
// reach into the region. Dirty cells are rescanned by the next mutating
// query that touches them.
//
// ## Partitions
//
// A partition is a global tag shared by components that can reach each
// other across cells. `compute_partitions` floods outward from seed
// components only when a query needs the answer. Each seed runs its own FIFO
// frontier; when a frontier reaches a component another frontier already
// stamped, the first one there wins, the later one is deactivated, its
// partition id is aliased to the winner, and its queued work is handed to the
// winner so the winner's flood stays complete. Any invalidation bumps the
// partition epoch, which unsets every stamp in O(1).
//
// See also: `locomotion.rs` for the cost functions, `path.rs` for the
// two-level search over this map, `registry.rs` for one map per locomotion.
//
// **Critical constraint: determinism.** Cells are looked up by coordinate,
// never iterated in hash order. Component numbering, portal order and
// adjacency order all follow voxel index order.

use crate::locomotion::{IMPASSABLE, Locomotion};
use crate::types::{CELL_VOLUME, CellCoord, ComponentRef, LocomotionKind, PartitionId, VoxelCoord};
use crate::world::WorldQuery;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::VecDeque;

const NO_COMPONENT: u16 = u16::MAX;

/// Speculative lookup result from `probe_component`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    Found(ComponentRef),
    Impassable,
    /// The cell needs a rescan to answer.
    Unknown,
}

#[derive(Clone, Copy, Debug)]
struct PartitionStamp {
    epoch: u32,
    id: u32,
}

/// Boundary voxels of a component in one movement direction, and the cached
/// neighbouring components reachable through them.
#[derive(Clone, Debug, Default)]
struct Link {
    portals: SmallVec<[VoxelCoord; 8]>,
    adjacent: Option<SmallVec<[ComponentRef; 4]>>,
}

/// A maximal set of mutually reachable voxels within one cell.
#[derive(Clone, Debug)]
pub struct Component {
    pub id: u16,
    /// Lowest-index voxel of the component.
    pub sample: VoxelCoord,
    pub voxel_count: u32,
    /// Centroid of the component's voxel centers; coarse search measures
    /// distances between anchors.
    pub anchor: [f32; 3],
    links: Vec<Link>,
    partition: Option<PartitionStamp>,
}

impl Component {
    /// Portal voxels for movement direction `dir` (index into `moves()`).
    pub fn portals(&self, dir: usize) -> &[VoxelCoord] {
        self.links
            .get(dir)
            .map(|l| l.portals.as_slice())
            .unwrap_or_default()
    }
}

/// One 8x8x8 region of the map.
#[derive(Clone, Debug)]
pub struct NavCell {
    pub coord: CellCoord,
    dirty: bool,
    components: Vec<Component>,
    /// Component id per voxel index, `NO_COMPONENT` for impassable voxels.
    voxel_component: Vec<u16>,
}

impl NavCell {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    fn lookup(&self, pos: VoxelCoord) -> Option<ComponentRef> {
        let index = self.coord.local_index(pos)?;
        match self.voxel_component[index] {
            NO_COMPONENT => None,
            local => Some(ComponentRef {
                cell: self.coord,
                local,
            }),
        }
    }

    fn clear_link_caches(&mut self, dir: Option<usize>) {
        for comp in &mut self.components {
            match dir {
                Some(d) => {
                    if let Some(link) = comp.links.get_mut(d) {
                        link.adjacent = None;
                    }
                }
                None => {
                    for link in &mut comp.links {
                        link.adjacent = None;
                    }
                }
            }
        }
    }
}

/// Per-frontier bookkeeping for `compute_partitions`.
struct Frontier {
    partition: u32,
    active: bool,
    pending: usize,
    merged_into: Option<usize>,
}

/// Connectivity map for one locomotion.
pub struct NavMap {
    locomotion: Box<dyn Locomotion>,
    /// `opposite[d]` is the index of the move that undoes move `d`.
    opposite: Vec<usize>,
    cells: FxHashMap<CellCoord, NavCell>,
    revision: u64,
    partition_epoch: u32,
    /// Alias forest over partition ids of the current epoch.
    partition_parent: Vec<u32>,
    probe_limit: usize,
    scan_count: u64,
}

impl NavMap {
    pub fn new(locomotion: Box<dyn Locomotion>, probe_limit: usize) -> Self {
        let moves = locomotion.moves();
        let opposite = moves
            .iter()
            .map(|&m| {
                let neg = VoxelCoord::default() - m;
                moves.iter().position(|&o| o == neg).unwrap_or_else(|| {
                    tracing::error!(?m, "locomotion move set is not closed under negation");
                    usize::MAX
                })
            })
            .collect();
        Self {
            locomotion,
            opposite,
            cells: FxHashMap::default(),
            revision: 0,
            partition_epoch: 0,
            partition_parent: Vec::new(),
            probe_limit,
            scan_count: 0,
        }
    }

    pub fn kind(&self) -> LocomotionKind {
        self.locomotion.kind()
    }

    pub fn locomotion(&self) -> &dyn Locomotion {
        self.locomotion.as_ref()
    }

    /// Number of movement directions (and links per component).
    pub fn direction_count(&self) -> usize {
        self.locomotion.moves().len()
    }

    /// Index of the move opposite to `dir`.
    pub fn opposite(&self, dir: usize) -> usize {
        self.opposite[dir]
    }

    /// Bumped by every invalidation. Handles and plans taken at an older
    /// revision may refer to rescanned cells.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of cell scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    pub fn cell(&self, coord: CellCoord) -> Option<&NavCell> {
        self.cells.get(&coord)
    }

    /// Drop every cell and partition. Used at world/session boundaries.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.partition_parent.clear();
        self.partition_epoch = self.partition_epoch.wrapping_add(1);
        self.revision += 1;
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    /// Rebuild the components of `coord` from current world content.
    pub fn scan(&mut self, world: &dyn WorldQuery, coord: CellCoord) {
        let cell = build_cell(self.locomotion.as_ref(), world, coord);
        tracing::trace!(
            cell = %coord,
            components = cell.components.len(),
            kind = ?self.locomotion.kind(),
            "scanned nav cell"
        );
        self.scan_count += 1;
        self.cells.insert(coord, cell);
    }

    /// Scan `coord` if it has never been scanned or has been invalidated.
    fn ensure_scanned(&mut self, world: &dyn WorldQuery, coord: CellCoord) {
        let needs_scan = self.cells.get(&coord).is_none_or(|c| c.dirty);
        if needs_scan {
            self.scan(world, coord);
        }
    }

    /// Components of `coord`, scanning it first if needed.
    pub fn components_in(&mut self, world: &dyn WorldQuery, coord: CellCoord) -> &[Component] {
        self.ensure_scanned(world, coord);
        self.cells
            .get(&coord)
            .map(|c| c.components.as_slice())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Component lookup
    // -----------------------------------------------------------------------

    /// The component containing `pos`, rescanning its cell if needed.
    /// `None` if the voxel is impassable.
    pub fn find_component(
        &mut self,
        world: &dyn WorldQuery,
        pos: VoxelCoord,
    ) -> Option<ComponentRef> {
        let coord = CellCoord::containing(pos);
        self.ensure_scanned(world, coord);
        self.cells.get(&coord)?.lookup(pos)
    }

    /// Component data for a handle in a clean cell.
    pub fn component(&self, r: ComponentRef) -> Option<&Component> {
        let cell = self.cells.get(&r.cell)?;
        if cell.dirty {
            return None;
        }
        cell.components.get(r.local as usize)
    }

    /// Look up `pos` without rescanning. In a dirty cell, run a bounded BFS
    /// through current world content toward the samples of the cell's
    /// previous components. Path planning uses this to drop solid endpoints
    /// before paying for a scan.
    pub fn probe_component(&self, world: &dyn WorldQuery, pos: VoxelCoord) -> Probe {
        let loco = self.locomotion.as_ref();
        if !loco.is_passable(world, pos) {
            return Probe::Impassable;
        }
        let coord = CellCoord::containing(pos);
        let Some(cell) = self.cells.get(&coord) else {
            return Probe::Unknown;
        };
        if !cell.dirty {
            return cell.lookup(pos).map_or(Probe::Impassable, Probe::Found);
        }

        let mut visited: SmallVec<[VoxelCoord; 64]> = SmallVec::new();
        let mut queue = VecDeque::new();
        queue.push_back(pos);
        visited.push(pos);
        while let Some(v) = queue.pop_front() {
            if let Some(comp) = cell.components.iter().find(|c| c.sample == v) {
                return Probe::Found(ComponentRef {
                    cell: coord,
                    local: comp.id,
                });
            }
            for &m in loco.moves() {
                let next = v + m;
                if coord.local_index(next).is_none() || visited.contains(&next) {
                    continue;
                }
                if visited.len() >= self.probe_limit {
                    return Probe::Unknown;
                }
                if loco.transition_cost(world, v, next).is_finite() {
                    visited.push(next);
                    queue.push_back(next);
                }
            }
        }
        Probe::Unknown
    }

    /// Neighbouring components reachable through `r`'s portals in direction
    /// `dir`. Cached on the link until a neighbour cell is invalidated.
    pub fn find_adjacent_components(
        &mut self,
        world: &dyn WorldQuery,
        r: ComponentRef,
        dir: usize,
    ) -> SmallVec<[ComponentRef; 4]> {
        self.ensure_scanned(world, r.cell);
        let (portals, cached) = match self
            .cells
            .get(&r.cell)
            .and_then(|c| c.components.get(r.local as usize))
            .and_then(|comp| comp.links.get(dir))
        {
            Some(link) => (link.portals.clone(), link.adjacent.clone()),
            None => return SmallVec::new(),
        };
        if let Some(adjacent) = cached {
            return adjacent;
        }

        let step = self.locomotion.moves()[dir];
        let mut adjacent: SmallVec<[ComponentRef; 4]> = SmallVec::new();
        for p in portals {
            let q = p + step;
            let q_cell = CellCoord::containing(q);
            self.ensure_scanned(world, q_cell);
            let Some(found) = self.cells.get(&q_cell).and_then(|c| c.lookup(q)) else {
                continue;
            };
            if adjacent.contains(&found) {
                continue;
            }
            let loco = self.locomotion.as_ref();
            if loco.transition_cost(world, p, q).is_finite()
                && loco.transition_cost(world, q, p).is_finite()
            {
                adjacent.push(found);
            }
        }

        if let Some(link) = self
            .cells
            .get_mut(&r.cell)
            .and_then(|c| c.components.get_mut(r.local as usize))
            .and_then(|comp| comp.links.get_mut(dir))
        {
            link.adjacent = Some(adjacent.clone());
        }
        adjacent
    }

    /// All neighbouring components of `r`, over every direction, deduplicated.
    pub fn neighbors(&mut self, world: &dyn WorldQuery, r: ComponentRef) -> Vec<ComponentRef> {
        let mut out = Vec::new();
        for dir in 0..self.direction_count() {
            for adj in self.find_adjacent_components(world, r, dir) {
                if !out.contains(&adj) {
                    out.push(adj);
                }
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    /// Mark every cell overlapping the voxel box `[min, max]`, grown by the
    /// locomotion's influence radius, dirty and drop the adjacency caches
    /// that depend on them.
    pub fn invalidate_region(&mut self, min: VoxelCoord, max: VoxelCoord) {
        let r = self.locomotion.influence_radius().max(0);
        let pad = VoxelCoord::new(r, r, r);
        let lo = CellCoord::containing(min.min(max) - pad);
        let hi = CellCoord::containing(min.max(max) + pad);
        let inside = |c: CellCoord| {
            (lo.x..=hi.x).contains(&c.x)
                && (lo.y..=hi.y).contains(&c.y)
                && (lo.z..=hi.z).contains(&c.z)
        };

        let mut dirtied = 0usize;
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                for x in lo.x..=hi.x {
                    if let Some(cell) = self.cells.get_mut(&CellCoord::new(x, y, z)) {
                        cell.dirty = true;
                        cell.clear_link_caches(None);
                        dirtied += 1;
                    }
                }
            }
        }

        // Cells just outside the region whose links point into it.
        let moves: Vec<VoxelCoord> = self.locomotion.moves().to_vec();
        for y in lo.y - 1..=hi.y + 1 {
            for z in lo.z - 1..=hi.z + 1 {
                for x in lo.x - 1..=hi.x + 1 {
                    let coord = CellCoord::new(x, y, z);
                    if inside(coord) {
                        continue;
                    }
                    let Some(cell) = self.cells.get_mut(&coord) else {
                        continue;
                    };
                    if cell.dirty {
                        continue;
                    }
                    for (dir, &m) in moves.iter().enumerate() {
                        if reachable_cells(coord, m).any(inside) {
                            cell.clear_link_caches(Some(dir));
                        }
                    }
                }
            }
        }

        self.revision += 1;
        self.partition_epoch = self.partition_epoch.wrapping_add(1);
        self.partition_parent.clear();
        tracing::debug!(
            %min,
            %max,
            dirtied,
            revision = self.revision,
            kind = ?self.locomotion.kind(),
            "invalidated nav region"
        );
    }

    // -----------------------------------------------------------------------
    // Partitions
    // -----------------------------------------------------------------------

    /// Partition of `r`, if it has been computed in the current epoch.
    pub fn partition_of(&self, r: ComponentRef) -> Option<PartitionId> {
        let stamp = self.component(r)?.partition?;
        if stamp.epoch != self.partition_epoch {
            return None;
        }
        Some(PartitionId(self.resolve_partition(stamp.id)))
    }

    /// Whether `a` and `b` can reach each other, computing partitions as
    /// needed.
    pub fn same_partition(
        &mut self,
        world: &dyn WorldQuery,
        a: ComponentRef,
        b: ComponentRef,
    ) -> bool {
        self.compute_partitions(world, &[a, b]);
        match (self.partition_of(a), self.partition_of(b)) {
            (Some(pa), Some(pb)) => pa == pb,
            _ => false,
        }
    }

    /// Flood-fill partitions outward from `seeds`. Seeds that already carry
    /// a partition are skipped, so repeated calls are cheap.
    pub fn compute_partitions(&mut self, world: &dyn WorldQuery, seeds: &[ComponentRef]) {
        let mut frontiers: Vec<Frontier> = Vec::new();
        let mut frontier_of: FxHashMap<u32, usize> = FxHashMap::default();
        let mut queue: VecDeque<(ComponentRef, usize)> = VecDeque::new();

        for &seed in seeds {
            if self.component(seed).is_none() || self.partition_of(seed).is_some() {
                continue;
            }
            if queue.iter().any(|&(queued, _)| queued == seed) {
                continue;
            }
            let id = self.new_partition();
            frontier_of.insert(id, frontiers.len());
            queue.push_back((seed, frontiers.len()));
            frontiers.push(Frontier {
                partition: id,
                active: true,
                pending: 1,
                merged_into: None,
            });
        }
        if frontiers.is_empty() {
            return;
        }

        let mut stamped = 0usize;
        while let Some((comp, queued_by)) = queue.pop_front() {
            let f = root_frontier(&frontiers, queued_by);
            if !frontiers[f].active {
                continue;
            }
            frontiers[f].pending = frontiers[f].pending.saturating_sub(1);
            let mine = self.resolve_partition(frontiers[f].partition);

            match self.partition_of(comp) {
                Some(PartitionId(p)) if p == mine => {}
                Some(PartitionId(p)) => {
                    // Someone got here first: alias to the winner and hand
                    // over our remaining work if the winner is still flooding.
                    self.partition_parent[mine as usize] = p;
                    let winner = frontier_of
                        .get(&p)
                        .map(|&w| root_frontier(&frontiers, w))
                        .filter(|&w| w != f && frontiers[w].active);
                    let leftover = frontiers[f].pending;
                    frontiers[f].active = false;
                    frontiers[f].pending = 0;
                    if let Some(w) = winner {
                        frontiers[f].merged_into = Some(w);
                        frontiers[w].pending += leftover;
                    }
                    tracing::trace!(loser = mine, winner = p, "partition frontiers merged");
                }
                None => {
                    self.stamp_partition(comp, frontiers[f].partition);
                    stamped += 1;
                    for adj in self.neighbors(world, comp) {
                        if self.partition_of(adj) != Some(PartitionId(mine)) {
                            queue.push_back((adj, f));
                            frontiers[f].pending += 1;
                        }
                    }
                }
            }

            if frontiers[f].pending == 0 {
                frontiers[f].active = false;
            }
        }
        tracing::trace!(
            seeds = seeds.len(),
            frontiers = frontiers.len(),
            stamped,
            "computed partitions"
        );
    }

    fn new_partition(&mut self) -> u32 {
        let id = self.partition_parent.len() as u32;
        self.partition_parent.push(id);
        id
    }

    fn resolve_partition(&self, mut id: u32) -> u32 {
        while let Some(&parent) = self.partition_parent.get(id as usize) {
            if parent == id {
                break;
            }
            id = parent;
        }
        id
    }

    fn stamp_partition(&mut self, r: ComponentRef, id: u32) {
        let epoch = self.partition_epoch;
        if let Some(comp) = self
            .cells
            .get_mut(&r.cell)
            .and_then(|c| c.components.get_mut(r.local as usize))
        {
            comp.partition = Some(PartitionStamp { epoch, id });
        }
    }
}

fn root_frontier(frontiers: &[Frontier], mut f: usize) -> usize {
    while let Some(next) = frontiers[f].merged_into {
        f = next;
    }
    f
}

/// Cells a move `m` out of `coord` can land in: every non-zero combination of
/// `{0, sign(m.axis)}` per axis.
fn reachable_cells(coord: CellCoord, m: VoxelCoord) -> impl Iterator<Item = CellCoord> {
    let choices = |v: i32| if v == 0 { vec![0] } else { vec![0, v.signum()] };
    let xs = choices(m.x);
    let ys = choices(m.y);
    let zs = choices(m.z);
    let mut out = Vec::new();
    for &dx in &xs {
        for &dy in &ys {
            for &dz in &zs {
                if (dx, dy, dz) != (0, 0, 0) {
                    out.push(coord.offset(dx, dy, dz));
                }
            }
        }
    }
    out.into_iter()
}

fn find_root(parent: &mut [u16], mut i: usize) -> usize {
    while parent[i] as usize != i {
        let grand = parent[parent[i] as usize];
        parent[i] = grand;
        i = grand as usize;
    }
    i
}

fn union(parent: &mut [u16], a: usize, b: usize) {
    let ra = find_root(parent, a);
    let rb = find_root(parent, b);
    if ra != rb {
        // Lower index becomes the root so roots are first voxels.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo as u16;
    }
}

/// Scan one cell into a fresh `NavCell`.
fn build_cell(loco: &dyn Locomotion, world: &dyn WorldQuery, coord: CellCoord) -> NavCell {
    let moves = loco.moves();
    let mut cost = vec![IMPASSABLE; CELL_VOLUME];
    for (i, c) in cost.iter_mut().enumerate() {
        *c = loco.voxel_cost(world, coord.voxel_at(i));
    }

    let mut parent: Vec<u16> = (0..CELL_VOLUME as u16).collect();
    let mut portals: Vec<(u16, u8)> = Vec::new();
    for i in 0..CELL_VOLUME {
        if cost[i].is_infinite() {
            continue;
        }
        let pos = coord.voxel_at(i);
        for (dir, &m) in moves.iter().enumerate() {
            let q = pos + m;
            match coord.local_index(q) {
                Some(j) => {
                    if j < i
                        && cost[j].is_finite()
                        && loco.transition_cost(world, pos, q).is_finite()
                        && loco.transition_cost(world, q, pos).is_finite()
                    {
                        union(&mut parent, i, j);
                    }
                }
                None => portals.push((i as u16, dir as u8)),
            }
        }
    }

    let mut voxel_component = vec![NO_COMPONENT; CELL_VOLUME];
    let mut components: Vec<Component> = Vec::new();
    let mut sums: Vec<[f32; 3]> = Vec::new();
    for i in 0..CELL_VOLUME {
        if cost[i].is_infinite() {
            continue;
        }
        let root = find_root(&mut parent, i);
        let local = if root == i {
            let id = components.len() as u16;
            components.push(Component {
                id,
                sample: coord.voxel_at(i),
                voxel_count: 0,
                anchor: [0.0; 3],
                links: vec![Link::default(); moves.len()],
                partition: None,
            });
            sums.push([0.0; 3]);
            id
        } else {
            voxel_component[root]
        };
        voxel_component[i] = local;
        let center = coord.voxel_at(i).center();
        let comp = &mut components[local as usize];
        comp.voxel_count += 1;
        for axis in 0..3 {
            sums[local as usize][axis] += center[axis];
        }
    }
    for (comp, sum) in components.iter_mut().zip(&sums) {
        let n = comp.voxel_count as f32;
        comp.anchor = [sum[0] / n, sum[1] / n, sum[2] / n];
    }

    for (voxel, dir) in portals {
        let local = voxel_component[voxel as usize];
        components[local as usize].links[dir as usize]
            .portals
            .push(coord.voxel_at(voxel as usize));
    }

    NavCell {
        coord,
        dirty: false,
        components,
        voxel_component,
    }
}

/// Euclidean distance between two anchors.
pub fn anchor_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}
