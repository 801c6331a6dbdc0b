// Work range tables: where a worker has to stand to do a kind of work.
//
// Each `WorkKind` maps to a `WorkRange`: the offsets (relative to the target
// voxel) a worker may stand on while working, plus how many work units the
// job takes by default. Tasks turn a target into candidate worker positions
// with `CapabilityTable::worker_positions` and path to any of them.
//
// The table is plain data and lives in `SimConfig`, so ranges can be tuned
// from JSON like any other parameter.
//
// See also: `work.rs` for `WorkTask`, which consumes these tables,
// `config.rs` for loading.

use crate::types::VoxelCoord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kinds of work an agent can perform at a target voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkKind {
    /// Remove a solid voxel.
    Dig,
    /// Fill an open voxel.
    Build,
    /// Work a device at the target without changing the world.
    Operate,
    /// Tend to whoever is at the target.
    Heal,
}

/// Positions and effort for one kind of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkRange {
    /// Worker position = target + offset.
    pub offsets: Vec<VoxelCoord>,
    /// Work units needed to finish one job.
    pub work_units: f32,
}

/// Work ranges keyed by `WorkKind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityTable {
    pub ranges: BTreeMap<WorkKind, WorkRange>,
}

const HORIZONTAL: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

fn ring(dy: i32) -> impl Iterator<Item = VoxelCoord> {
    HORIZONTAL
        .iter()
        .map(move |&(dx, dz)| VoxelCoord::new(dx, dy, dz))
}

impl Default for CapabilityTable {
    fn default() -> Self {
        let mut ranges = BTreeMap::new();
        // Diggers work from beside the target, from one level up or down
        // beside it, or from directly above.
        let dig: Vec<VoxelCoord> = ring(0)
            .chain(ring(1))
            .chain(ring(-1))
            .chain([VoxelCoord::new(0, 1, 0)])
            .collect();
        ranges.insert(
            WorkKind::Dig,
            WorkRange {
                offsets: dig,
                work_units: 3.0,
            },
        );
        ranges.insert(
            WorkKind::Build,
            WorkRange {
                offsets: ring(0).chain(ring(1)).collect(),
                work_units: 4.0,
            },
        );
        ranges.insert(
            WorkKind::Operate,
            WorkRange {
                offsets: ring(0).collect(),
                work_units: 2.0,
            },
        );
        ranges.insert(
            WorkKind::Heal,
            WorkRange {
                offsets: ring(0).chain([VoxelCoord::default()]).collect(),
                work_units: 5.0,
            },
        );
        Self { ranges }
    }
}

impl CapabilityTable {
    pub fn range(&self, kind: WorkKind) -> Option<&WorkRange> {
        self.ranges.get(&kind)
    }

    /// Default effort for `kind`; 0 if the kind has no entry.
    pub fn work_units(&self, kind: WorkKind) -> f32 {
        self.range(kind).map_or(0.0, |r| r.work_units)
    }

    /// Candidate worker positions around `target`, in table order.
    pub fn worker_positions(&self, kind: WorkKind, target: VoxelCoord) -> Vec<VoxelCoord> {
        self.range(kind)
            .map(|r| r.offsets.iter().map(|&o| target + o).collect())
            .unwrap_or_default()
    }

    /// Whether a worker at `worker` is in range of `target`.
    pub fn can_work_from(&self, kind: WorkKind, worker: VoxelCoord, target: VoxelCoord) -> bool {
        self.range(kind)
            .is_some_and(|r| r.offsets.contains(&(worker - target)))
    }
}
