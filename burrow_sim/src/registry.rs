// One nav map per locomotion kind.
//
// Connectivity depends on how an agent moves, so every `LocomotionKind` in
// use gets its own `NavMap`. `NavRegistry` owns them, keyed in a `BTreeMap`
// so iteration (invalidation, `kinds()`) has a fixed order. It is owned by
// `SimState` and lent to tasks through `TaskContext`; there are no
// process-wide maps.
//
// See also: `nav.rs` for the map itself, `path.rs` for searches over it,
// `sim.rs` which forwards world edits to `invalidate_region`.

use crate::config::NavConfig;
use crate::locomotion::{Locomotion, builtin};
use crate::nav::NavMap;
use crate::path::Path;
use crate::types::{LocomotionKind, VoxelCoord};
use crate::world::WorldQuery;
use std::collections::BTreeMap;

pub struct NavRegistry {
    maps: BTreeMap<LocomotionKind, NavMap>,
    probe_limit: usize,
}

impl NavRegistry {
    pub fn new(config: &NavConfig) -> Self {
        Self {
            maps: BTreeMap::new(),
            probe_limit: config.probe_limit,
        }
    }

    /// Registry with the built-in locomotion for each of `kinds`.
    pub fn with_builtins(kinds: &[LocomotionKind], config: &NavConfig) -> Self {
        let mut registry = Self::new(config);
        for &kind in kinds {
            registry.register(builtin(kind));
        }
        registry
    }

    /// Add a map for `locomotion`, replacing (and returning) any existing map
    /// of the same kind.
    pub fn register(&mut self, locomotion: Box<dyn Locomotion>) -> Option<NavMap> {
        let kind = locomotion.kind();
        tracing::debug!(?kind, "registered nav map");
        self.maps
            .insert(kind, NavMap::new(locomotion, self.probe_limit))
    }

    pub fn get(&self, kind: LocomotionKind) -> Option<&NavMap> {
        self.maps.get(&kind)
    }

    pub fn get_mut(&mut self, kind: LocomotionKind) -> Option<&mut NavMap> {
        self.maps.get_mut(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = LocomotionKind> + '_ {
        self.maps.keys().copied()
    }

    /// Forward a world change to every map.
    pub fn invalidate_region(&mut self, min: VoxelCoord, max: VoxelCoord) {
        for map in self.maps.values_mut() {
            map.invalidate_region(min, max);
        }
    }

    /// Forget all cached connectivity, e.g. when a new world is loaded.
    pub fn reset(&mut self) {
        for map in self.maps.values_mut() {
            map.reset();
        }
    }

    /// Whether any registered locomotion can occupy `pos`.
    pub fn is_standable(&self, world: &dyn WorldQuery, pos: VoxelCoord) -> bool {
        self.maps
            .values()
            .any(|m| m.locomotion().is_passable(world, pos))
    }

    /// Build and plan a path. An unregistered kind yields a path that does
    /// not exist.
    pub fn find_path(
        &mut self,
        world: &dyn WorldQuery,
        config: &NavConfig,
        kind: LocomotionKind,
        source: VoxelCoord,
        destinations: impl IntoIterator<Item = VoxelCoord>,
    ) -> Path {
        let Some(map) = self.maps.get_mut(&kind) else {
            tracing::error!(?kind, "no nav map registered for locomotion");
            return Path::unreachable(kind, source, destinations);
        };
        let mut path = Path::new(kind, source, destinations);
        path.exists(map, world, config);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{VoxelType, VoxelWorld};

    fn floor_world() -> VoxelWorld {
        let mut world = VoxelWorld::new(16, 8, 16);
        world.fill_box(
            VoxelCoord::new(0, 0, 0),
            VoxelCoord::new(15, 0, 15),
            VoxelType::Stone,
        );
        world
    }

    #[test]
    fn builtins_register_one_map_per_kind() {
        let config = NavConfig::default();
        let registry = NavRegistry::with_builtins(
            &[LocomotionKind::Flyer, LocomotionKind::Walker],
            &config,
        );
        let kinds: Vec<_> = registry.kinds().collect();
        assert_eq!(kinds, vec![LocomotionKind::Walker, LocomotionKind::Flyer]);
        assert!(registry.get(LocomotionKind::Climber).is_none());
    }

    #[test]
    fn flyer_reaches_where_walker_cannot() {
        let world = floor_world();
        let config = NavConfig::default();
        let mut registry = NavRegistry::with_builtins(
            &[LocomotionKind::Walker, LocomotionKind::Flyer],
            &config,
        );
        let high = VoxelCoord::new(10, 5, 10);
        let start = VoxelCoord::new(1, 1, 1);
        let mut walk = registry.find_path(&world, &config, LocomotionKind::Walker, start, [high]);
        let mut fly = registry.find_path(&world, &config, LocomotionKind::Flyer, start, [high]);
        let walker_map = registry.get_mut(LocomotionKind::Walker).unwrap();
        assert!(!walk.exists(walker_map, &world, &config));
        let flyer_map = registry.get_mut(LocomotionKind::Flyer).unwrap();
        assert!(fly.exists(flyer_map, &world, &config));
    }

    #[test]
    fn invalidation_reaches_every_map() {
        let mut world = floor_world();
        let config = NavConfig::default();
        let mut registry = NavRegistry::with_builtins(
            &[LocomotionKind::Walker, LocomotionKind::Flyer],
            &config,
        );
        let a = VoxelCoord::new(2, 1, 2);
        let b = VoxelCoord::new(13, 1, 13);
        registry.find_path(&world, &config, LocomotionKind::Walker, a, [b]);
        registry.find_path(&world, &config, LocomotionKind::Flyer, a, [b]);
        let before: Vec<u64> = registry
            .kinds()
            .filter_map(|k| registry.get(k).map(|m| m.revision()))
            .collect();

        world.set(VoxelCoord::new(5, 1, 5), VoxelType::Stone);
        registry.invalidate_region(VoxelCoord::new(5, 1, 5), VoxelCoord::new(5, 1, 5));
        for (kind, old) in registry.kinds().zip(before) {
            assert!(registry.get(kind).unwrap().revision() > old, "{kind:?}");
        }
    }

    #[test]
    fn unregistered_kind_has_no_path() {
        let world = floor_world();
        let config = NavConfig::default();
        let mut registry = NavRegistry::new(&config);
        let path = registry.find_path(
            &world,
            &config,
            LocomotionKind::Climber,
            VoxelCoord::new(1, 1, 1),
            [VoxelCoord::new(2, 1, 1)],
        );
        assert_eq!(path.coarse_len(), 0);
        assert!(!registry.is_standable(&world, VoxelCoord::new(1, 1, 1)));
    }
}
