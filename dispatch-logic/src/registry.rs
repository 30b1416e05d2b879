use std::collections::HashSet;

use log::debug;

use crate::{
    location::Location,
    services::MapSink,
    stop::{Stop, StopId},
};

/// What a stop with a location owns on the map: its marker and its routing waypoint
struct Pin<H> {
    marker: H,
    waypoint: Location,
}

struct Entry<H> {
    stop: Stop,
    pin: Option<Pin<H>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A structural change to the registry, returned by every mutation that changed something
pub enum RegistryChange {
    /// These stops were appended, in order
    Added(Vec<StopId>),
    Removed(StopId),
    Cleared,
}

/// Ordered set of pending stops along with their markers on `M`.
///
/// A stop, its marker and its waypoint live in the same entry, they can only be added or
/// removed together.
pub struct StopRegistry<M: MapSink> {
    entries: Vec<Entry<M::Marker>>,
}

impl<M: MapSink> Default for StopRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MapSink> StopRegistry<M> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append every candidate whose id isn't already present, placing markers for those with a
    /// location. Returns `None` if nothing was added.
    pub fn add_stops(
        &mut self,
        candidates: impl IntoIterator<Item = Stop>,
        map: &M,
    ) -> Option<RegistryChange> {
        let mut seen = self
            .entries
            .iter()
            .map(|e| e.stop.id.clone())
            .collect::<HashSet<_>>();

        let mut added = Vec::new();

        for stop in candidates {
            if !seen.insert(stop.id.clone()) {
                debug!("Dropping duplicate stop {}", stop.id);
                continue;
            }

            let pin = stop.location.map(|waypoint| Pin {
                marker: map.add_marker(&stop, waypoint),
                waypoint,
            });

            added.push(stop.id.clone());
            self.entries.push(Entry { stop, pin });
        }

        if added.is_empty() {
            None
        } else {
            Some(RegistryChange::Added(added))
        }
    }

    /// Remove the stop with `id` along with its marker and waypoint
    pub fn remove(&mut self, id: &StopId, map: &M) -> Option<RegistryChange> {
        let idx = self.entries.iter().position(|e| &e.stop.id == id)?;
        let entry = self.entries.remove(idx);

        if let Some(pin) = entry.pin {
            map.remove_marker(pin.marker);
        }

        Some(RegistryChange::Removed(entry.stop.id))
    }

    /// Remove every stop, releasing all markers
    pub fn clear(&mut self, map: &M) -> Option<RegistryChange> {
        if self.entries.is_empty() {
            return None;
        }

        for entry in self.entries.drain(..) {
            if let Some(pin) = entry.pin {
                map.remove_marker(pin.marker);
            }
        }

        Some(RegistryChange::Cleared)
    }

    /// All current stops in insertion order
    pub fn all(&self) -> impl Iterator<Item = &Stop> {
        self.entries.iter().map(|e| &e.stop)
    }

    pub fn get(&self, id: &StopId) -> Option<&Stop> {
        self.all().find(|s| &s.id == id)
    }

    /// Waypoints of every stop with a location, in insertion order
    pub fn waypoints(&self) -> Vec<Location> {
        self.entries
            .iter()
            .filter_map(|e| e.pin.as_ref().map(|p| p.waypoint))
            .collect()
    }

    /// Ids of the stops that currently own a marker and waypoint
    pub fn pinned(&self) -> impl Iterator<Item = &StopId> {
        self.entries
            .iter()
            .filter(|e| e.pin.is_some())
            .map(|e| &e.stop.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::tests::{RecordingMap, mk_stop};

    type TestRegistry = StopRegistry<Arc<RecordingMap>>;

    fn ids(registry: &TestRegistry) -> Vec<&str> {
        registry.all().map(|s| s.id.as_str()).collect()
    }

    /// Stops with a location, live markers and waypoints all line up
    fn assert_consistent(registry: &TestRegistry, map: &RecordingMap) {
        let with_location = registry
            .all()
            .filter(|s| s.has_location())
            .map(|s| s.id.clone())
            .collect::<HashSet<_>>();
        let pinned = registry.pinned().cloned().collect::<HashSet<_>>();
        let marked = map.marked_stops().into_iter().collect::<HashSet<_>>();

        assert_eq!(with_location, pinned, "Pinned stops don't match stops with a location");
        assert_eq!(with_location, marked, "Markers on the map don't match stops with a location");

        let expected_waypoints = registry
            .all()
            .filter_map(|s| s.location)
            .collect::<Vec<_>>();
        assert_eq!(registry.waypoints(), expected_waypoints);
    }

    #[test]
    fn test_add_dedups() {
        let map = Arc::new(RecordingMap::default());
        let mut registry = TestRegistry::new();

        let change = registry.add_stops([mk_stop("a", true), mk_stop("b", false)], &map);
        assert_eq!(
            change,
            Some(RegistryChange::Added(vec![StopId::new("a"), StopId::new("b")]))
        );

        let change = registry.add_stops([mk_stop("b", false), mk_stop("a", true)], &map);
        assert_eq!(change, None, "Re-adding the same stops changed the registry");

        let change = registry.add_stops([mk_stop("c", true), mk_stop("c", true)], &map);
        assert_eq!(change, Some(RegistryChange::Added(vec![StopId::new("c")])));

        assert_eq!(ids(&registry), ["a", "b", "c"]);
        assert_eq!(map.marker_count(), 2);
        assert_consistent(&registry, &map);
    }

    #[test]
    fn test_remove_stop_without_location() {
        let map = Arc::new(RecordingMap::default());
        let mut registry = TestRegistry::new();

        let a = mk_stop("a", true);
        let c = mk_stop("c", true);
        registry.add_stops([a.clone(), mk_stop("b", false), c.clone()], &map);

        let change = registry.remove(&StopId::new("b"), &map);
        assert_eq!(change, Some(RegistryChange::Removed(StopId::new("b"))));

        assert_eq!(ids(&registry), ["a", "c"]);
        assert_eq!(
            registry.waypoints(),
            vec![a.location.unwrap(), c.location.unwrap()]
        );
        assert_eq!(map.marker_count(), 2);
        assert_consistent(&registry, &map);
    }

    #[test]
    fn test_remove_after_stop_without_location() {
        let map = Arc::new(RecordingMap::default());
        let mut registry = TestRegistry::new();

        let a = mk_stop("a", true);
        registry.add_stops([a.clone(), mk_stop("b", false), mk_stop("c", true)], &map);

        registry.remove(&StopId::new("c"), &map);

        assert_eq!(registry.waypoints(), vec![a.location.unwrap()]);
        assert_eq!(map.marked_stops(), vec![StopId::new("a")]);
        assert_consistent(&registry, &map);
    }

    #[test]
    fn test_remove_unknown() {
        let map = Arc::new(RecordingMap::default());
        let mut registry = TestRegistry::new();
        registry.add_stops([mk_stop("a", true)], &map);
        assert_eq!(registry.remove(&StopId::new("zzz"), &map), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_releases_markers() {
        let map = Arc::new(RecordingMap::default());
        let mut registry = TestRegistry::new();
        registry.add_stops([mk_stop("a", true), mk_stop("b", false)], &map);

        assert_eq!(registry.clear(&map), Some(RegistryChange::Cleared));
        assert!(registry.is_empty());
        assert_eq!(map.marker_count(), 0);
        assert_eq!(registry.clear(&map), None, "Clearing an empty registry is not a change");
    }

    #[test]
    fn test_random_ops_stay_consistent() {
        let mut rng = ChaCha8Rng::seed_from_u64(0xd15b);

        for _ in 0..50 {
            let map = Arc::new(RecordingMap::default());
            let mut registry = TestRegistry::new();

            for _ in 0..40 {
                let id = format!("{}", rng.random_range(0..8));
                if rng.random_bool(0.55) {
                    let has_location = rng.random_bool(0.6);
                    registry.add_stops([mk_stop(&id, has_location)], &map);
                } else {
                    registry.remove(&StopId::new(id), &map);
                }
                assert_consistent(&registry, &map);
            }

            registry.clear(&map);
            assert_eq!(map.marker_count(), 0);
        }
    }
}
