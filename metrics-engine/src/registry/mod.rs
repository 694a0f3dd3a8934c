//! Metric storage.
//!
//! The [`Registry`] maps group names to [`MetricGroup`]s, and each group maps metric names to
//! metric handles.  Both maps are split into independently-locked shards so that registrations in
//! unrelated groups, or for unrelated names, never contend on the same lock.

use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use rapidhash::fast::RapidHasher;
use tracing::{debug, info};

use crate::builder::MetricsBuilder;
use crate::environment::EnvironmentInfo;
use crate::filter::SnapshotFilter;
use crate::snapshot::GroupSnapshot;
use crate::state::{MetricsState, MetricsSwitch};

mod group;
pub use self::group::MetricGroup;

type ShardHasher = RapidHasher<'static>;
type ShardMap<V> = HashMap<String, V, BuildHasherDefault<ShardHasher>>;

/// A string-keyed map split into shards.
///
/// The shard for a key is chosen by hashing it, so operations on keys in different shards never
/// contend.  Lookups take the shard's read lock; insertions and removals take its write lock.
pub(crate) struct Shards<V> {
    shards: Box<[RwLock<ShardMap<V>>]>,
    shard_mask: usize,
}

impl<V: Clone> Shards<V> {
    pub(crate) fn new() -> Self {
        let shard_count = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .next_power_of_two();
        let shards = (0..shard_count).map(|_| RwLock::new(ShardMap::default())).collect();

        Shards { shards, shard_mask: shard_count - 1 }
    }

    #[inline]
    fn shard(&self, key: &str) -> &RwLock<ShardMap<V>> {
        let mut hasher = ShardHasher::default();
        key.hash(&mut hasher);

        // The shard count is a power of two and `shard_mask` is one less than it, so the masked
        // hash is always in bounds.
        &self.shards[hasher.finish() as usize & self.shard_mask]
    }

    pub(crate) fn get(&self, key: &str) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    /// Gets the value under `key`, creating it with `init` if it does not exist.
    ///
    /// `init` runs while the shard's write lock is held, so concurrent callers for the same key
    /// all observe the value from the single call to `init` that won.  The lock is not reentrant:
    /// `init` must not touch this map.
    pub(crate) fn get_or_try_insert_with<F, E>(&self, key: &str, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let shard = self.shard(key);

        // Try and get the value if it exists.
        if let Some(value) = shard.read().get(key) {
            return Ok(value.clone());
        }

        // Switch to the write guard, and check again in case we lost a race to insert.
        let mut shard_write = shard.write();
        if let Some(value) = shard_write.get(key) {
            return Ok(value.clone());
        }

        let value = init()?;
        shard_write.insert(key.to_string(), value.clone());
        Ok(value)
    }

    pub(crate) fn remove(&self, key: &str) -> bool {
        self.shard(key).write().remove(key).is_some()
    }

    /// Collects every entry, sorted by key.
    ///
    /// Shards are visited one at a time, so entries inserted or removed while this runs may or may
    /// not be observed.
    pub(crate) fn entries(&self) -> Vec<(String, V)> {
        let mut entries = Vec::new();
        for shard in self.shards.iter() {
            let shard_read = shard.read();
            entries.extend(shard_read.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    /// Collects every key, sorted.
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for shard in self.shards.iter() {
            keys.extend(shard.read().keys().cloned());
        }
        keys.sort_unstable();
        keys
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }
}

/// The top-level metrics registry.
///
/// Owns every [`MetricGroup`], and through them every metric handle, along with the
/// [`EnvironmentInfo`] attached to snapshots and the switch that disables all updates.
pub struct Registry {
    groups: Shards<Arc<MetricGroup>>,
    builder: MetricsBuilder,
    environment: EnvironmentInfo,
}

impl Registry {
    /// Creates a new `Registry`.
    ///
    /// Every group created by the registry builds its metrics with `builder`, and shares the
    /// builder's disable switch.
    pub fn new(builder: MetricsBuilder, environment: EnvironmentInfo) -> Registry {
        Registry { groups: Shards::new(), builder, environment }
    }

    /// Gets the group with the given name, creating it if it does not yet exist.
    pub fn group(&self, name: &str) -> Arc<MetricGroup> {
        let result: Result<_, std::convert::Infallible> =
            self.groups.get_or_try_insert_with(name, || {
                debug!(group = name, "Creating metric group.");
                Ok(Arc::new(MetricGroup::new(name.to_string(), self.builder.clone())))
            });
        match result {
            Ok(group) => group,
            Err(never) => match never {},
        }
    }

    /// Gets the group with the given name, if it exists.
    pub fn get_group(&self, name: &str) -> Option<Arc<MetricGroup>> {
        self.groups.get(name)
    }

    /// Removes a group and every metric in it.
    ///
    /// Returns `true` if the group existed.
    pub fn remove_group(&self, name: &str) -> bool {
        self.groups.remove(name)
    }

    /// Names of every group, sorted.
    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys()
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Environment metadata attached to every snapshot.
    pub fn environment(&self) -> &EnvironmentInfo {
        &self.environment
    }

    /// Builder used to construct metrics in every group.
    pub fn builder(&self) -> &MetricsBuilder {
        &self.builder
    }

    /// Gets the current state.
    pub fn state(&self) -> MetricsState {
        self.switch().state()
    }

    /// Disables every metric update, permanently.
    ///
    /// Registered metrics stay enumerable and keep reporting the values they had when this was
    /// called.  Returns `true` if this call performed the transition.
    pub fn completely_disable_metrics(&self) -> bool {
        let transitioned = self.switch().disable(self.builder.clock().now());
        if transitioned {
            info!("Metrics disabled, all further updates will be ignored.");
        }
        transitioned
    }

    /// Reads every metric matching `filter`, group by group, in group name order.
    ///
    /// Each individual reading is atomic, but metrics updated while the snapshot is being taken may
    /// be observed either before or after the update.
    pub fn snapshot(&self, filter: &SnapshotFilter) -> Vec<GroupSnapshot> {
        self.groups
            .entries()
            .into_iter()
            .filter(|(name, _)| filter.matches_group(name))
            .map(|(_, group)| group.snapshot_with(filter))
            .filter(|group| !group.is_empty())
            .collect()
    }

    fn switch(&self) -> &MetricsSwitch {
        self.builder.switch()
    }
}

#[cfg(test)]
mod tests {
    use super::{Registry, Shards};
    use crate::builder::MetricsBuilder;
    use crate::environment::EnvironmentInfo;
    use crate::filter::{Matcher, SnapshotFilter};
    use crate::state::MetricsState;
    use std::sync::Arc;

    fn registry() -> Registry {
        Registry::new(MetricsBuilder::default(), EnvironmentInfo::default())
    }

    #[test]
    fn test_shards() {
        let shards = Shards::<u32>::new();
        assert_eq!(shards.get("a"), None);

        let value: Result<u32, ()> = shards.get_or_try_insert_with("a", || Ok(1));
        assert_eq!(value, Ok(1));
        let value: Result<u32, ()> = shards.get_or_try_insert_with("a", || Ok(2));
        assert_eq!(value, Ok(1));
        let failed: Result<u32, &str> = shards.get_or_try_insert_with("b", || Err("nope"));
        assert_eq!(failed, Err("nope"));
        assert_eq!(shards.get("b"), None);

        shards.get_or_try_insert_with::<_, ()>("c", || Ok(3)).unwrap();
        assert_eq!(shards.keys(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(shards.entries(), vec![("a".to_string(), 1), ("c".to_string(), 3)]);
        assert_eq!(shards.len(), 2);

        assert!(shards.remove("a"));
        assert!(!shards.remove("a"));
        assert_eq!(shards.len(), 1);
    }

    #[test]
    fn test_group_is_created_once() {
        let registry = registry();
        let first = registry.group("db");
        let second = registry.group("db");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.group_count(), 1);

        registry.group("cache");
        assert_eq!(registry.group_names(), vec!["cache".to_string(), "db".to_string()]);

        assert!(registry.remove_group("db"));
        assert!(registry.get_group("db").is_none());
        assert!(!registry.remove_group("db"));
    }

    #[test]
    fn test_snapshot_is_ordered_and_filtered() {
        let registry = registry();
        registry.group("zeta").counter("hits").unwrap().increment(1);
        registry.group("alpha").counter("misses").unwrap().increment(2);
        registry.group("empty");

        let groups = registry.snapshot(&SnapshotFilter::default());
        let names = groups.iter().map(|g| g.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["alpha", "zeta"]);

        let filter = SnapshotFilter::default().with_group(Matcher::Prefix("ze".into()));
        let groups = registry.snapshot(&filter);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name(), "zeta");
    }

    #[test]
    fn test_disable_is_one_way() {
        let registry = registry();
        let counter = registry.group("app").counter("requests").unwrap();
        counter.increment(4);

        assert!(registry.completely_disable_metrics());
        assert!(!registry.completely_disable_metrics());
        assert_eq!(registry.state(), MetricsState::Disabled);

        counter.increment(10);
        assert_eq!(counter.value(), 4);

        // Registration still works, the new metric is just inert.
        let late = registry.group("app").counter("late").unwrap();
        late.increment(1);
        assert_eq!(late.value(), 0);
        assert_eq!(registry.group("app").names().len(), 2);
    }
}
