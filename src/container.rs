//! Ordered key-to-node mapping shared by every group-like hierarchy level
//! (`Series::iterations`, `Iteration::meshes`, `Mesh`'s components, …).
//!
//! Grounded on `original_source/include/openPMD/backend/Container.hpp`: an
//! ordered associative container whose `operator[]` creates a missing
//! entry in write mode and raises in read-only mode. The underlying
//! storage follows the teacher's `storage_v2::string_table`'s choice of a
//! `Vec` for ordered payload plus a `HashMap` index for O(1) lookup,
//! rather than pulling in an `indexmap` dependency for something this
//! small.

use std::collections::HashMap;
use std::hash::Hash;

/// An ordered `K -> V` map that remembers insertion order, with an index
/// for O(1) keyed lookup. Iteration order is insertion order; callers that
/// need key-ascending order (the `Iterations` container, per `spec.md`
/// §4.3) sort at the call site via [`Container::keys_sorted`].
#[derive(Debug, Clone)]
pub struct Container<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

impl<K, V> Default for Container<K, V> {
    fn default() -> Self {
        Container {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> Container<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if let Some(&i) = self.index.get(key) {
            Some(&mut self.entries[i].1)
        } else {
            None
        }
    }

    /// Insert `value` under `key`. If `key` was already present its value
    /// is replaced in place (preserving its original position), matching
    /// `std::map::operator[]` assignment semantics.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    /// Remove `key`, returning its value if present. Reindexes every
    /// entry after the removed slot; containers in this crate are small
    /// (tens to low hundreds of children), so the O(n) shift is cheap
    /// compared to the I/O a removal triggers anyway.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let i = self.index.remove(key)?;
        let (_, v) = self.entries.remove(i);
        for (k, idx) in self.index.iter_mut() {
            if *idx > i {
                *idx -= 1;
            }
            let _ = k;
        }
        Some(v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<K: Eq + Hash + Clone + Ord, V> Container<K, V> {
    /// Keys in ascending order, for key-ascending containers such as
    /// `Series::iterations` (`spec.md` §4.3: "Iteration order is
    /// key-ascending for integer-keyed containers").
    pub fn keys_sorted(&self) -> Vec<K> {
        let mut ks: Vec<K> = self.keys().cloned().collect();
        ks.sort();
        ks
    }

    pub fn iter_sorted(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut entries: Vec<&(K, V)> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(k, v)| (k, v))
    }
}

/// Tracks which keys of a [`Container`] were accessed (read or written)
/// during a single re-parse pass, so that on drop keys the backend no
/// longer reports can be pruned from the in-memory map. Grounded on
/// `spec.md` §4.3's "helper wrapper tracks keys accessed during a
/// re-parse pass and removes unaccessed keys on destruction".
pub struct AccessTracker<'c, K, V> {
    container: &'c mut Container<K, V>,
    seen: std::collections::HashSet<K>,
}

impl<'c, K: Eq + Hash + Clone, V> AccessTracker<'c, K, V> {
    pub fn new(container: &'c mut Container<K, V>) -> Self {
        AccessTracker {
            container,
            seen: std::collections::HashSet::new(),
        }
    }

    pub fn mark(&mut self, key: &K) {
        self.seen.insert(key.clone());
    }

    pub fn container(&self) -> &Container<K, V> {
        self.container
    }

    pub fn container_mut(&mut self) -> &mut Container<K, V> {
        self.container
    }
}

impl<K: Eq + Hash + Clone, V> Drop for AccessTracker<'_, K, V> {
    fn drop(&mut self) {
        let stale: Vec<K> = self
            .container
            .keys()
            .filter(|k| !self.seen.contains(*k))
            .cloned()
            .collect();
        for k in stale {
            self.container.remove(&k);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut c: Container<String, i32> = Container::new();
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        assert_eq!(c.get(&"a".to_string()), Some(&1));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut c: Container<String, i32> = Container::new();
        c.insert("z".into(), 1);
        c.insert("a".into(), 2);
        let keys: Vec<&String> = c.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn integer_keys_sort_ascending() {
        let mut c: Container<u64, &str> = Container::new();
        c.insert(5, "five");
        c.insert(1, "one");
        c.insert(3, "three");
        assert_eq!(c.keys_sorted(), vec![1, 3, 5]);
    }

    #[test]
    fn remove_reindexes_remaining_entries() {
        let mut c: Container<String, i32> = Container::new();
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        c.insert("c".into(), 3);
        assert_eq!(c.remove(&"a".to_string()), Some(1));
        assert_eq!(c.get(&"b".to_string()), Some(&2));
        assert_eq!(c.get(&"c".to_string()), Some(&3));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn access_tracker_prunes_unseen_keys_on_drop() {
        let mut c: Container<String, i32> = Container::new();
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        {
            let mut tracker = AccessTracker::new(&mut c);
            tracker.mark(&"a".to_string());
        }
        assert!(c.contains_key(&"a".to_string()));
        assert!(!c.contains_key(&"b".to_string()));
    }
}
