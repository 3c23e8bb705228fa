use std::hash::Hash;

use crate::constants::FastHashMap;

/// Two-way map between station keys and their compact indices.
///
/// Indices are assigned densely in insertion order, so the reverse direction is a plain
/// vector lookup.
#[derive(Debug, Clone)]
pub struct BiMap<K>
where
    K: Eq + Hash + Clone,
{
    forward: FastHashMap<K, u16>,
    reverse: Vec<K>,
}

impl<K> Default for BiMap<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> BiMap<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            forward: FastHashMap::default(),
            reverse: Vec::new(),
        }
    }

    /// Return the index of `key`, inserting it with the next free index if unknown.
    ///
    /// Return
    /// ----------
    /// * `Some((index, inserted))`, or `None` once the `u16` index space is exhausted.
    pub fn entry_or_insert(&mut self, key: K) -> Option<(u16, bool)> {
        if let Some(&idx) = self.forward.get(&key) {
            return Some((idx, false));
        }
        let idx = u16::try_from(self.reverse.len()).ok()?;
        self.forward.insert(key.clone(), idx);
        self.reverse.push(key);
        Some((idx, true))
    }

    pub fn get_by_key(&self, key: &K) -> Option<u16> {
        self.forward.get(key).copied()
    }

    pub fn get_by_index(&self, idx: u16) -> Option<&K> {
        self.reverse.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod bimap_test {
    use super::*;

    #[test]
    fn test_dense_indices() {
        let mut map: BiMap<&str> = BiMap::new();
        assert_eq!(map.entry_or_insert("A"), Some((0, true)));
        assert_eq!(map.entry_or_insert("B"), Some((1, true)));
        assert_eq!(map.entry_or_insert("A"), Some((0, false)));
        assert_eq!(map.get_by_key(&"B"), Some(1));
        assert_eq!(map.get_by_index(1), Some(&"B"));
        assert_eq!(map.get_by_index(2), None);
        assert_eq!(map.len(), 2);
    }
}
