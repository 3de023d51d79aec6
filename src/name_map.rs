use crate::name_path::{NamePath, match_name_path};

#[derive(Clone, Debug, PartialEq)]
pub struct NameMapEntry<V> {
    pub key: NamePath,
    pub value: V,
}

/// Insertion-ordered map keyed by structurally compared name paths.
///
/// Lookups are linear scans. Forms hold tens of fields, so the association
/// list stays cheaper than hashing whole paths on every access.
#[derive(Clone, Debug, PartialEq)]
pub struct NameMap<V> {
    list: Vec<NameMapEntry<V>>,
}

impl<V> Default for NameMap<V> {
    fn default() -> Self {
        Self { list: Vec::new() }
    }
}

impl<V> NameMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, key: &NamePath) -> Option<&V> {
        self.list
            .iter()
            .find(|entry| match_name_path(&entry.key, key))
            .map(|entry| &entry.value)
    }

    pub fn set(&mut self, key: NamePath, value: V) {
        match self
            .list
            .iter_mut()
            .find(|entry| match_name_path(&entry.key, &key))
        {
            Some(entry) => entry.value = value,
            None => self.list.push(NameMapEntry { key, value }),
        }
    }

    pub fn update(&mut self, key: NamePath, updater: impl FnOnce(V) -> V, default_value: V)
    where
        V: Clone,
    {
        let current = self.get(&key).cloned().unwrap_or(default_value);
        self.set(key, updater(current));
    }

    pub fn delete(&mut self, key: &NamePath) {
        self.list.retain(|entry| !match_name_path(&entry.key, key));
    }

    pub fn map<R>(&self, f: impl FnMut(&NameMapEntry<V>) -> R) -> Vec<R> {
        self.list.iter().map(f).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NameMapEntry<V>> {
        self.list.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_structurally_equal_keys() {
        let mut map = NameMap::new();
        map.set(NamePath::from(["user", "name"]), 1);
        map.set(NamePath::from(["user", "name"]), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&NamePath::from(["user", "name"])), Some(&2));
    }

    #[test]
    fn update_falls_back_to_default() {
        let mut map: NameMap<Vec<&str>> = NameMap::new();
        let key = NamePath::from("tags");
        map.update(
            key.clone(),
            |mut tags| {
                tags.push("a");
                tags
            },
            Vec::new(),
        );
        map.update(
            key.clone(),
            |mut tags| {
                tags.push("b");
                tags
            },
            Vec::new(),
        );
        assert_eq!(map.get(&key), Some(&vec!["a", "b"]));
    }

    #[test]
    fn clone_does_not_alias_later_writes() {
        let mut map = NameMap::new();
        map.set(NamePath::from("a"), 1);
        let snapshot = map.clone();
        map.set(NamePath::from("a"), 5);
        map.delete(&NamePath::from("a"));
        assert_eq!(snapshot.get(&NamePath::from("a")), Some(&1));
        assert!(map.is_empty());
    }

    #[test]
    fn map_preserves_insertion_order() {
        let mut map = NameMap::new();
        map.set(NamePath::from("b"), 2);
        map.set(NamePath::from("a"), 1);
        map.set(NamePath::from("b"), 3);
        let keys = map.map(|entry| (entry.key.to_string(), entry.value));
        assert_eq!(keys, vec![("b".to_string(), 3), ("a".to_string(), 1)]);
    }
}
