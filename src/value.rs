use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

use crate::name_path::{NamePath, PathSegment};

/// A node of the form value tree.
///
/// Containers hold their children behind `Arc`, so cloning a node is cheap and
/// every write through [`set_value`] reallocates only the spine it touches.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Arc<Vec<StoreValue>>),
    Map(Arc<BTreeMap<String, StoreValue>>),
}

impl Default for StoreValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoreValue {
    pub fn empty() -> Self {
        StoreValue::Map(Arc::new(BTreeMap::new()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StoreValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoreValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            StoreValue::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StoreValue]> {
        match self {
            StoreValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StoreValue>> {
        match self {
            StoreValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// True when both values are the same allocated container.
    pub fn shares_node_with(&self, other: &StoreValue) -> bool {
        match (self, other) {
            (StoreValue::List(left), StoreValue::List(right)) => Arc::ptr_eq(left, right),
            (StoreValue::Map(left), StoreValue::Map(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.clone())
    }
}

impl Display for StoreValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreValue::String(value) => f.write_str(value),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for StoreValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => StoreValue::Null,
            serde_json::Value::Bool(value) => StoreValue::Bool(value),
            serde_json::Value::Number(value) => StoreValue::Number(value),
            serde_json::Value::String(value) => StoreValue::String(value),
            serde_json::Value::Array(items) => {
                StoreValue::List(Arc::new(items.into_iter().map(StoreValue::from).collect()))
            }
            serde_json::Value::Object(entries) => StoreValue::Map(Arc::new(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, StoreValue::from(value)))
                    .collect(),
            )),
        }
    }
}

impl From<StoreValue> for serde_json::Value {
    fn from(value: StoreValue) -> Self {
        match value {
            StoreValue::Null => serde_json::Value::Null,
            StoreValue::Bool(value) => serde_json::Value::Bool(value),
            StoreValue::Number(value) => serde_json::Value::Number(value),
            StoreValue::String(value) => serde_json::Value::String(value),
            StoreValue::List(items) => serde_json::Value::Array(
                items.iter().cloned().map(serde_json::Value::from).collect(),
            ),
            StoreValue::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), serde_json::Value::from(value.clone())))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        StoreValue::String(value.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        StoreValue::String(value)
    }
}

impl From<bool> for StoreValue {
    fn from(value: bool) -> Self {
        StoreValue::Bool(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        StoreValue::Number(value.into())
    }
}

impl From<u64> for StoreValue {
    fn from(value: u64) -> Self {
        StoreValue::Number(value.into())
    }
}

impl From<f64> for StoreValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(StoreValue::Null, StoreValue::Number)
    }
}

impl From<Vec<StoreValue>> for StoreValue {
    fn from(value: Vec<StoreValue>) -> Self {
        StoreValue::List(Arc::new(value))
    }
}

impl Serialize for StoreValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            StoreValue::Null => serializer.serialize_unit(),
            StoreValue::Bool(value) => serializer.serialize_bool(*value),
            StoreValue::Number(value) => value.serialize(serializer),
            StoreValue::String(value) => serializer.serialize_str(value),
            StoreValue::List(items) => serializer.collect_seq(items.iter()),
            StoreValue::Map(entries) => serializer.collect_map(entries.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for StoreValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(StoreValue::from)
    }
}

/// Reads the node at `path`. Missing intermediates yield `None`.
pub fn get_value<'a>(store: &'a StoreValue, path: &NamePath) -> Option<&'a StoreValue> {
    path.iter()
        .try_fold(store, |node, segment| child_of(node, segment))
}

fn child_of<'a>(node: &'a StoreValue, segment: &PathSegment) -> Option<&'a StoreValue> {
    match node {
        StoreValue::Map(entries) => entries.get(segment.to_key().as_ref()),
        StoreValue::List(items) => segment.as_index().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Returns a new root with `value` written at `path`; `None` removes the entry.
///
/// Only the nodes from the root down to `path` are reallocated. Removing the
/// last element of a list truncates it, any other list slot is reset to null.
pub fn set_value(store: &StoreValue, path: &NamePath, value: Option<StoreValue>) -> StoreValue {
    match value {
        Some(value) => insert_at(Some(store), path.segments(), value),
        None if path.is_empty() => StoreValue::empty(),
        None => remove_at(store, path.segments()).unwrap_or_else(|| store.clone()),
    }
}

/// Largest index a write may pad a list up to. Beyond it the slot is stored
/// under its decimal key in a map instead.
const MAX_LIST_INDEX: usize = u16::MAX as usize;

fn list_slot(segment: &PathSegment) -> Option<usize> {
    segment.as_index().filter(|index| *index <= MAX_LIST_INDEX)
}

fn insert_at(node: Option<&StoreValue>, path: &[PathSegment], value: StoreValue) -> StoreValue {
    let Some((head, rest)) = path.split_first() else {
        return value;
    };

    match node {
        Some(StoreValue::List(items)) => match list_slot(head) {
            Some(index) => {
                let child = insert_at(items.get(index), rest, value);
                let mut next = Vec::clone(items);
                if index >= next.len() {
                    next.resize(index + 1, StoreValue::Null);
                }
                next[index] = child;
                StoreValue::List(Arc::new(next))
            }
            None => {
                let mut next = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), item.clone()))
                    .collect::<BTreeMap<_, _>>();
                next.insert(head.to_key().into_owned(), insert_at(None, rest, value));
                StoreValue::Map(Arc::new(next))
            }
        },
        Some(StoreValue::Map(entries)) => {
            let key = head.to_key();
            let child = insert_at(entries.get(key.as_ref()), rest, value);
            let mut next = BTreeMap::clone(entries);
            next.insert(key.into_owned(), child);
            StoreValue::Map(Arc::new(next))
        }
        _ => match head {
            PathSegment::Index(index) if *index <= MAX_LIST_INDEX => {
                let mut next = vec![StoreValue::Null; *index];
                next.push(insert_at(None, rest, value));
                StoreValue::List(Arc::new(next))
            }
            _ => {
                let mut next = BTreeMap::new();
                next.insert(head.to_key().into_owned(), insert_at(None, rest, value));
                StoreValue::Map(Arc::new(next))
            }
        },
    }
}

fn remove_at(node: &StoreValue, path: &[PathSegment]) -> Option<StoreValue> {
    let (head, rest) = path.split_first()?;
    match node {
        StoreValue::Map(entries) => {
            let key = head.to_key();
            let child = entries.get(key.as_ref())?;
            let mut next = BTreeMap::clone(entries);
            if rest.is_empty() {
                next.remove(key.as_ref());
            } else {
                next.insert(key.into_owned(), remove_at(child, rest)?);
            }
            Some(StoreValue::Map(Arc::new(next)))
        }
        StoreValue::List(items) => {
            let index = head.as_index()?;
            let child = items.get(index)?;
            let mut next = Vec::clone(items);
            if !rest.is_empty() {
                next[index] = remove_at(child, rest)?;
            } else if index + 1 == next.len() {
                next.pop();
            } else {
                next[index] = StoreValue::Null;
            }
            Some(StoreValue::List(Arc::new(next)))
        }
        _ => None,
    }
}

/// Deep-merges `sources` into `store` from left to right.
///
/// Maps merge key by key; lists and scalars from a later source replace the
/// earlier value wholesale.
pub fn set_values<'a>(
    store: &StoreValue,
    sources: impl IntoIterator<Item = &'a StoreValue>,
) -> StoreValue {
    sources
        .into_iter()
        .fold(store.clone(), |merged, source| merge_values(&merged, source))
}

fn merge_values(target: &StoreValue, source: &StoreValue) -> StoreValue {
    match (target, source) {
        (StoreValue::Map(target), StoreValue::Map(source)) => {
            let mut next = BTreeMap::clone(target);
            for (key, value) in source.iter() {
                let merged = match next.get(key) {
                    Some(existing) => merge_values(existing, value),
                    None => value.clone(),
                };
                next.insert(key.clone(), merged);
            }
            StoreValue::Map(Arc::new(next))
        }
        (_, source) => source.clone(),
    }
}

/// Minimal fragment of `store` holding only the listed paths.
pub fn clone_by_name_path_list(store: &StoreValue, paths: &[NamePath]) -> StoreValue {
    paths
        .iter()
        .fold(StoreValue::empty(), |fragment, path| match get_value(store, path) {
            Some(value) => set_value(&fragment, path, Some(value.clone())),
            None => fragment,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: serde_json::Value) -> StoreValue {
        StoreValue::from(value)
    }

    #[test]
    fn set_then_get_round_trips() {
        let base = store(json!({ "user": { "name": "a" } }));
        let path = NamePath::from(["user", "address", "city"]);
        let next = set_value(&base, &path, Some("Berlin".into()));
        assert_eq!(get_value(&next, &path), Some(&StoreValue::from("Berlin")));
        assert_eq!(
            get_value(&next, &NamePath::from(["user", "name"])),
            Some(&StoreValue::from("a"))
        );
    }

    #[test]
    fn set_value_shares_untouched_siblings() {
        let base = store(json!({
            "profile": { "name": "a", "tags": ["x", "y"] },
            "settings": { "theme": "dark" }
        }));
        let next = set_value(&base, &NamePath::from(["profile", "name"]), Some("b".into()));

        assert_eq!(
            get_value(&base, &NamePath::from(["profile", "name"])),
            Some(&StoreValue::from("a"))
        );
        let settings = NamePath::from("settings");
        assert!(
            get_value(&next, &settings)
                .expect("settings in next")
                .shares_node_with(get_value(&base, &settings).expect("settings in base"))
        );
        let tags = NamePath::from(["profile", "tags"]);
        assert!(
            get_value(&next, &tags)
                .expect("tags in next")
                .shares_node_with(get_value(&base, &tags).expect("tags in base"))
        );
        let profile = NamePath::from("profile");
        assert!(
            !get_value(&next, &profile)
                .expect("profile in next")
                .shares_node_with(get_value(&base, &profile).expect("profile in base"))
        );
    }

    #[test]
    fn missing_intermediates_follow_next_segment_kind() {
        let path = NamePath::from("users").child(1usize).child("email");
        let next = set_value(&StoreValue::empty(), &path, Some("a@b.c".into()));
        assert_eq!(
            next.to_json(),
            json!({ "users": [null, { "email": "a@b.c" }] })
        );
    }

    #[test]
    fn existing_list_keeps_its_kind_for_string_indices() {
        let base = store(json!({ "list": [1, 2] }));
        let next = set_value(&base, &NamePath::from(["list", "1"]), Some(5i64.into()));
        assert_eq!(next.to_json(), json!({ "list": [1, 5] }));
    }

    #[test]
    fn removing_a_leaf_matches_never_set() {
        let base = store(json!({ "a": { "b": 1, "c": 2 } }));
        let next = set_value(&base, &NamePath::from(["a", "b"]), None);
        assert_eq!(next, store(json!({ "a": { "c": 2 } })));
        assert_eq!(get_value(&next, &NamePath::from(["a", "b"])), None);

        let untouched = set_value(&base, &NamePath::from(["x", "y"]), None);
        assert!(untouched.shares_node_with(&base));
    }

    #[test]
    fn reading_through_scalars_never_panics() {
        let base = store(json!({ "a": 1 }));
        assert_eq!(get_value(&base, &NamePath::from(["a", "b", "c"])), None);
        assert_eq!(get_value(&base, &NamePath::root()), Some(&base));
    }

    #[test]
    fn set_values_merges_maps_and_replaces_lists() {
        let base = store(json!({ "a": { "x": 1, "y": 2 }, "list": [1, 2, 3] }));
        let patch = store(json!({ "a": { "y": 3 }, "list": [9] }));
        let later = store(json!({ "b": true }));
        let merged = set_values(&base, [&patch, &later]);
        assert_eq!(
            merged.to_json(),
            json!({ "a": { "x": 1, "y": 3 }, "list": [9], "b": true })
        );
    }

    #[test]
    fn clone_by_name_path_list_skips_absent_paths() {
        let base = store(json!({ "a": { "x": 1, "y": 2 }, "b": 3 }));
        let fragment = clone_by_name_path_list(
            &base,
            &[NamePath::from(["a", "x"]), NamePath::from("missing")],
        );
        assert_eq!(fragment.to_json(), json!({ "a": { "x": 1 } }));
    }

    #[test]
    fn huge_indices_fall_back_to_map_keys() {
        let path = NamePath::from("list").child(usize::MAX);
        let next = set_value(&StoreValue::empty(), &path, Some(1i64.into()));
        assert_eq!(get_value(&next, &path), Some(&StoreValue::from(1i64)));
        let list = get_value(&next, &NamePath::from("list"))
            .and_then(StoreValue::as_map)
            .expect("list slot stored in a map");
        assert_eq!(list.get(&usize::MAX.to_string()), Some(&StoreValue::from(1i64)));

        let base = store(json!({ "list": ["a"] }));
        let far = NamePath::from("list").child(MAX_LIST_INDEX + 1);
        let next = set_value(&base, &far, Some("b".into()));
        assert_eq!(get_value(&next, &far), Some(&StoreValue::from("b")));
        assert_eq!(
            get_value(&next, &NamePath::from("list").child(0usize)),
            Some(&StoreValue::from("a"))
        );
    }

    #[test]
    fn serde_round_trips_through_json() {
        let base = store(json!({ "a": [1, "two", null, { "b": false }] }));
        let text = serde_json::to_string(&base).expect("serialize store");
        let back: StoreValue = serde_json::from_str(&text).expect("deserialize store");
        assert_eq!(back, base);
    }
}
