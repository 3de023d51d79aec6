use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    /// Index addressed by this segment when it is applied to a list.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(index) => Some(*index),
            PathSegment::Key(key) => parse_index(key),
        }
    }

    /// Key addressed by this segment when it is applied to a map.
    pub fn to_key(&self) -> Cow<'_, str> {
        match self {
            PathSegment::Index(index) => Cow::Owned(index.to_string()),
            PathSegment::Key(key) => Cow::Borrowed(key),
        }
    }
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{index}"),
            PathSegment::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        PathSegment::Key(value.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        PathSegment::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        PathSegment::Index(value)
    }
}

fn parse_index(key: &str) -> Option<usize> {
    let canonical = key == "0" || (!key.starts_with('0') && key.bytes().all(|b| b.is_ascii_digit()));
    if key.is_empty() || !canonical {
        return None;
    }
    key.parse().ok()
}

/// Ordered location of a value inside the form store. The empty path is the root.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamePath(Vec<PathSegment>);

impl NamePath {
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathSegment> {
        self.0.iter()
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.0.push(segment.into());
    }

    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut next = self.clone();
        next.push(segment);
        next
    }

    pub fn join(&self, other: &NamePath) -> Self {
        let mut next = self.clone();
        next.0.extend(other.0.iter().cloned());
        next
    }
}

impl Display for NamePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a NamePath {
    type Item = &'a PathSegment;
    type IntoIter = std::slice::Iter<'a, PathSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<&str> for NamePath {
    fn from(value: &str) -> Self {
        Self(vec![value.into()])
    }
}

impl From<String> for NamePath {
    fn from(value: String) -> Self {
        Self(vec![value.into()])
    }
}

impl From<usize> for NamePath {
    fn from(value: usize) -> Self {
        Self(vec![value.into()])
    }
}

impl From<PathSegment> for NamePath {
    fn from(value: PathSegment) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<PathSegment>> for NamePath {
    fn from(value: Vec<PathSegment>) -> Self {
        Self(value)
    }
}

impl From<&[PathSegment]> for NamePath {
    fn from(value: &[PathSegment]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[PathSegment; N]> for NamePath {
    fn from(value: [PathSegment; N]) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[&str; N]> for NamePath {
    fn from(value: [&str; N]) -> Self {
        Self(value.into_iter().map(PathSegment::from).collect())
    }
}

impl From<&NamePath> for NamePath {
    fn from(value: &NamePath) -> Self {
        value.clone()
    }
}

impl<T> From<Option<T>> for NamePath
where
    T: Into<NamePath>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl FromIterator<PathSegment> for NamePath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Canonical form of a scalar or sequence name. `None` yields the root path.
pub fn to_name_path(name: impl Into<NamePath>) -> NamePath {
    name.into()
}

/// Segment-wise equality. `Key("1")` and `Index(1)` never match.
pub fn match_name_path(left: &NamePath, right: &NamePath) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|(left, right)| left == right)
}

pub fn contains_name_path(list: &[NamePath], target: &NamePath) -> bool {
    list.iter().any(|path| match_name_path(path, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_names_become_single_segment_paths() {
        assert_eq!(
            to_name_path("email").segments(),
            &[PathSegment::Key("email".into())]
        );
        assert_eq!(to_name_path(3usize).segments(), &[PathSegment::Index(3)]);
        assert!(to_name_path(None::<&str>).is_empty());
    }

    #[test]
    fn distinct_instances_with_equal_segments_match() {
        let first = NamePath::from(["user", "name"]);
        let second = NamePath::from(vec![
            PathSegment::Key("user".into()),
            PathSegment::Key("name".into()),
        ]);
        assert!(match_name_path(&first, &second));
        assert!(contains_name_path(
            &[NamePath::from("other"), second],
            &first
        ));
    }

    #[test]
    fn string_and_integer_segments_do_not_coerce() {
        let by_key = NamePath::from(["list", "1"]);
        let by_index = NamePath::from("list").child(1usize);
        assert!(!match_name_path(&by_key, &by_index));
        assert!(!match_name_path(&by_key, &NamePath::from("list")));
    }

    #[test]
    fn display_joins_segments_with_dots() {
        let path = NamePath::from("users").child(2usize).child("email");
        assert_eq!(path.to_string(), "users.2.email");
    }

    #[test]
    fn only_canonical_decimal_keys_address_list_slots() {
        assert_eq!(PathSegment::from("12").as_index(), Some(12));
        assert_eq!(PathSegment::from("0").as_index(), Some(0));
        assert_eq!(PathSegment::from("012").as_index(), None);
        assert_eq!(PathSegment::from("-1").as_index(), None);
        assert_eq!(PathSegment::from("").as_index(), None);
    }
}
