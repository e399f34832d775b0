//! Scope tags and tag sets.
//!
//! A tag is an opaque identifier naming a navigable scope — an item, an item
//! occurrence, a section, a test part, or the whole test. Timer ranges and
//! time constraints are indexed by tags, so tag-set keys must be stable
//! regardless of the order identifiers were supplied in.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An opaque scope identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(id: impl Into<String>) -> Self {
        Tag(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag(s.to_string())
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Tag(s)
    }
}

/// The scope level a tag or timer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    Item,
    Section,
    TestPart,
    Test,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Item => write!(f, "item"),
            Scope::Section => write!(f, "section"),
            Scope::TestPart => write!(f, "testPart"),
            Scope::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item" => Ok(Scope::Item),
            "section" | "assessmentSection" => Ok(Scope::Section),
            "testPart" => Ok(Scope::TestPart),
            "test" | "assessmentTest" => Ok(Scope::Test),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// An ordered set of tags.
///
/// Tags are kept sorted so that `cache_key` is independent of insertion
/// order — `["a", "b"]` and `["b", "a"]` address the same cached duration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    pub fn new() -> Self {
        TagSet(BTreeSet::new())
    }

    /// A set containing a single tag.
    pub fn single(tag: impl Into<Tag>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(tag.into());
        TagSet(set)
    }

    pub fn insert(&mut self, tag: impl Into<Tag>) {
        self.0.insert(tag.into());
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// True if any tag is shared between the two sets.
    pub fn intersects(&self, other: &TagSet) -> bool {
        self.0.iter().any(|t| other.contains(t))
    }

    /// True if every tag of `other` is in this set.
    pub fn is_superset(&self, other: &TagSet) -> bool {
        other.0.iter().all(|t| self.0.contains(t))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Stable key for duration caching: sorted tags joined with `+`.
    pub fn cache_key(&self) -> String {
        let mut key = String::new();
        for tag in &self.0 {
            if !key.is_empty() {
                key.push('+');
            }
            key.push_str(tag.as_str());
        }
        key
    }
}

impl<T: Into<Tag>> FromIterator<T> for TagSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        TagSet(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Tag> for TagSet {
    fn from(tag: Tag) -> Self {
        TagSet::single(tag)
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}
