//! The running set of users who approved a stage.

use std::collections::BTreeSet;
use std::fmt;

/// Separator used when the set is written to metadata.
pub const SEPARATOR: &str = ", ";

/// Accepted approvers of one stage instance.
///
/// Kept sorted so the metadata value and the display string are stable
/// across calls on identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApproverSet(BTreeSet<String>);

impl ApproverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a metadata value. Empty input is the empty set; both `"a, b"`
    /// and `"a,b"` are accepted.
    pub fn parse(value: &str) -> Self {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Metadata value: members joined by `", "`.
    pub fn to_metadata_value(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(SEPARATOR)
    }

    /// Human-readable summary, or the empty string for an empty set.
    pub fn display(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!("Approved by: {}", self.to_metadata_value())
        }
    }

    /// Add a user. Returns `false` if they were already present.
    pub fn insert(&mut self, user: impl Into<String>) -> bool {
        self.0.insert(user.into())
    }

    pub fn contains(&self, user: &str) -> bool {
        self.0.contains(user)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether every member of `other` is also in `self`.
    pub fn is_superset(&self, other: &ApproverSet) -> bool {
        self.0.is_superset(&other.0)
    }
}

impl FromIterator<String> for ApproverSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for ApproverSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for ApproverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_metadata_value())
    }
}
