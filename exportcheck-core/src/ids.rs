//! ## exportcheck-core::ids
//! **Identifier set algebra**
//!
//! Every generated item carries one [`UniqueId`]. The harness tracks those ids
//! in [`IdSet`]s: the union of all worker batches on the generating side, and
//! the accepted/dropped partitions on the receiving side. Deduplication and the
//! final convergence check are both expressed with the three operations here:
//!
//! - [`IdSet::merge`]: destructive insert, reports ids that were already present.
//! - [`IdSet::compare`]: set difference in both directions.
//! - [`IdSet::union`]: non-destructive merge that also reports overlap.
//!
//! None of them ever drops an identifier silently.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one generated data item.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Id for the `seq`-th generated item.
    #[inline]
    pub fn from_sequence(seq: u64) -> Self {
        Self(seq.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UniqueId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UniqueId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Two-way difference produced by [`IdSet::compare`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDiff {
    /// Present in `self` but absent from the other set.
    pub missing_in_other: Vec<UniqueId>,
    /// Present in the other set but absent from `self`.
    pub only_in_other: Vec<UniqueId>,
}

impl SetDiff {
    /// Both directions are empty, i.e. the sets are equal.
    pub fn is_empty(&self) -> bool {
        self.missing_in_other.is_empty() && self.only_in_other.is_empty()
    }
}

/// Set of unique identifiers. Order is irrelevant to every operation;
/// iteration is sorted so diagnostics are stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSet {
    ids: BTreeSet<UniqueId>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id`, returning `false` when it was already present.
    pub fn insert(&mut self, id: UniqueId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &UniqueId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniqueId> {
        self.ids.iter()
    }

    /// Inserts every id of `other` into `self`.
    ///
    /// Ids already present are reported in the returned list and left as they
    /// were (first writer wins).
    pub fn merge(&mut self, other: &IdSet) -> Vec<UniqueId> {
        let mut duplicates = Vec::new();
        for id in &other.ids {
            if !self.ids.insert(id.clone()) {
                duplicates.push(id.clone());
            }
        }
        duplicates
    }

    /// Set difference in both directions.
    pub fn compare(&self, other: &IdSet) -> SetDiff {
        SetDiff {
            missing_in_other: self.ids.difference(&other.ids).cloned().collect(),
            only_in_other: other.ids.difference(&self.ids).cloned().collect(),
        }
    }

    /// Non-destructive union. The second element lists ids found in both
    /// inputs, which callers treat as an overlap violation.
    pub fn union(&self, other: &IdSet) -> (IdSet, Vec<UniqueId>) {
        let mut union = self.clone();
        let duplicates = union.merge(other);
        (union, duplicates)
    }

    /// Hex-encoded BLAKE3 digest over the sorted ids.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for id in &self.ids {
            hasher.update(id.as_str().as_bytes());
            // Separator so {"1","23"} and {"12","3"} differ.
            hasher.update(&[0]);
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}

impl FromIterator<UniqueId> for IdSet {
    fn from_iter<I: IntoIterator<Item = UniqueId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for IdSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(UniqueId::from).collect()
    }
}

impl IntoIterator for IdSet {
    type Item = UniqueId;
    type IntoIter = std::collections::btree_set::IntoIter<UniqueId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = &'a UniqueId;
    type IntoIter = std::collections::btree_set::Iter<'a, UniqueId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

impl Extend<UniqueId> for IdSet {
    fn extend<I: IntoIterator<Item = UniqueId>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}
