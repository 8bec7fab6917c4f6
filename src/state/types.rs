//! Types for the progress store.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Completed file names per catalog identifier.
///
/// Serialised as a plain JSON object of string arrays, so the file stays easy
/// to inspect and hand-edit between runs. Names keep their completion order
/// and never repeat within an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct ProgressRecord {
    entries: BTreeMap<String, Vec<String>>,
}

impl From<BTreeMap<String, Vec<String>>> for ProgressRecord {
    /// Collapses duplicate names a hand edit may have introduced, keeping the
    /// first occurrence.
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let entries = raw
            .into_iter()
            .map(|(id, names)| {
                let mut seen = HashSet::with_capacity(names.len());
                let names = names
                    .into_iter()
                    .filter(|n| seen.insert(n.clone()))
                    .collect();
                (id, names)
            })
            .collect();
        Self { entries }
    }
}

impl From<ProgressRecord> for BTreeMap<String, Vec<String>> {
    fn from(record: ProgressRecord) -> Self {
        record.entries
    }
}

impl ProgressRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` has been completed for `entry`.
    pub fn contains(&self, entry: &str, name: &str) -> bool {
        self.entries
            .get(entry)
            .is_some_and(|names| names.iter().any(|n| n == name))
    }

    /// Record `name` as completed for `entry`.
    ///
    /// Returns `false` (and changes nothing) if it was already recorded.
    pub fn append(&mut self, entry: &str, name: &str) -> bool {
        if self.contains(entry, name) {
            return false;
        }
        self.entries
            .entry(entry.to_string())
            .or_default()
            .push(name.to_string());
        true
    }

    /// Completed names for `entry` in completion order; empty if unknown.
    pub fn completed(&self, entry: &str) -> &[String] {
        self.entries.get(entry).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Completed names for `entry` as a set, for O(1) membership checks.
    pub fn completed_set(&self, entry: &str) -> HashSet<&str> {
        self.completed(entry).iter().map(String::as_str).collect()
    }

    /// Drop an entry entirely. Returns the names it held, if any.
    pub fn remove_entry(&mut self, entry: &str) -> Option<Vec<String>> {
        self.entries.remove(entry)
    }

    /// Iterate `(identifier, completed names)` in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(id, names)| (id.as_str(), names.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total completed names across all entries.
    pub fn total_completed(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}
