// 🏷️ Tag Model - Per-wave tag tables keyed by slug
// Tags are produced as fresh tables and merged at output time, never written
// back onto the wave records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::wave::Slug;

pub const CONTINUED: &str = "continued";
pub const DISAPPEARED: &str = "disappeared";
pub const REAPPEARED: &str = "reappeared";
pub const POSSIBLE_LICENSE: &str = "possible_license";
pub const FUTURE_LICENSE_EXPLICIT: &str = "future_license_explicit";
pub const ASSUMED_LICENSE: &str = "assumed_license";
pub const ACTIVE_LICENSE: &str = "active_license";
pub const ILLEGAL_1912: &str = "illegal_1912";
pub const ILLEGAL_OTHER: &str = "illegal_other";
pub const IS_DISPENSARY: &str = "is_dispensary";
pub const IS_DELIVERY: &str = "is_delivery";

/// Registry status words; each becomes a `<status>_license` tag
pub const LICENSE_STATUSES: [&str; 5] = ["active", "canceled", "expired", "revoked", "suspended"];

pub fn changed_tag(field: &str) -> String {
    format!("changed_{}", field)
}

pub fn license_status_tag(status: &str) -> String {
    format!("{}_license", status)
}

// ============================================================================
// TAG VALUE
// ============================================================================

/// Cell value after schema reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagValue {
    Flag(bool),
    /// Tag exists in some wave but was not computed for this one
    NotApplicable,
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Flag(true) => write!(f, "1"),
            TagValue::Flag(false) => write!(f, "0"),
            TagValue::NotApplicable => write!(f, ""),
        }
    }
}

// ============================================================================
// WAVE TAGS
// ============================================================================

/// Tag name → slug → flag for one wave. A tag absent from the map was not
/// computed for the wave.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveTags {
    columns: BTreeMap<String, BTreeMap<Slug, bool>>,
}

impl WaveTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) a whole tag column
    pub fn insert(&mut self, tag: impl Into<String>, column: BTreeMap<Slug, bool>) {
        self.columns.insert(tag.into(), column);
    }

    pub fn column(&self, tag: &str) -> Option<&BTreeMap<Slug, bool>> {
        self.columns.get(tag)
    }

    pub fn column_mut(&mut self, tag: &str) -> Option<&mut BTreeMap<Slug, bool>> {
        self.columns.get_mut(tag)
    }

    pub fn has(&self, tag: &str) -> bool {
        self.columns.contains_key(tag)
    }

    /// Flag for a slug; None when the tag is absent or the slug is unknown
    pub fn get(&self, tag: &str, slug: &str) -> Option<bool> {
        self.columns.get(tag)?.get(slug).copied()
    }

    pub fn is_set(&self, tag: &str, slug: &str) -> bool {
        self.get(tag, slug).unwrap_or(false)
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Slugs flagged 1 for the tag
    pub fn flagged(&self, tag: &str) -> BTreeSet<Slug> {
        self.columns
            .get(tag)
            .map(|column| {
                column
                    .iter()
                    .filter(|(_, flag)| **flag)
                    .map(|(slug, _)| slug.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Take every column of `other`, replacing same-named ones
    pub fn merge(&mut self, other: WaveTags) {
        self.columns.extend(other.columns);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Reconciled value: NotApplicable when the tag was skipped for this wave
    pub fn value(&self, tag: &str, slug: &str) -> TagValue {
        match self.columns.get(tag) {
            Some(column) => TagValue::Flag(column.get(slug).copied().unwrap_or(false)),
            None => TagValue::NotApplicable,
        }
    }
}

// ============================================================================
// SCHEMA RECONCILIATION
// ============================================================================

/// Union of the tag names observed across all waves, in a stable order
pub fn unified_tag_schema(waves: &[WaveTags]) -> Vec<String> {
    let names: BTreeSet<&str> = waves.iter().flat_map(|tags| tags.tag_names()).collect();
    names.into_iter().map(str::to_string).collect()
}

// ============================================================================
// TESTS
// ============================================================================
