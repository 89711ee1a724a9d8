//! Runboard core types: column sets, hidden-column bookkeeping, run rows and errors.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub mod columns;

pub use columns::{AttributeColumn, ColumnSpec};

/// Identifier of an experiment whose run table owns a view state.
pub type ExperimentId = String;

/// Column categories of the run table, in display order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnSet {
    Attributes,
    Params,
    Metrics,
    Tags,
}

impl ColumnSet {
    pub const ALL: [ColumnSet; 4] = [ColumnSet::Attributes, ColumnSet::Params, ColumnSet::Metrics, ColumnSet::Tags];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnSet::Attributes => "attributes",
            ColumnSet::Params => "params",
            ColumnSet::Metrics => "metrics",
            ColumnSet::Tags => "tags",
        }
    }
}

impl std::str::FromStr for ColumnSet {
    type Err = RunboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attributes" | "attribute" | "attrs" => Ok(ColumnSet::Attributes),
            "params" | "param" => Ok(ColumnSet::Params),
            "metrics" | "metric" => Ok(ColumnSet::Metrics),
            "tags" | "tag" => Ok(ColumnSet::Tags),
            other => Err(RunboardError::Validation(format!("unknown column set '{}'", other))),
        }
    }
}

impl std::fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hidden column names, tracked per category.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UncheckedKeys {
    #[serde(default)]
    pub attributes: BTreeSet<String>,
    #[serde(default)]
    pub params: BTreeSet<String>,
    #[serde(default)]
    pub metrics: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl UncheckedKeys {
    pub fn get(&self, set: ColumnSet) -> &BTreeSet<String> {
        match set {
            ColumnSet::Attributes => &self.attributes,
            ColumnSet::Params => &self.params,
            ColumnSet::Metrics => &self.metrics,
            ColumnSet::Tags => &self.tags,
        }
    }

    pub fn get_mut(&mut self, set: ColumnSet) -> &mut BTreeSet<String> {
        match set {
            ColumnSet::Attributes => &mut self.attributes,
            ColumnSet::Params => &mut self.params,
            ColumnSet::Metrics => &mut self.metrics,
            ColumnSet::Tags => &mut self.tags,
        }
    }

    /// Replace the hidden keys of one category.
    pub fn set(&mut self, set: ColumnSet, keys: BTreeSet<String>) {
        *self.get_mut(set) = keys;
    }

    pub fn is_unchecked(&self, set: ColumnSet, key: &str) -> bool {
        self.get(set).contains(key)
    }

    /// Category-wise union of `self` and `other`.
    pub fn union(&self, other: &UncheckedKeys) -> UncheckedKeys {
        let mut out = self.clone();
        for set in ColumnSet::ALL {
            out.get_mut(set).extend(other.get(set).iter().cloned());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        ColumnSet::ALL.iter().all(|s| self.get(*s).is_empty())
    }

    pub fn len(&self) -> usize {
        ColumnSet::ALL.iter().map(|s| self.get(*s).len()).sum()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    #[default]
    Active,
    Deleted,
}

/// One run as shown in the experiment table.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunRow {
    pub run_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub lifecycle_stage: LifecycleStage,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: BTreeMap<String, serde_json::Value>,
}

impl RunRow {
    /// Raw value map backing a keyed category. Attributes are not keyed; see [`AttributeColumn`].
    pub fn keyed(&self, set: ColumnSet) -> Option<&BTreeMap<String, serde_json::Value>> {
        match set {
            ColumnSet::Attributes => None,
            ColumnSet::Params => Some(&self.params),
            ColumnSet::Metrics => Some(&self.metrics),
            ColumnSet::Tags => Some(&self.tags),
        }
    }
}

/// Sorted union of the keys seen for `set` across `rows`. For attributes this is every fixed column label.
pub fn column_keys(rows: &[RunRow], set: ColumnSet) -> Vec<String> {
    if set == ColumnSet::Attributes {
        return AttributeColumn::ALL.iter().map(|c| c.label().to_string()).collect();
    }
    let mut keys: BTreeSet<&str> = BTreeSet::new();
    for row in rows {
        if let Some(map) = row.keyed(set) {
            keys.extend(map.keys().map(|k| k.as_str()));
        }
    }
    keys.into_iter().map(|k| k.to_string()).collect()
}

/// Stringify a raw cell value: strings as-is, null as empty, everything else as JSON text.
pub fn render_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Column-name filter: comma-separated terms, matched as case-insensitive substrings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub struct KeyFilter {
    raw: String,
    terms: Vec<String>,
}

impl KeyFilter {
    pub fn parse(raw: &str) -> Self {
        let terms = raw
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { raw: raw.to_string(), terms }
    }

    pub fn raw(&self) -> &str { &self.raw }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    pub fn matches(&self, key: &str) -> bool {
        if self.terms.is_empty() { return true; }
        let k = key.to_lowercase();
        self.terms.iter().any(|t| k.contains(t.as_str()))
    }

    pub fn apply<'a>(&self, keys: &'a [String]) -> Vec<&'a String> {
        keys.iter().filter(|k| self.matches(k)).collect()
    }
}

impl From<String> for KeyFilter {
    fn from(raw: String) -> Self { KeyFilter::parse(&raw) }
}

impl From<KeyFilter> for String {
    fn from(f: KeyFilter) -> Self { f.raw }
}

/// Errors surfaced by Runboard crates.
#[derive(Debug, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunboardError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type RunboardResult<T> = Result<T, RunboardError>;

pub mod prelude {
    pub use super::{
        column_keys, render_value, AttributeColumn, ColumnSet, ExperimentId, KeyFilter, LifecycleStage, RunRow,
        RunStatus, RunboardError, RunboardResult, UncheckedKeys,
    };
}
