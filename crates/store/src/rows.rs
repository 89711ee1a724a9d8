//! Row filtering, ordering and column visibility derived from a [`ViewState`].

#![forbid(unsafe_code)]

use std::cmp::Ordering;

use serde_json::Value;

use runboard_core::{column_keys, AttributeColumn, ColumnSet, LifecycleStage, RunRow, UncheckedKeys};

use crate::{SortKey, ViewState};

/// Visible column names per category, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleColumns {
    pub attributes: Vec<String>,
    pub params: Vec<String>,
    pub metrics: Vec<String>,
    pub tags: Vec<String>,
}

impl VisibleColumns {
    pub fn get(&self, set: ColumnSet) -> &[String] {
        match set {
            ColumnSet::Attributes => &self.attributes,
            ColumnSet::Params => &self.params,
            ColumnSet::Metrics => &self.metrics,
            ColumnSet::Tags => &self.tags,
        }
    }
}

/// Columns that pass the key filters and are not unchecked.
pub fn visible_columns(rows: &[RunRow], state: &ViewState) -> VisibleColumns {
    let unchecked = &state.persisted.unchecked_keys;
    let pick = |set: ColumnSet| -> Vec<String> {
        column_keys(rows, set)
            .into_iter()
            .filter(|k| match set {
                ColumnSet::Params => state.param_key_filter.matches(k),
                ColumnSet::Metrics => state.metric_key_filter.matches(k),
                _ => true,
            })
            .filter(|k| !unchecked.is_unchecked(set, k))
            .collect()
    };
    VisibleColumns {
        attributes: pick(ColumnSet::Attributes),
        params: pick(ColumnSet::Params),
        metrics: pick(ColumnSet::Metrics),
        tags: pick(ColumnSet::Tags),
    }
}

/// Every column of `rows` that [`visible_columns`] leaves out: the unchecked
/// keys plus any param or metric key rejected by the key filters.
pub fn hidden_columns(rows: &[RunRow], state: &ViewState) -> UncheckedKeys {
    let visible = visible_columns(rows, state);
    let mut hidden = state.persisted.unchecked_keys.clone();
    for set in ColumnSet::ALL {
        let shown = visible.get(set);
        hidden.get_mut(set).extend(column_keys(rows, set).into_iter().filter(|k| !shown.contains(k)));
    }
    hidden
}

/// Rows matching the lifecycle filter and search input, ordered by the sort spec.
pub fn visible_rows<'a>(rows: &'a [RunRow], state: &ViewState) -> Vec<&'a RunRow> {
    let stage: LifecycleStage = state.lifecycle_filter.into();
    let needle = state.search_input.trim().to_lowercase();
    let mut out: Vec<&RunRow> = rows
        .iter()
        .filter(|r| r.lifecycle_stage == stage)
        .filter(|r| {
            needle.is_empty()
                || r.run_id.to_lowercase().contains(&needle)
                || r.name.as_deref().map(|n| n.to_lowercase().contains(&needle)).unwrap_or(false)
        })
        .collect();
    let key = &state.sort.key;
    let asc = state.sort.ascending;
    out.sort_by(|a, b| {
        let (va, vb) = (sort_value(a, key), sort_value(b, key));
        match (va, vb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = compare_values(&x, &y);
                if asc { ord } else { ord.reverse() }
            }
        }
    });
    out
}

fn sort_value(row: &RunRow, key: &SortKey) -> Option<Value> {
    let v = match key {
        SortKey::Attribute(col) => col.raw_value(row),
        SortKey::Param(k) => row.params.get(k).cloned()?,
        SortKey::Metric(k) => row.metrics.get(k).cloned()?,
        SortKey::Tag(k) => row.tags.get(k).cloned()?,
    };
    if v.is_null() { None } else { Some(v) }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numbers (and numeric strings) compare numerically, everything else by rendered text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    runboard_core::render_value(a).cmp(&runboard_core::render_value(b))
}

impl SortKey {
    /// Parse `attributes.<label>`, `params.<key>`, `metrics.<key>` or `tags.<key>`.
    pub fn parse(s: &str) -> Option<SortKey> {
        let (set, key) = s.split_once('.')?;
        let key = key.trim_matches('`');
        match set.parse::<ColumnSet>().ok()? {
            ColumnSet::Attributes => AttributeColumn::from_label(key).map(SortKey::Attribute),
            ColumnSet::Params => Some(SortKey::Param(key.to_string())),
            ColumnSet::Metrics => Some(SortKey::Metric(key.to_string())),
            ColumnSet::Tags => Some(SortKey::Tag(key.to_string())),
        }
    }
}
