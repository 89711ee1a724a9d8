//! Runboard view-state store: per-experiment table state driven by typed actions.
//!
//! `reduce` is pure. [`ViewStore`] owns one [`ViewState`] per experiment,
//! applies actions through `reduce` and publishes a snapshot after every
//! change so readers on other tasks can observe it without locking.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use metrics::counter;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use runboard_core::{AttributeColumn, ColumnSet, ExperimentId, KeyFilter, LifecycleStage, RunRow, UncheckedKeys};

pub mod diff;
pub mod rows;

pub use diff::{compute_diff_columns, DiffFn};
pub use rows::{hidden_columns, visible_columns, visible_rows, VisibleColumns};

/// Column visibility that survives navigation, including the diff-switch history.
///
/// While `diff_switch_selected` is set, `unchecked_keys` mirrors
/// `post_switch_unchecked_keys`; otherwise it mirrors `pre_switch_unchecked_keys`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PersistedViewState {
    #[serde(default)]
    pub unchecked_keys: UncheckedKeys,
    #[serde(default)]
    pub diff_switch_selected: bool,
    #[serde(default)]
    pub pre_switch_unchecked_keys: UncheckedKeys,
    #[serde(default)]
    pub post_switch_unchecked_keys: UncheckedKeys,
}

impl PersistedViewState {
    pub fn set_unchecked(&mut self, set: ColumnSet, keys: BTreeSet<String>) {
        if self.diff_switch_selected {
            self.post_switch_unchecked_keys.set(set, keys.clone());
        } else {
            self.pre_switch_unchecked_keys.set(set, keys.clone());
        }
        self.unchecked_keys.set(set, keys);
    }

    /// Switch diff view on; `diff_columns` are hidden on top of what is already hidden.
    pub fn enable_diff(&mut self, diff_columns: &UncheckedKeys) {
        if self.diff_switch_selected { return; }
        self.pre_switch_unchecked_keys = self.unchecked_keys.clone();
        self.post_switch_unchecked_keys = self.unchecked_keys.union(diff_columns);
        self.unchecked_keys = self.post_switch_unchecked_keys.clone();
        self.diff_switch_selected = true;
    }

    /// Switch diff view off, restoring the keys hidden before it was enabled.
    ///
    /// Edits made while diff was on stay on the post-switch side and are not
    /// carried over; the next `enable_diff` recomputes that side from scratch.
    pub fn disable_diff(&mut self) {
        if !self.diff_switch_selected { return; }
        self.unchecked_keys = self.pre_switch_unchecked_keys.clone();
        self.diff_switch_selected = false;
    }

    pub fn is_consistent(&self) -> bool {
        if self.diff_switch_selected {
            self.unchecked_keys == self.post_switch_unchecked_keys
        } else {
            self.unchecked_keys == self.pre_switch_unchecked_keys
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortKey {
    Attribute(AttributeColumn),
    Param(String),
    Metric(String),
    Tag(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self { key: SortKey::Attribute(AttributeColumn::StartTime), ascending: false }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleFilter {
    #[default]
    Active,
    Deleted,
}

impl From<LifecycleFilter> for LifecycleStage {
    fn from(f: LifecycleFilter) -> Self {
        match f {
            LifecycleFilter::Active => LifecycleStage::Active,
            LifecycleFilter::Deleted => LifecycleStage::Deleted,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnLayout {
    #[default]
    Compact,
    Grid,
}

/// Everything the run table remembers for one experiment.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ViewState {
    #[serde(default)]
    pub persisted: PersistedViewState,
    #[serde(default)]
    pub search_input: String,
    #[serde(default)]
    pub param_key_filter: KeyFilter,
    #[serde(default)]
    pub metric_key_filter: KeyFilter,
    #[serde(default)]
    pub lifecycle_filter: LifecycleFilter,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub layout: ColumnLayout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewAction {
    SetUnchecked { set: ColumnSet, keys: BTreeSet<String> },
    EnableDiff { diff_columns: UncheckedKeys },
    DisableDiff,
    SetSearch(String),
    SetParamKeyFilter(String),
    SetMetricKeyFilter(String),
    SetLifecycle(LifecycleFilter),
    SetSort(SortSpec),
    SetLayout(ColumnLayout),
    Reset,
}

impl ViewAction {
    fn name(&self) -> &'static str {
        match self {
            ViewAction::SetUnchecked { .. } => "set_unchecked",
            ViewAction::EnableDiff { .. } => "enable_diff",
            ViewAction::DisableDiff => "disable_diff",
            ViewAction::SetSearch(_) => "set_search",
            ViewAction::SetParamKeyFilter(_) => "set_param_key_filter",
            ViewAction::SetMetricKeyFilter(_) => "set_metric_key_filter",
            ViewAction::SetLifecycle(_) => "set_lifecycle",
            ViewAction::SetSort(_) => "set_sort",
            ViewAction::SetLayout(_) => "set_layout",
            ViewAction::Reset => "reset",
        }
    }
}

/// Apply one action to a state, returning the next state.
pub fn reduce(state: &ViewState, action: ViewAction) -> ViewState {
    let mut next = state.clone();
    match action {
        ViewAction::SetUnchecked { set, keys } => next.persisted.set_unchecked(set, keys),
        ViewAction::EnableDiff { diff_columns } => next.persisted.enable_diff(&diff_columns),
        ViewAction::DisableDiff => next.persisted.disable_diff(),
        ViewAction::SetSearch(s) => next.search_input = s,
        ViewAction::SetParamKeyFilter(s) => next.param_key_filter = KeyFilter::parse(&s),
        ViewAction::SetMetricKeyFilter(s) => next.metric_key_filter = KeyFilter::parse(&s),
        ViewAction::SetLifecycle(l) => next.lifecycle_filter = l,
        ViewAction::SetSort(s) => next.sort = s,
        ViewAction::SetLayout(l) => next.layout = l,
        ViewAction::Reset => next = ViewState::default(),
    }
    next
}

/// Published view of all experiment states.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    pub epoch: u64,
    pub states: FxHashMap<ExperimentId, ViewState>,
}

/// Owner of per-experiment view state.
pub struct ViewStore {
    states: FxHashMap<ExperimentId, ViewState>,
    diff: DiffFn,
    epoch: u64,
    snap: Arc<ArcSwap<ViewSnapshot>>,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
}

impl Default for ViewStore {
    fn default() -> Self { Self::new() }
}

impl ViewStore {
    pub fn new() -> Self { Self::with_diff_fn(compute_diff_columns) }

    /// Use a custom function to derive diff-hidden columns.
    pub fn with_diff_fn(diff: DiffFn) -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            states: FxHashMap::default(),
            diff,
            epoch: 0,
            snap: Arc::new(ArcSwap::from_pointee(ViewSnapshot::default())),
            epoch_tx,
            epoch_rx,
        }
    }

    /// Current state for an experiment; defaults when never touched.
    pub fn state(&self, experiment: &str) -> ViewState {
        self.states.get(experiment).cloned().unwrap_or_default()
    }

    pub fn dispatch(&mut self, experiment: &str, action: ViewAction) -> &ViewState {
        let name = action.name();
        let prev = self.states.remove(experiment).unwrap_or_default();
        let next = reduce(&prev, action);
        debug!(experiment = %experiment, action = name, unchecked = next.persisted.unchecked_keys.len(), diff = next.persisted.diff_switch_selected, "view: action applied");
        counter!("view_actions_total", 1u64);
        self.states.insert(experiment.to_string(), next);
        self.publish();
        // inserted just above
        &self.states[experiment]
    }

    pub fn set_unchecked(&mut self, experiment: &str, set: ColumnSet, keys: BTreeSet<String>) -> &ViewState {
        self.dispatch(experiment, ViewAction::SetUnchecked { set, keys })
    }

    /// Flip diff view. Diff columns are computed from `rows` only when switching on.
    pub fn toggle_diff(&mut self, experiment: &str, rows: &[RunRow]) -> &ViewState {
        let on = self.states.get(experiment).map(|s| s.persisted.diff_switch_selected).unwrap_or(false);
        let action = if on {
            ViewAction::DisableDiff
        } else {
            ViewAction::EnableDiff { diff_columns: (self.diff)(rows) }
        };
        self.dispatch(experiment, action)
    }

    /// Install a previously persisted state (e.g. loaded from disk).
    pub fn restore(&mut self, experiment: &str, state: ViewState) {
        self.states.insert(experiment.to_string(), state);
        self.publish();
    }

    pub fn experiments(&self) -> impl Iterator<Item = &ExperimentId> { self.states.keys() }

    pub fn handle(&self) -> StoreHandle {
        StoreHandle { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_rx.clone() }
    }

    fn publish(&mut self) {
        self.epoch = self.epoch.saturating_add(1);
        self.snap.store(Arc::new(ViewSnapshot { epoch: self.epoch, states: self.states.clone() }));
        let _ = self.epoch_tx.send(self.epoch);
    }
}

/// Read side of a [`ViewStore`].
#[derive(Clone)]
pub struct StoreHandle {
    snap: Arc<ArcSwap<ViewSnapshot>>,
    epoch_rx: watch::Receiver<u64>,
}

impl StoreHandle {
    pub fn current(&self) -> Arc<ViewSnapshot> { self.snap.load_full() }
    pub fn state(&self, experiment: &str) -> ViewState {
        self.snap.load().states.get(experiment).cloned().unwrap_or_default()
    }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}
