#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use runboard_core::{ColumnSet, RunRow, UncheckedKeys};
use runboard_store::ViewStore;
use serde_json::json;

fn run(id: &str, lr: &str, seed: &str, acc: f64) -> RunRow {
    let mut r = RunRow { run_id: id.into(), user: "ann".into(), start_time: 1_600_000_000_000, ..Default::default() };
    r.params.insert("lr".into(), json!(lr));
    r.params.insert("seed".into(), json!(seed));
    r.metrics.insert("acc".into(), json!(acc));
    r.tags.insert("team".into(), json!("vision"));
    r
}

fn keys(ks: &[&str]) -> BTreeSet<String> { ks.iter().map(|k| k.to_string()).collect() }

#[test]
fn toggle_twice_restores_original_despite_edits() {
    let rows = vec![run("a", "0.1", "7", 0.8), run("b", "0.2", "7", 0.9)];
    let mut store = ViewStore::new();
    store.set_unchecked("exp", ColumnSet::Metrics, keys(&["loss"]));
    let original = store.state("exp").persisted.unchecked_keys.clone();

    let on = store.toggle_diff("exp", &rows).persisted.clone();
    assert!(on.diff_switch_selected);
    assert!(on.unchecked_keys.params.contains("seed"));
    assert!(on.unchecked_keys.tags.contains("team"));
    assert!(on.unchecked_keys.metrics.contains("loss"));
    assert!(!on.unchecked_keys.params.contains("lr"));

    // edits while diff is on stay on the post-switch side
    store.set_unchecked("exp", ColumnSet::Params, keys(&["lr"]));
    store.set_unchecked("exp", ColumnSet::Tags, BTreeSet::new());
    let edited = store.state("exp").persisted;
    assert!(edited.is_consistent());
    assert_eq!(edited.post_switch_unchecked_keys.params, keys(&["lr"]));

    let off = store.toggle_diff("exp", &rows).persisted.clone();
    assert!(!off.diff_switch_selected);
    assert_eq!(off.unchecked_keys, original);
    assert!(off.is_consistent());
    assert_eq!(off.post_switch_unchecked_keys.params, keys(&["lr"]));
}

#[test]
fn experiments_are_independent() {
    let rows = vec![run("a", "0.1", "7", 0.8), run("b", "0.1", "7", 0.8)];
    let mut store = ViewStore::new();
    store.toggle_diff("one", &rows);
    assert!(store.state("one").persisted.diff_switch_selected);
    assert!(!store.state("two").persisted.diff_switch_selected);
    assert_eq!(store.state("two").persisted.unchecked_keys, UncheckedKeys::default());
}

#[test]
fn custom_diff_fn_is_used() {
    fn hide_everything_tagged(_: &[RunRow]) -> UncheckedKeys {
        let mut k = UncheckedKeys::default();
        k.tags.insert("team".into());
        k
    }
    let mut store = ViewStore::with_diff_fn(hide_everything_tagged);
    let s = store.toggle_diff("exp", &[]).persisted.clone();
    assert_eq!(s.unchecked_keys.tags, keys(&["team"]));
    assert!(s.unchecked_keys.params.is_empty());
}

#[test]
fn handle_sees_published_state() {
    let mut store = ViewStore::new();
    let handle = store.handle();
    let rx = handle.subscribe_epoch();
    store.set_unchecked("exp", ColumnSet::Params, keys(&["lr"]));
    store.set_unchecked("exp", ColumnSet::Tags, keys(&["team"]));
    assert_eq!(*rx.borrow(), 2);
    let snap = handle.current();
    assert_eq!(snap.epoch, 2);
    assert_eq!(handle.state("exp").persisted.unchecked_keys.tags, keys(&["team"]));
    assert!(handle.state("missing").persisted.unchecked_keys.is_empty());
}
