#![forbid(unsafe_code)]

use runboard_core::{ColumnSet, RunRow, RunStatus, UncheckedKeys};
use runboard_export::to_csv;
use serde_json::json;

fn rows() -> Vec<RunRow> {
    let mut a = RunRow {
        run_id: "r1".into(),
        name: Some("baseline".into()),
        start_time: 1_600_000_000_000,
        end_time: Some(1_600_000_001_500),
        source_type: "LOCAL".into(),
        source_name: "train.py".into(),
        user: "ann".into(),
        status: RunStatus::Finished,
        ..Default::default()
    };
    a.params.insert("lr".into(), json!("0.1"));
    a.metrics.insert("acc".into(), json!(0.9));
    a.tags.insert("note".into(), json!("fast, cheap"));

    let mut b = RunRow { run_id: "r2".into(), start_time: 1_600_000_000_000, status: RunStatus::Running, ..Default::default() };
    b.params.insert("seed".into(), json!("7"));
    b.tags.insert("weird".into(), json!({"a": [1, 2]}));
    vec![a, b]
}

fn header(csv: &str) -> Vec<String> {
    csv.lines().next().unwrap().split(',').map(|s| s.to_string()).collect()
}

#[test]
fn full_table_layout() {
    let csv = to_csv(&rows(), &UncheckedKeys::default());
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "Start Time,Duration,Run ID,Name,Source Type,Source Name,User,Status,lr,seed,acc,note,weird"
    );
    assert_eq!(
        lines[1],
        "2020-09-13 12:26:40,1.5s,r1,baseline,LOCAL,train.py,ann,FINISHED,0.1,,0.9,\"fast, cheap\","
    );
    assert_eq!(
        lines[2],
        "2020-09-13 12:26:40,,r2,,,,,RUNNING,,7,,,\"{\"\"a\"\":[1,2]}\""
    );
}

#[test]
fn omits_exactly_unchecked_columns() {
    let mut unchecked = UncheckedKeys::default();
    unchecked.attributes.insert("User".into());
    unchecked.params.insert("seed".into());
    unchecked.metrics.insert("acc".into());
    unchecked.tags.insert("weird".into());
    // a name hidden in another category does not leak across
    unchecked.tags.insert("lr".into());

    let csv = to_csv(&rows(), &unchecked);
    let h = header(&csv);
    for (set, key) in [(ColumnSet::Attributes, "User"), (ColumnSet::Params, "seed"), (ColumnSet::Metrics, "acc"), (ColumnSet::Tags, "weird")] {
        assert!(!h.contains(&key.to_string()), "{} column {} should be hidden", set, key);
    }
    assert_eq!(h, vec!["Start Time", "Duration", "Run ID", "Name", "Source Type", "Source Name", "Status", "lr", "note"]);
    for line in csv.lines().skip(1) {
        assert!(!line.contains("ann"));
    }
}

#[test]
fn empty_rows_still_emit_attribute_header() {
    let csv = to_csv(&[], &UncheckedKeys::default());
    assert_eq!(csv, "Start Time,Duration,Run ID,Name,Source Type,Source Name,User,Status\n");
}
