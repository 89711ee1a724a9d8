//! CSV serialization of the run table.
//!
//! Column order is fixed: attribute columns, then params, metrics and tags,
//! each category's keys sorted. A column is dropped when its name is in the
//! unchecked set of its category. Fields are quoted only when they contain a
//! comma, a double quote or a line break.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::debug;

use runboard_core::{column_keys, render_value, AttributeColumn, ColumnSet, RunRow, UncheckedKeys};

/// Render `rows` as CSV, omitting every column listed in `unchecked`.
pub fn to_csv(rows: &[RunRow], unchecked: &UncheckedKeys) -> String {
    let started = Instant::now();
    let attrs: Vec<AttributeColumn> = AttributeColumn::ALL
        .iter()
        .copied()
        .filter(|c| !unchecked.is_unchecked(ColumnSet::Attributes, c.label()))
        .collect();
    let keyed: Vec<(ColumnSet, Vec<String>)> = [ColumnSet::Params, ColumnSet::Metrics, ColumnSet::Tags]
        .into_iter()
        .map(|set| {
            let keys = column_keys(rows, set).into_iter().filter(|k| !unchecked.is_unchecked(set, k)).collect();
            (set, keys)
        })
        .collect();

    let mut out = String::new();
    let mut header: Vec<String> = attrs.iter().map(|c| c.label().to_string()).collect();
    for (_, keys) in &keyed {
        header.extend(keys.iter().cloned());
    }
    push_line(&mut out, &header);

    for row in rows {
        let mut fields: Vec<String> = attrs.iter().map(|c| attribute_cell(row, *c)).collect();
        for (set, keys) in &keyed {
            let map = row.keyed(*set);
            for k in keys {
                fields.push(map.and_then(|m| m.get(k)).map(render_value).unwrap_or_default());
            }
        }
        push_line(&mut out, &fields);
    }

    debug!(rows = rows.len(), columns = header.len(), bytes = out.len(), "export: csv rendered");
    counter!("export_csv_total", 1u64);
    histogram!("export_csv_ms", started.elapsed().as_secs_f64() * 1000.0);
    out
}

fn push_line(out: &mut String, fields: &[String]) {
    for (i, f) in fields.iter().enumerate() {
        if i > 0 { out.push(','); }
        out.push_str(&escape_field(f));
    }
    out.push('\n');
}

/// Quote a field only when the format requires it; embedded quotes are doubled.
pub fn escape_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        std::borrow::Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        std::borrow::Cow::Borrowed(field)
    }
}

/// Display text of an attribute cell.
pub fn attribute_cell(row: &RunRow, col: AttributeColumn) -> String {
    match col {
        AttributeColumn::StartTime => format_timestamp(row.start_time),
        AttributeColumn::Duration => match row.end_time {
            Some(end) if row.start_time > 0 && end >= row.start_time => format_duration(end - row.start_time),
            _ => String::new(),
        },
        other => render_value(&other.raw_value(row)),
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC; empty for unset (zero or negative) timestamps.
pub fn format_timestamp(ms: i64) -> String {
    if ms <= 0 { return String::new(); }
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

/// Human duration: milliseconds under half a second, then s/min/h/d with one decimal.
pub fn format_duration(ms: i64) -> String {
    const SEC: f64 = 1000.0;
    const MIN: f64 = 60.0 * SEC;
    const HOUR: f64 = 60.0 * MIN;
    const DAY: f64 = 24.0 * HOUR;
    let d = ms as f64;
    if ms < 500 {
        format!("{}ms", ms)
    } else if d < MIN {
        format!("{:.1}s", d / SEC)
    } else if d < HOUR {
        format!("{:.1}min", d / MIN)
    } else if d < DAY {
        format!("{:.1}h", d / HOUR)
    } else {
        format!("{:.1}d", d / DAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_is_minimal() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(120), "120ms");
        assert_eq!(format_duration(1_500), "1.5s");
        assert_eq!(format_duration(90_000), "1.5min");
        assert_eq!(format_duration(2 * 3_600_000), "2.0h");
        assert_eq!(format_duration(36 * 3_600_000), "1.5d");
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp(0), "");
        assert_eq!(format_timestamp(1_600_000_000_000), "2020-09-13 12:26:40");
    }
}
