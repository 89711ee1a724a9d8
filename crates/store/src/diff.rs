//! Diff view: which columns carry the same value on every displayed row.

#![forbid(unsafe_code)]

use runboard_core::{column_keys, AttributeColumn, ColumnSet, RunRow, UncheckedKeys};

/// Signature of the function used to derive diff-hidden columns.
pub type DiffFn = fn(&[RunRow]) -> UncheckedKeys;

/// Columns whose values are identical across all `rows`, per category.
///
/// A run missing a key counts as a distinct value, so a key present on only
/// some runs is never hidden. An empty table hides nothing.
pub fn compute_diff_columns(rows: &[RunRow]) -> UncheckedKeys {
    let mut out = UncheckedKeys::default();
    let Some((first, rest)) = rows.split_first() else { return out; };

    for col in AttributeColumn::ALL {
        let v0 = col.raw_value(first);
        if rest.iter().all(|r| col.raw_value(r) == v0) {
            out.attributes.insert(col.label().to_string());
        }
    }

    for set in [ColumnSet::Params, ColumnSet::Metrics, ColumnSet::Tags] {
        for key in column_keys(rows, set) {
            let v0 = first.keyed(set).and_then(|m| m.get(&key));
            if v0.is_some() && rest.iter().all(|r| r.keyed(set).and_then(|m| m.get(&key)) == v0) {
                out.get_mut(set).insert(key);
            }
        }
    }
    out
}
