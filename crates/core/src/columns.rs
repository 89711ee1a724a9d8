//! Fixed attribute columns of the run table.
//!
//! Attribute columns are always listed before the keyed categories. Their
//! labels double as the keys stored in the ATTRIBUTES unchecked set.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RunRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AttributeColumn {
    StartTime,
    Duration,
    RunId,
    Name,
    SourceType,
    SourceName,
    User,
    Status,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub kind: AttributeColumn,
    pub label: &'static str,
    pub width: f32,
}

impl AttributeColumn {
    pub const ALL: [AttributeColumn; 8] = [
        AttributeColumn::StartTime,
        AttributeColumn::Duration,
        AttributeColumn::RunId,
        AttributeColumn::Name,
        AttributeColumn::SourceType,
        AttributeColumn::SourceName,
        AttributeColumn::User,
        AttributeColumn::Status,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AttributeColumn::StartTime => "Start Time",
            AttributeColumn::Duration => "Duration",
            AttributeColumn::RunId => "Run ID",
            AttributeColumn::Name => "Name",
            AttributeColumn::SourceType => "Source Type",
            AttributeColumn::SourceName => "Source Name",
            AttributeColumn::User => "User",
            AttributeColumn::Status => "Status",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.label().eq_ignore_ascii_case(label))
    }

    /// Raw (unformatted) value of this column for `row`, used for comparisons and sorting.
    pub fn raw_value(&self, row: &RunRow) -> Value {
        match self {
            AttributeColumn::StartTime => Value::from(row.start_time),
            AttributeColumn::Duration => match row.end_time {
                Some(end) if row.start_time > 0 => end
                    .checked_sub(row.start_time)
                    .filter(|d| *d >= 0)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            AttributeColumn::RunId => Value::from(row.run_id.as_str()),
            AttributeColumn::Name => row.name.as_deref().map(Value::from).unwrap_or(Value::Null),
            AttributeColumn::SourceType => Value::from(row.source_type.as_str()),
            AttributeColumn::SourceName => Value::from(row.source_name.as_str()),
            AttributeColumn::User => Value::from(row.user.as_str()),
            AttributeColumn::Status => Value::from(row.status.as_str()),
        }
    }
}

fn col(kind: AttributeColumn, width: f32) -> ColumnSpec {
    ColumnSpec { kind, label: kind.label(), width }
}

/// Column specs for the fixed attribute columns, in table order.
pub fn attribute_columns() -> Vec<ColumnSpec> {
    vec![
        col(AttributeColumn::StartTime, 160.0),
        col(AttributeColumn::Duration, 80.0),
        col(AttributeColumn::RunId, 260.0),
        col(AttributeColumn::Name, 160.0),
        col(AttributeColumn::SourceType, 100.0),
        col(AttributeColumn::SourceName, 200.0),
        col(AttributeColumn::User, 120.0),
        col(AttributeColumn::Status, 90.0),
    ]
}
