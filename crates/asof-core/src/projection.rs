//! Flat output rows for presentation and export.
//!
//! Absent optional values become empty strings so downstream consumers
//! (spreadsheets, CSV/TSV exports) never see `null`.

use serde::{Deserialize, Serialize};

use crate::model::ComparisonRecord;
use crate::time::format_timestamp;

/// One exported row. Field order is the export column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRow {
    pub id: u32,
    #[serde(rename = "type")]
    pub work_item_type: String,
    pub title: String,
    pub created_date: String,
    pub area_path: String,
    pub state_a: String,
    pub changed_by_a: String,
    pub changed_date_a: String,
    pub state_b: String,
    pub changed_by_b: String,
    pub changed_date_b: String,
    pub changed: bool,
    pub target_release: String,
    pub board_column: String,
    pub error: String,
}

impl OutputRow {
    /// Column names in serialization order.
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
        "type",
        "title",
        "createdDate",
        "areaPath",
        "stateA",
        "changedByA",
        "changedDateA",
        "stateB",
        "changedByB",
        "changedDateB",
        "changed",
        "targetRelease",
        "boardColumn",
        "error",
    ];

    /// Cell values in [`COLUMNS`](Self::COLUMNS) order.
    #[must_use]
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.work_item_type.clone(),
            self.title.clone(),
            self.created_date.clone(),
            self.area_path.clone(),
            self.state_a.clone(),
            self.changed_by_a.clone(),
            self.changed_date_a.clone(),
            self.state_b.clone(),
            self.changed_by_b.clone(),
            self.changed_date_b.clone(),
            if self.changed { "Y" } else { "" }.to_string(),
            self.target_release.clone(),
            self.board_column.clone(),
            self.error.clone(),
        ]
    }
}

impl From<&ComparisonRecord> for OutputRow {
    fn from(record: &ComparisonRecord) -> Self {
        let fields = &record.fields;
        let (a, b) = (&record.snapshot_a, &record.snapshot_b);
        Self {
            id: fields.id.get(),
            work_item_type: fields.work_item_type.clone(),
            title: fields.title.clone(),
            created_date: fields.created_date.map(format_timestamp).unwrap_or_default(),
            area_path: fields.area_path.clone(),
            state_a: a.state.clone().unwrap_or_default(),
            changed_by_a: a.changed_by.clone().unwrap_or_default(),
            changed_date_a: a.changed_date.map(format_timestamp).unwrap_or_default(),
            state_b: b.state.clone().unwrap_or_default(),
            changed_by_b: b.changed_by.clone().unwrap_or_default(),
            changed_date_b: b.changed_date.map(format_timestamp).unwrap_or_default(),
            changed: record.changed,
            target_release: fields.target_release.clone().unwrap_or_default(),
            board_column: fields.board_column.clone().unwrap_or_default(),
            error: record
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or_default(),
        }
    }
}

/// Project records into rows, preserving order.
#[must_use]
pub fn project(records: &[ComparisonRecord]) -> Vec<OutputRow> {
    records.iter().map(OutputRow::from).collect()
}
