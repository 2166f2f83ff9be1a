use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::revision::WorkItemId;
use super::snapshot::PointInTimeSnapshot;
use crate::error::ErrorCode;

/// Upstream field reference names in the fixed projection.
pub mod fields {
    pub const ID: &str = "System.Id";
    pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
    pub const TITLE: &str = "System.Title";
    pub const STATE: &str = "System.State";
    pub const CREATED_DATE: &str = "System.CreatedDate";
    pub const AREA_PATH: &str = "System.AreaPath";
    pub const ITERATION_PATH: &str = "System.IterationPath";
    pub const TARGET_RELEASE: &str = "Custom.TargetRelease";
    pub const BOARD_COLUMN: &str = "System.BoardColumn";
    pub const CHANGED_BY: &str = "System.ChangedBy";
    pub const CHANGED_DATE: &str = "System.ChangedDate";

    /// Fields requested for every work item in a batch fetch.
    pub const PROJECTION: &[&str] = &[
        ID,
        WORK_ITEM_TYPE,
        TITLE,
        STATE,
        CREATED_DATE,
        AREA_PATH,
        ITERATION_PATH,
        TARGET_RELEASE,
        BOARD_COLUMN,
    ];
}

/// Static (non-historical) fields of a work item, as of query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemFields {
    pub id: WorkItemId,
    #[serde(default)]
    pub work_item_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub area_path: String,
    #[serde(default)]
    pub iteration_path: String,
    #[serde(default)]
    pub target_release: Option<String>,
    #[serde(default)]
    pub board_column: Option<String>,
}

impl WorkItemFields {
    /// Fields for an id the upstream matched but did not return details for.
    #[must_use]
    pub fn placeholder(id: WorkItemId) -> Self {
        Self {
            id,
            work_item_type: String::new(),
            title: String::new(),
            state: String::new(),
            created_date: None,
            area_path: String::new(),
            iteration_path: String::new(),
            target_release: None,
            board_column: None,
        }
    }
}

/// Why an item's snapshots could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&crate::error::AsofError> for ItemError {
    fn from(err: &crate::error::AsofError) -> Self {
        Self {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

/// One row of comparison output: an item resolved at two instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub fields: WorkItemFields,
    pub snapshot_a: PointInTimeSnapshot,
    pub snapshot_b: PointInTimeSnapshot,
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl ComparisonRecord {
    #[must_use]
    pub const fn id(&self) -> WorkItemId {
        self.fields.id
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
