use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The effective state of one work item at one instant.
///
/// Derived by the resolver and never persisted. `resolved` is false only
/// when the underlying history was empty (or could not be fetched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointInTimeSnapshot {
    pub instant: DateTime<Utc>,
    pub state: Option<String>,
    pub changed_by: Option<String>,
    pub changed_date: Option<DateTime<Utc>>,
    pub resolved: bool,
    /// Index into the history of the revision that supplied the values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_index: Option<usize>,
    /// Malformed revisions ignored while scanning.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped_revisions: usize,
}

impl PointInTimeSnapshot {
    /// A snapshot for an item with no recorded history.
    #[must_use]
    pub const fn unresolved(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            state: None,
            changed_by: None,
            changed_date: None,
            resolved: false,
            revision_index: None,
            skipped_revisions: 0,
        }
    }

    /// True when the reported revision was recorded after the instant, i.e.
    /// the instant precedes the item's history and the earliest revision was
    /// reported instead.
    #[must_use]
    pub fn predates_history(&self) -> bool {
        self.changed_date.is_some_and(|changed| changed > self.instant)
    }

    /// Calendar day (UTC) of `changed_date`, the granularity used for
    /// change detection.
    #[must_use]
    pub fn changed_day(&self) -> Option<chrono::NaiveDate> {
        self.changed_date.map(|ts| ts.date_naive())
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &usize) -> bool {
    *n == 0
}
