use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream work item identifier.
///
/// Assigned by the tracker and never reused within one comparison run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub u32);

impl WorkItemId {
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u32> for WorkItemId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// One recorded change to a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Upstream revision number (1-based).
    pub rev: u32,
    pub state: String,
    #[serde(default)]
    pub changed_by: Option<String>,
    /// `None` marks a malformed revision; the resolver skips it.
    #[serde(default)]
    pub changed_date: Option<DateTime<Utc>>,
}

impl Revision {
    /// Instant from which this revision's field values are in effect.
    #[must_use]
    pub const fn effective_from(&self) -> Option<DateTime<Utc>> {
        self.changed_date
    }

    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        self.changed_date.is_none()
    }
}

/// The full, chronologically ordered change history of one work item.
///
/// Index order is chronological order: the revision store adapter returns
/// revisions sorted by non-decreasing `changed_date`. An empty history is a
/// valid value and resolves to an unresolved snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionHistory {
    pub id: WorkItemId,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

impl RevisionHistory {
    #[must_use]
    pub const fn new(id: WorkItemId, revisions: Vec<Revision>) -> Self {
        Self { id, revisions }
    }

    #[must_use]
    pub const fn empty(id: WorkItemId) -> Self {
        Self {
            id,
            revisions: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Revision> {
        self.revisions.first()
    }

    /// Returns true when well-formed revisions appear in non-decreasing
    /// `changed_date` order. Malformed revisions are ignored.
    #[must_use]
    pub fn is_chronological(&self) -> bool {
        let mut last: Option<DateTime<Utc>> = None;
        for ts in self.revisions.iter().filter_map(|r| r.changed_date) {
            if last.is_some_and(|prev| ts < prev) {
                return false;
            }
            last = Some(ts);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rev(n: u32, state: &str, day: u32) -> Revision {
        Revision {
            rev: n,
            state: state.to_string(),
            changed_by: None,
            changed_date: Some(Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).single().expect("valid time")),
        }
    }

    #[test]
    fn work_item_id_parses_and_displays() {
        let id: WorkItemId = " 4521 ".parse().expect("valid id");
        assert_eq!(id, WorkItemId(4521));
        assert_eq!(id.to_string(), "4521");
        assert!("abc".parse::<WorkItemId>().is_err());
    }

    #[test]
    fn chronological_check_ignores_malformed() {
        let mut malformed = rev(2, "Active", 1);
        malformed.changed_date = None;
        let history = RevisionHistory::new(
            WorkItemId(1),
            vec![rev(1, "New", 2), malformed, rev(3, "Closed", 3)],
        );
        assert!(history.is_chronological());

        let out_of_order =
            RevisionHistory::new(WorkItemId(1), vec![rev(1, "New", 5), rev(2, "Active", 3)]);
        assert!(!out_of_order.is_chronological());
    }

    #[test]
    fn revision_deserializes_without_optional_fields() {
        let parsed: Revision =
            serde_json::from_str(r#"{"rev": 1, "state": "New"}"#).expect("parse revision");
        assert!(parsed.is_malformed());
        assert!(parsed.changed_by.is_none());
    }
}
