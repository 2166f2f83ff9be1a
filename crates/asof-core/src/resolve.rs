//! Point-in-time resolution of a work item's state.
//!
//! # Algorithm
//!
//! Revisions are scanned in index (= chronological) order while tracking the
//! last revision whose `changed_date <= instant`. The scan stops at the first
//! revision dated after the instant, so the cost is proportional to the
//! number of revisions up to the cutover, not the whole history.
//!
//! # Fallback
//!
//! When the instant precedes every recorded revision, the earliest
//! well-formed revision is reported instead of an unresolved snapshot: the
//! item is treated as if it already existed in its first known state. If no
//! revision carries a `changed_date`, the first revision is reported undated. This can misrepresent an
//! item that had not yet been created at the instant; callers that display
//! pre-creation instants should say so.
//!
//! # Precision
//!
//! The cutover compares full timestamps. Day-granularity comparison is only
//! used later, for change detection.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::ErrorCode;
use crate::model::{PointInTimeSnapshot, Revision, RevisionHistory};

/// Resolve the state of `history` effective at `instant`.
///
/// Never fails. Empty history yields `resolved = false`; malformed
/// revisions (no `changed_date`) are skipped, logged and counted. A history
/// with no well-formed revision at all reports its first revision, undated.
#[must_use]
pub fn resolve(history: &RevisionHistory, instant: DateTime<Utc>) -> PointInTimeSnapshot {
    let mut earliest: Option<usize> = None;
    let mut selected: Option<usize> = None;
    let mut skipped = 0_usize;

    for (index, revision) in history.revisions.iter().enumerate() {
        let Some(changed) = revision.effective_from() else {
            skipped += 1;
            warn!(
                code = %ErrorCode::MalformedRevision,
                id = %history.id,
                rev = revision.rev,
                index,
                "skipping revision without changed date"
            );
            continue;
        };

        earliest.get_or_insert(index);
        if changed > instant {
            break;
        }
        selected = Some(index);
    }

    if let Some(index) = selected.or(earliest) {
        return snapshot_from(&history.revisions[index], index, instant, skipped);
    }
    history.first().map_or_else(
        || PointInTimeSnapshot::unresolved(instant),
        |first| snapshot_from(first, 0, instant, skipped),
    )
}

fn snapshot_from(
    revision: &Revision,
    index: usize,
    instant: DateTime<Utc>,
    skipped_revisions: usize,
) -> PointInTimeSnapshot {
    PointInTimeSnapshot {
        instant,
        state: Some(revision.state.clone()),
        changed_by: revision.changed_by.clone(),
        changed_date: revision.effective_from(),
        resolved: true,
        revision_index: Some(index),
        skipped_revisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkItemId;
    use crate::time::parse_instant;

    fn rev(n: u32, state: &str, changed: &str, by: &str) -> Revision {
        Revision {
            rev: n,
            state: state.to_string(),
            changed_by: Some(by.to_string()),
            changed_date: Some(parse_instant(changed).expect("valid timestamp")),
        }
    }

    fn sample_history() -> RevisionHistory {
        RevisionHistory::new(
            WorkItemId(7),
            vec![
                rev(1, "New", "2024-01-01T10:00", "Ana"),
                rev(2, "Active", "2024-03-01T09:00", "Ben"),
            ],
        )
    }

    fn at(input: &str) -> DateTime<Utc> {
        parse_instant(input).expect("valid instant")
    }

    #[test]
    fn between_revisions_picks_earlier() {
        let snap = resolve(&sample_history(), at("2024-02-01"));
        assert!(snap.resolved);
        assert_eq!(snap.state.as_deref(), Some("New"));
        assert_eq!(snap.changed_by.as_deref(), Some("Ana"));
        assert_eq!(snap.revision_index, Some(0));
    }

    #[test]
    fn after_last_revision_picks_last() {
        let snap = resolve(&sample_history(), at("2024-04-01"));
        assert_eq!(snap.state.as_deref(), Some("Active"));
        assert_eq!(snap.changed_date, Some(at("2024-03-01T09:00")));
        assert_eq!(snap.revision_index, Some(1));
    }

    #[test]
    fn before_history_falls_back_to_first() {
        let snap = resolve(&sample_history(), at("2023-12-01"));
        assert!(snap.resolved);
        assert_eq!(snap.state.as_deref(), Some("New"));
        assert_eq!(snap.changed_by.as_deref(), Some("Ana"));
        assert_eq!(snap.revision_index, Some(0));
        assert!(snap.predates_history());
        assert!(!resolve(&sample_history(), at("2024-02-01")).predates_history());
    }

    #[test]
    fn cutover_uses_full_precision() {
        let history = sample_history();
        let one_second_before = resolve(&history, at("2024-03-01T08:59:59Z"));
        let exactly = resolve(&history, at("2024-03-01T09:00:00Z"));
        assert_eq!(one_second_before.state.as_deref(), Some("New"));
        assert_eq!(exactly.state.as_deref(), Some("Active"));
    }

    #[test]
    fn empty_history_is_unresolved() {
        let snap = resolve(&RevisionHistory::empty(WorkItemId(1)), at("2024-01-01"));
        assert!(!snap.resolved);
        assert!(snap.state.is_none());
        assert!(snap.changed_by.is_none());
        assert!(snap.changed_date.is_none());
    }

    #[test]
    fn malformed_revision_is_skipped_not_fatal() {
        let mut history = sample_history();
        history.revisions.insert(
            1,
            Revision {
                rev: 99,
                state: "Bogus".into(),
                changed_by: None,
                changed_date: None,
            },
        );

        let snap = resolve(&history, at("2024-04-01"));
        assert_eq!(snap.state.as_deref(), Some("Active"));
        assert_eq!(snap.skipped_revisions, 1);
        assert_eq!(snap.revision_index, Some(2));
    }

    #[test]
    fn fallback_skips_leading_malformed_revision() {
        let mut history = sample_history();
        history.revisions.insert(
            0,
            Revision {
                rev: 0,
                state: "Bogus".into(),
                changed_by: None,
                changed_date: None,
            },
        );
        let snap = resolve(&history, at("2023-06-01"));
        assert_eq!(snap.state.as_deref(), Some("New"));
        assert_eq!(snap.revision_index, Some(1));
    }

    #[test]
    fn only_malformed_revisions_report_first_state() {
        let history = RevisionHistory::new(
            WorkItemId(4),
            vec![
                Revision {
                    rev: 1,
                    state: "New".into(),
                    changed_by: Some("Ana".into()),
                    changed_date: None,
                },
                Revision {
                    rev: 2,
                    state: "Active".into(),
                    changed_by: None,
                    changed_date: None,
                },
            ],
        );
        let snap = resolve(&history, at("2024-01-01"));
        assert!(snap.resolved);
        assert_eq!(snap.state.as_deref(), Some("New"));
        assert_eq!(snap.changed_by.as_deref(), Some("Ana"));
        assert_eq!(snap.changed_date, None);
        assert_eq!(snap.revision_index, Some(0));
        assert_eq!(snap.skipped_revisions, 2);
        assert!(!snap.predates_history());
    }


    #[test]
    fn equal_timestamps_take_the_later_index() {
        let history = RevisionHistory::new(
            WorkItemId(3),
            vec![
                rev(1, "New", "2024-01-01T10:00", "Ana"),
                rev(2, "Active", "2024-01-01T10:00", "Ana"),
            ],
        );
        let snap = resolve(&history, at("2024-01-01T10:00"));
        assert_eq!(snap.state.as_deref(), Some("Active"));
    }
}
