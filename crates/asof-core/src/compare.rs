//! Dual-snapshot comparison.
//!
//! Each item's history is fetched once and resolved at both instants. The
//! resulting snapshots are diffed with day-granularity dates: resolution is
//! exact, change detection is coarse.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::AuditSender;
use crate::error::AsofError;
use crate::model::{
    ComparisonRecord, ItemError, PointInTimeSnapshot, RevisionHistory, WorkItemFields,
};
use crate::plan::{Selection, fetch_selection};
use crate::resolve::resolve;
use crate::source::WorkItemSource;

/// Default ceiling on concurrent history fetches.
pub const DEFAULT_ITEM_CONCURRENCY: usize = 16;
/// Default ceiling on concurrent field batch fetches.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Request-scoped knobs for one comparison.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub item_concurrency: usize,
    pub batch_concurrency: usize,
    pub audit: AuditSender,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            item_concurrency: DEFAULT_ITEM_CONCURRENCY,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            audit: AuditSender::disabled(),
        }
    }
}

/// Whether two snapshots of the same item differ.
///
/// True when the states differ or the `changed_date`s fall on different
/// UTC calendar days. An unresolved snapshot differs from any resolved one.
#[must_use]
pub fn is_changed(a: &PointInTimeSnapshot, b: &PointInTimeSnapshot) -> bool {
    if a.resolved != b.resolved {
        return true;
    }
    a.state != b.state || a.changed_day() != b.changed_day()
}

/// Resolve one history at both instants and diff the results.
#[must_use]
pub fn compare(
    fields: WorkItemFields,
    history: &RevisionHistory,
    instant_a: DateTime<Utc>,
    instant_b: DateTime<Utc>,
) -> ComparisonRecord {
    let snapshot_a = resolve(history, instant_a);
    let snapshot_b = resolve(history, instant_b);
    let changed = is_changed(&snapshot_a, &snapshot_b);
    ComparisonRecord {
        fields,
        snapshot_a,
        snapshot_b,
        changed,
        error: None,
    }
}

/// Record for an item whose history could not be fetched.
#[must_use]
pub fn failed_record(
    fields: WorkItemFields,
    error: &AsofError,
    instant_a: DateTime<Utc>,
    instant_b: DateTime<Utc>,
) -> ComparisonRecord {
    let snapshot_a = PointInTimeSnapshot::unresolved(instant_a);
    let snapshot_b = PointInTimeSnapshot::unresolved(instant_b);
    let changed = is_changed(&snapshot_a, &snapshot_b);
    ComparisonRecord {
        fields,
        snapshot_a,
        snapshot_b,
        changed,
        error: Some(ItemError::from(error)),
    }
}

/// Compare every work item matched by `selection` at two instants.
///
/// Output order equals the upstream query order, whatever order the
/// per-item fetches complete in. Per-item fetch failures are recorded on
/// the item; only selection-level failures abort. Dropping the returned
/// future abandons in-flight fetches and discards partial results.
///
/// # Errors
///
/// Returns selection validation, query or field batch failures.
pub async fn compare_work_items<S>(
    source: &S,
    selection: &Selection,
    instant_a: DateTime<Utc>,
    instant_b: DateTime<Utc>,
    options: &CompareOptions,
) -> Result<Vec<ComparisonRecord>, AsofError>
where
    S: WorkItemSource + ?Sized,
{
    let items =
        fetch_selection(source, selection, options.batch_concurrency, &options.audit).await?;
    let total = items.len();
    let mut slots: Vec<Option<ComparisonRecord>> = vec![None; total];

    let fetches = items.into_iter().enumerate().map(|(index, fields)| async move {
        let record = match source.fetch_revision_history(fields.id).await {
            Ok(history) => compare(fields, &history, instant_a, instant_b),
            Err(err) => {
                warn!(
                    id = %fields.id,
                    code = %err.error_code(),
                    error = %err,
                    "history fetch failed"
                );
                failed_record(fields, &err, instant_a, instant_b)
            }
        };
        (index, record)
    });
    let mut pending = stream::iter(fetches).buffer_unordered(options.item_concurrency.max(1));

    while let Some((index, record)) = pending.next().await {
        slots[index] = Some(record);
    }

    let records: Vec<ComparisonRecord> = slots.into_iter().flatten().collect();
    let summary = ComparisonSummary::of(&records);
    info!(
        total = summary.total,
        changed = summary.changed,
        failed = summary.failed,
        "comparison complete"
    );
    Ok(records)
}

/// Aggregate counts over a comparison result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComparisonSummary {
    pub total: usize,
    pub changed: usize,
    pub failed: usize,
}

impl ComparisonSummary {
    #[must_use]
    pub fn of(records: &[ComparisonRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, record| {
            acc.total += 1;
            acc.changed += usize::from(record.changed);
            acc.failed += usize::from(record.is_failed());
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Revision, WorkItemId};
    use crate::time::parse_instant;

    fn at(input: &str) -> DateTime<Utc> {
        parse_instant(input).expect("valid instant")
    }

    fn snapshot(state: &str, changed: &str) -> PointInTimeSnapshot {
        PointInTimeSnapshot {
            instant: at("2024-06-01"),
            state: Some(state.to_string()),
            changed_by: Some("Ana".into()),
            changed_date: Some(at(changed)),
            resolved: true,
            revision_index: Some(0),
            skipped_revisions: 0,
        }
    }

    #[test]
    fn same_state_same_day_different_time_is_unchanged() {
        let a = snapshot("Active", "2024-03-01T08:00:00Z");
        let b = snapshot("Active", "2024-03-01T17:45:00Z");
        assert!(!is_changed(&a, &b));
    }

    #[test]
    fn different_state_is_changed_regardless_of_dates() {
        let a = snapshot("Active", "2024-03-01T08:00:00Z");
        let b = snapshot("Closed", "2024-03-01T08:00:00Z");
        assert!(is_changed(&a, &b));
    }

    #[test]
    fn same_state_different_day_is_changed() {
        let a = snapshot("Active", "2024-03-01T08:00:00Z");
        let b = snapshot("Active", "2024-03-02T08:00:00Z");
        assert!(is_changed(&a, &b));
    }

    #[test]
    fn unresolved_differs_from_resolved_but_not_from_unresolved() {
        let resolved = snapshot("Active", "2024-03-01T08:00:00Z");
        let unresolved = PointInTimeSnapshot::unresolved(at("2024-06-01"));
        assert!(is_changed(&resolved, &unresolved));
        assert!(is_changed(&unresolved, &resolved));
        assert!(!is_changed(&unresolved, &unresolved.clone()));
    }

    #[test]
    fn compare_resolves_both_instants_from_one_history() {
        let history = RevisionHistory::new(
            WorkItemId(5),
            vec![
                Revision {
                    rev: 1,
                    state: "New".into(),
                    changed_by: Some("Ana".into()),
                    changed_date: Some(at("2024-01-01T10:00")),
                },
                Revision {
                    rev: 2,
                    state: "Active".into(),
                    changed_by: Some("Ben".into()),
                    changed_date: Some(at("2024-03-01T09:00")),
                },
            ],
        );

        let record = compare(
            WorkItemFields::placeholder(WorkItemId(5)),
            &history,
            at("2024-02-01"),
            at("2024-04-01"),
        );
        assert_eq!(record.snapshot_a.state.as_deref(), Some("New"));
        assert_eq!(record.snapshot_b.state.as_deref(), Some("Active"));
        assert!(record.changed);
        assert!(record.error.is_none());
    }

    #[test]
    fn failed_record_keeps_item_and_error() {
        let err = AsofError::from_status(503, "unavailable");
        let record = failed_record(
            WorkItemFields::placeholder(WorkItemId(9)),
            &err,
            at("2024-01-01"),
            at("2024-02-01"),
        );
        assert_eq!(record.id(), WorkItemId(9));
        assert!(!record.snapshot_a.resolved);
        assert!(!record.changed);
        let error = record.error.expect("error recorded");
        assert_eq!(error.code, crate::error::ErrorCode::TransportError);
    }
}
