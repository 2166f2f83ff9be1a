use asof_core::model::{Revision, RevisionHistory, WorkItemId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

pub fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base time")
}

pub fn arb_state() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["New", "Active", "Resolved", "Closed", "Removed"])
        .prop_map(ToString::to_string)
}

/// A chronological history built from non-negative gaps (in minutes) between
/// consecutive revisions. Zero gaps produce equal timestamps.
pub fn arb_history() -> impl Strategy<Value = RevisionHistory> {
    prop::collection::vec((0_i64..20_000, arb_state()), 0..24).prop_map(|steps| {
        let mut at = base();
        let revisions = steps
            .into_iter()
            .enumerate()
            .map(|(i, (gap, state))| {
                at += Duration::minutes(gap);
                Revision {
                    rev: u32::try_from(i + 1).expect("small index"),
                    state,
                    changed_by: Some(format!("user{}", i % 3)),
                    changed_date: Some(at),
                }
            })
            .collect();
        RevisionHistory::new(WorkItemId(1), revisions)
    })
}

/// An instant somewhere around the generated histories, including before
/// the first revision.
pub fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    (-10_000_i64..500_000).prop_map(|minutes| base() + Duration::minutes(minutes))
}
