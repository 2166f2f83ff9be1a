//! End-to-end behaviour of the comparison pipeline against in-memory sources.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use asof_core::audit;
use asof_core::time::parse_instant;
use asof_core::{
    AsofError, CompareOptions, ErrorCode, Revision, RevisionHistory, Selection, WorkItemFields,
    WorkItemId, WorkItemSource, compare_work_items,
};
use chrono::{DateTime, Utc};

fn at(input: &str) -> DateTime<Utc> {
    parse_instant(input).expect("valid instant")
}

fn selection() -> Selection {
    Selection {
        project: "Fabrikam".into(),
        team: "Fabrikam Team".into(),
        iteration_path: r"Fabrikam\Sprint 12".into(),
        types: Vec::new(),
    }
}

/// Upstream double: history fetches for lower ids take longer, so
/// completion order is the reverse of query order.
#[derive(Default)]
struct SlowSource {
    ids: Vec<WorkItemId>,
    failing: Vec<WorkItemId>,
    omit_fields: Vec<WorkItemId>,
    too_many: bool,
    batch_calls: AtomicUsize,
    completed: Mutex<Vec<WorkItemId>>,
}

impl SlowSource {
    fn with_ids(n: u32) -> Self {
        Self {
            ids: (1..=n).map(WorkItemId).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl WorkItemSource for SlowSource {
    async fn list_matching_ids(&self, _selection: &Selection) -> Result<Vec<WorkItemId>, AsofError> {
        if self.too_many {
            return Err(AsofError::TooManyResults {
                upstream_message: "VS403474: The query result exceeds the size limit".into(),
            });
        }
        Ok(self.ids.clone())
    }

    async fn fetch_fields(
        &self,
        ids: &[WorkItemId],
        _fields: &[&str],
    ) -> Result<Vec<WorkItemFields>, AsofError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        // Answer in reverse so ordering has to be restored by the planner.
        Ok(ids
            .iter()
            .rev()
            .filter(|id| !self.omit_fields.contains(id))
            .map(|id| WorkItemFields {
                title: format!("item {id}"),
                ..WorkItemFields::placeholder(*id)
            })
            .collect())
    }

    async fn fetch_revision_history(&self, id: WorkItemId) -> Result<RevisionHistory, AsofError> {
        let max = self.ids.len() as u64;
        tokio::time::sleep(Duration::from_millis((max - u64::from(id.get()) + 1) * 10)).await;
        self.completed
            .lock()
            .expect("completion log lock")
            .push(id);

        if self.failing.contains(&id) {
            return Err(AsofError::from_status(500, "internal error"));
        }
        let mut revisions = vec![Revision {
            rev: 1,
            state: "New".into(),
            changed_by: Some("Ana".into()),
            changed_date: Some(at("2024-01-01T10:00:00Z")),
        }];
        // Even ids move to Active between the two instants; odd ids never change.
        if id.get() % 2 == 0 {
            revisions.push(Revision {
                rev: 2,
                state: "Active".into(),
                changed_by: Some("Ben".into()),
                changed_date: Some(at("2024-03-01T09:00:00Z")),
            });
        }
        Ok(RevisionHistory::new(id, revisions))
    }
}

#[tokio::test(start_paused = true)]
async fn output_follows_query_order_not_completion_order() {
    let source = SlowSource::with_ids(12);
    let options = CompareOptions {
        item_concurrency: 12,
        ..CompareOptions::default()
    };

    let records = compare_work_items(
        &source,
        &selection(),
        at("2024-02-01"),
        at("2024-04-01"),
        &options,
    )
    .await
    .expect("comparison succeeds");

    let order: Vec<u32> = records.iter().map(|r| r.id().get()).collect();
    assert_eq!(order, (1..=12).collect::<Vec<_>>());

    let completed = source.completed.lock().expect("lock").clone();
    assert_eq!(completed.first(), Some(&WorkItemId(12)));

    for record in &records {
        assert_eq!(record.fields.title, format!("item {}", record.id()));
        assert_eq!(record.changed, record.id().get() % 2 == 0);
    }
}

#[tokio::test(start_paused = true)]
async fn large_selection_is_fetched_in_batches_of_200() {
    let source = SlowSource::with_ids(450);
    let records = compare_work_items(
        &source,
        &selection(),
        at("2024-02-01"),
        at("2024-04-01"),
        &CompareOptions::default(),
    )
    .await
    .expect("comparison succeeds");

    assert_eq!(records.len(), 450);
    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 3);
    assert_eq!(records[449].id(), WorkItemId(450));
}

#[tokio::test(start_paused = true)]
async fn one_failed_history_keeps_the_item_with_an_error() {
    let source = SlowSource {
        failing: vec![WorkItemId(3)],
        ..SlowSource::with_ids(5)
    };

    let records = compare_work_items(
        &source,
        &selection(),
        at("2024-02-01"),
        at("2024-04-01"),
        &CompareOptions::default(),
    )
    .await
    .expect("per-item failures do not abort");

    assert_eq!(records.len(), 5);
    let failed = &records[2];
    assert_eq!(failed.id(), WorkItemId(3));
    assert!(!failed.snapshot_a.resolved);
    let error = failed.error.as_ref().expect("error recorded");
    assert_eq!(error.code, ErrorCode::TransportError);
    assert!(records.iter().filter(|r| r.is_failed()).count() == 1);
}

#[tokio::test]
async fn too_many_results_aborts_before_any_fetch() {
    let source = SlowSource {
        too_many: true,
        ..SlowSource::with_ids(3)
    };

    let err = compare_work_items(
        &source,
        &selection(),
        at("2024-02-01"),
        at("2024-04-01"),
        &CompareOptions::default(),
    )
    .await
    .expect_err("capped query fails");

    assert_eq!(err.error_code(), ErrorCode::TooManyResults);
    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 0);
    assert!(source.completed.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn empty_selection_yields_empty_result() {
    let source = SlowSource::default();
    let records = compare_work_items(
        &source,
        &selection(),
        at("2024-02-01"),
        at("2024-04-01"),
        &CompareOptions::default(),
    )
    .await
    .expect("empty is fine");
    assert!(records.is_empty());
    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn ids_without_fields_still_produce_records() {
    let source = SlowSource {
        omit_fields: vec![WorkItemId(2)],
        ..SlowSource::with_ids(3)
    };
    let records = compare_work_items(
        &source,
        &selection(),
        at("2024-02-01"),
        at("2024-04-01"),
        &CompareOptions::default(),
    )
    .await
    .expect("comparison succeeds");

    assert_eq!(records.len(), 3);
    assert_eq!(records[1].fields.title, "");
    assert!(records[1].snapshot_b.resolved);
}

#[tokio::test(start_paused = true)]
async fn every_batch_is_mirrored_to_the_audit_channel() {
    let source = SlowSource::with_ids(250);
    let (sender, mut rx) = audit::channel();
    let options = CompareOptions {
        audit: sender,
        ..CompareOptions::default()
    };

    let records = compare_work_items(
        &source,
        &selection(),
        at("2024-02-01"),
        at("2024-04-01"),
        &options,
    )
    .await
    .expect("comparison succeeds");
    drop(options);

    let mut mirrored: HashMap<usize, usize> = HashMap::new();
    while let Some(event) = rx.recv().await {
        assert_eq!(event.batch_count, 2);
        mirrored.insert(event.batch_index, event.items.len());
    }
    assert_eq!(mirrored.get(&0), Some(&200));
    assert_eq!(mirrored.get(&1), Some(&50));
    assert_eq!(records.len(), 250);
}

#[tokio::test]
async fn blank_selection_is_rejected_without_upstream_calls() {
    let source = SlowSource::with_ids(3);
    let mut sel = selection();
    sel.team = String::new();

    let err = compare_work_items(
        &source,
        &sel,
        at("2024-02-01"),
        at("2024-04-01"),
        &CompareOptions::default(),
    )
    .await
    .expect_err("team is required");
    assert_eq!(err.error_code(), ErrorCode::InvalidSelection);
    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 0);
}
