//! Batch query planning: selection → WIQL → id batches → ordered fields.
//!
//! The pure pieces ([`build_wiql`], [`partition`], [`merge_in_id_order`])
//! carry the ordering guarantees and are tested without I/O.
//! [`fetch_selection`] wires them to a [`WorkItemSource`].

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditSender, BatchEvent};
use crate::error::AsofError;
use crate::model::item::fields;
use crate::model::{WorkItemFields, WorkItemId};
use crate::source::WorkItemSource;

/// Maximum ids per field fetch. Imposed by the upstream API.
pub const BATCH_LIMIT: usize = 200;

/// Which work items to compare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub project: String,
    pub team: String,
    pub iteration_path: String,
    /// Optional allow-list of work item types; empty means all types.
    #[serde(default)]
    pub types: Vec<String>,
}

impl Selection {
    /// # Errors
    ///
    /// Returns [`AsofError::InvalidSelection`] when a required part is blank.
    pub fn validate(&self) -> Result<(), AsofError> {
        for (name, value) in [
            ("project", &self.project),
            ("team", &self.team),
            ("iteration", &self.iteration_path),
        ] {
            if value.trim().is_empty() {
                return Err(AsofError::InvalidSelection(format!("{name} is required")));
            }
        }
        Ok(())
    }
}

/// A contiguous slice of the query result, fetched in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub ids: Vec<WorkItemId>,
}

/// Build the WIQL query for a selection.
///
/// `@project` is bound by the upstream from the request URL; the iteration
/// path and type names are embedded as WIQL string literals.
#[must_use]
pub fn build_wiql(selection: &Selection) -> String {
    let mut query = format!(
        "SELECT [{}], [{}], [{}], [{}], [{}], [{}], [{}] FROM WorkItems \
         WHERE [System.TeamProject] = @project AND [{}] = {}",
        fields::ID,
        fields::WORK_ITEM_TYPE,
        fields::TITLE,
        fields::STATE,
        fields::CREATED_DATE,
        fields::AREA_PATH,
        fields::TARGET_RELEASE,
        fields::ITERATION_PATH,
        wiql_literal(&selection.iteration_path),
    );

    let types: Vec<String> = selection
        .types
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(wiql_literal)
        .collect();
    if !types.is_empty() {
        query.push_str(&format!(
            " AND [{}] IN ({})",
            fields::WORK_ITEM_TYPE,
            types.join(",")
        ));
    }

    query.push_str(" ORDER BY [System.Id]");
    query
}

fn wiql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Split ids into contiguous batches of at most [`BATCH_LIMIT`], preserving
/// order. Zero ids produce zero batches.
#[must_use]
pub fn partition(ids: &[WorkItemId]) -> Vec<Batch> {
    ids.chunks(BATCH_LIMIT)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            ids: chunk.to_vec(),
        })
        .collect()
}

/// Order fetched fields by the original id sequence.
///
/// Batches may complete in any order and the upstream does not promise to
/// echo ids in request order. Ids with no returned fields get a placeholder
/// so the item count is preserved.
#[must_use]
pub fn merge_in_id_order(
    ids: &[WorkItemId],
    fetched: impl IntoIterator<Item = WorkItemFields>,
) -> Vec<WorkItemFields> {
    let mut by_id: HashMap<WorkItemId, WorkItemFields> =
        fetched.into_iter().map(|item| (item.id, item)).collect();

    ids.iter()
        .map(|id| {
            by_id.remove(id).unwrap_or_else(|| {
                warn!(id = %id, "upstream returned no fields for matched work item");
                WorkItemFields::placeholder(*id)
            })
        })
        .collect()
}

/// Run the selection query and fetch static fields for every match.
///
/// Batches are fetched concurrently (at most `batch_concurrency` in flight).
/// Each completed batch is mirrored to `audit` without waiting on it.
///
/// # Errors
///
/// Propagates selection validation, query and batch fetch failures; the
/// first failing batch aborts the remaining ones.
pub async fn fetch_selection<S>(
    source: &S,
    selection: &Selection,
    batch_concurrency: usize,
    audit: &AuditSender,
) -> Result<Vec<WorkItemFields>, AsofError>
where
    S: WorkItemSource + ?Sized,
{
    selection.validate()?;
    debug!(wiql = %build_wiql(selection), "running selection query");

    let ids = source.list_matching_ids(selection).await?;
    info!(
        project = %selection.project,
        iteration = %selection.iteration_path,
        count = ids.len(),
        "selection matched work items"
    );
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let batches = partition(&ids);
    let batch_count = batches.len();
    let mut slots: Vec<Option<Vec<WorkItemFields>>> = vec![None; batch_count];

    let mut pending = stream::iter(batches.into_iter().map(|batch| async move {
        let result = source.fetch_fields(&batch.ids, fields::PROJECTION).await;
        (batch.index, result)
    }))
    .buffer_unordered(batch_concurrency.max(1));

    while let Some((index, result)) = pending.next().await {
        let items = result?;
        debug!(batch = index, batch_count, items = items.len(), "fetched batch");
        mirror_batch(audit, index, batch_count, &items);
        slots[index] = Some(items);
    }

    Ok(merge_in_id_order(&ids, slots.into_iter().flatten().flatten()))
}

/// Send a copy of a fetched batch to the audit channel. Returns whether an
/// event was built; nothing is copied when auditing is off.
fn mirror_batch(
    audit: &AuditSender,
    batch_index: usize,
    batch_count: usize,
    items: &[WorkItemFields],
) -> bool {
    if !audit.is_enabled() {
        return false;
    }
    audit.emit(BatchEvent {
        batch_index,
        batch_count,
        items: items.to_vec(),
    });
    true
}
