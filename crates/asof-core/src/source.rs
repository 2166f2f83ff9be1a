//! The seam between the comparison engine and an upstream tracker.

use async_trait::async_trait;

use crate::error::AsofError;
use crate::model::{RevisionHistory, WorkItemFields, WorkItemId};
use crate::plan::Selection;

/// Read-only access to an upstream work item store.
///
/// # Implementors
///
/// - `asof_ado::AdoClient`: the Azure DevOps REST API.
/// - [`FixtureSource`](crate::fixture::FixtureSource): a JSON document on disk.
///
/// Histories returned by [`fetch_revision_history`] must be in chronological
/// order, one entry per change; the resolver relies on it.
///
/// [`fetch_revision_history`]: WorkItemSource::fetch_revision_history
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    /// Ids matching the selection, in upstream query order.
    ///
    /// # Errors
    ///
    /// [`AsofError::TooManyResults`] when the upstream result cap is hit,
    /// [`AsofError::Transport`] for any other upstream failure.
    async fn list_matching_ids(&self, selection: &Selection) -> Result<Vec<WorkItemId>, AsofError>;

    /// Static fields for at most [`BATCH_LIMIT`](crate::plan::BATCH_LIMIT) ids.
    ///
    /// # Errors
    ///
    /// Returns [`AsofError::Transport`] or [`AsofError::Decode`] on failure.
    async fn fetch_fields(
        &self,
        ids: &[WorkItemId],
        fields: &[&str],
    ) -> Result<Vec<WorkItemFields>, AsofError>;

    /// The full revision history of one item.
    ///
    /// # Errors
    ///
    /// Returns [`AsofError::Transport`] or [`AsofError::Decode`] on failure.
    async fn fetch_revision_history(&self, id: WorkItemId) -> Result<RevisionHistory, AsofError>;
}
