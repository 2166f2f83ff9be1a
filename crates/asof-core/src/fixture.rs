//! Offline [`WorkItemSource`] backed by a JSON document.
//!
//! Useful for demos, reproducing upstream data locally and end-to-end tests.
//!
//! ```json
//! {
//!   "items": [
//!     {
//!       "id": 101,
//!       "work_item_type": "Bug",
//!       "title": "Login times out",
//!       "iteration_path": "Fabrikam\\Sprint 12",
//!       "revisions": [
//!         { "rev": 1, "state": "New", "changed_by": "Ana",
//!           "changed_date": "2024-01-01T10:00:00Z" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! An item may carry `"history_error": "<message>"` to simulate a failed
//! history fetch, and the document may set `"too_many_results": true` to
//! simulate the upstream result cap.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AsofError;
use crate::model::{Revision, RevisionHistory, WorkItemFields, WorkItemId};
use crate::plan::Selection;
use crate::source::WorkItemSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureItem {
    #[serde(flatten)]
    pub fields: WorkItemFields,
    #[serde(default)]
    pub revisions: Vec<Revision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureDocument {
    #[serde(default)]
    pub items: Vec<FixtureItem>,
    #[serde(default)]
    pub too_many_results: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    items: BTreeMap<WorkItemId, FixtureItem>,
    too_many_results: bool,
}

impl FixtureSource {
    #[must_use]
    pub fn new(document: FixtureDocument) -> Self {
        Self {
            items: document
                .items
                .into_iter()
                .map(|item| (item.fields.id, item))
                .collect(),
            too_many_results: document.too_many_results,
        }
    }

    /// Load a fixture document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`AsofError::Config`] if the file cannot be read and
    /// [`AsofError::Decode`] if it is not a valid fixture document.
    pub fn load(path: &Path) -> Result<Self, AsofError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AsofError::Config(format!("failed to read {}: {e}", path.display())))?;
        let document: FixtureDocument =
            serde_json::from_str(&content).map_err(|e| AsofError::Decode {
                context: path.display().to_string(),
                detail: e.to_string(),
            })?;
        Ok(Self::new(document))
    }

    fn matches(item: &FixtureItem, selection: &Selection) -> bool {
        let iteration_ok = item.fields.iteration_path == selection.iteration_path;
        let type_ok = selection.types.is_empty()
            || selection
                .types
                .iter()
                .any(|t| t.trim() == item.fields.work_item_type);
        iteration_ok && type_ok
    }
}

#[async_trait]
impl WorkItemSource for FixtureSource {
    async fn list_matching_ids(&self, selection: &Selection) -> Result<Vec<WorkItemId>, AsofError> {
        if self.too_many_results {
            return Err(AsofError::TooManyResults {
                upstream_message: "VS403474: fixture result cap exceeded".to_string(),
            });
        }
        Ok(self
            .items
            .values()
            .filter(|item| Self::matches(item, selection))
            .map(|item| item.fields.id)
            .collect())
    }

    async fn fetch_fields(
        &self,
        ids: &[WorkItemId],
        _fields: &[&str],
    ) -> Result<Vec<WorkItemFields>, AsofError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.items.get(id))
            .map(|item| item.fields.clone())
            .collect())
    }

    async fn fetch_revision_history(&self, id: WorkItemId) -> Result<RevisionHistory, AsofError> {
        let Some(item) = self.items.get(&id) else {
            return Err(AsofError::from_status(404, format!("work item {id} not found")));
        };
        if let Some(message) = &item.history_error {
            return Err(AsofError::Transport {
                status: None,
                detail: message.clone(),
                retryable: false,
            });
        }
        Ok(RevisionHistory::new(id, item.revisions.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "items": [
            {"id": 20, "work_item_type": "Task", "title": "b", "iteration_path": "P\\S1",
             "revisions": [{"rev": 1, "state": "New", "changed_date": "2024-01-01T00:00:00Z"}]},
            {"id": 10, "work_item_type": "Bug", "title": "a", "iteration_path": "P\\S1",
             "history_error": "connection reset"},
            {"id": 30, "work_item_type": "Bug", "title": "c", "iteration_path": "P\\S2"}
        ]
    }"#;

    fn source() -> FixtureSource {
        FixtureSource::new(serde_json::from_str(DOC).expect("fixture json"))
    }

    fn selection(types: &[&str]) -> Selection {
        Selection {
            project: "P".into(),
            team: "T".into(),
            iteration_path: r"P\S1".into(),
            types: types.iter().map(ToString::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn lists_ids_in_id_order_filtered_by_iteration_and_type() {
        let src = source();
        let all = src.list_matching_ids(&selection(&[])).await.expect("list");
        assert_eq!(all, vec![WorkItemId(10), WorkItemId(20)]);

        let bugs = src.list_matching_ids(&selection(&["Bug"])).await.expect("list");
        assert_eq!(bugs, vec![WorkItemId(10)]);
    }

    #[tokio::test]
    async fn history_error_is_reported_as_transport() {
        let err = source()
            .fetch_revision_history(WorkItemId(10))
            .await
            .expect_err("simulated failure");
        assert!(matches!(err, AsofError::Transport { ref detail, .. } if detail == "connection reset"));
    }

    #[tokio::test]
    async fn too_many_results_flag_fails_query() {
        let src = FixtureSource::new(FixtureDocument {
            items: vec![],
            too_many_results: true,
        });
        let err = src
            .list_matching_ids(&selection(&[]))
            .await
            .expect_err("capped");
        assert!(matches!(err, AsofError::TooManyResults { .. }));
    }

    #[test]
    fn load_reports_bad_json_as_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").expect("write");
        let err = FixtureSource::load(&path).expect_err("bad json");
        assert!(matches!(err, AsofError::Decode { .. }));
    }
}
