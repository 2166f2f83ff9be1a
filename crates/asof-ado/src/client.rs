//! HTTP client for the Azure DevOps REST API.

use std::time::Duration;

use async_trait::async_trait;
use asof_core::plan::build_wiql;
use asof_core::{
    AsofError, BATCH_LIMIT, Revision, RevisionHistory, Selection, WorkItemFields, WorkItemId,
    WorkItemSource,
};
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::wire::{
    ApiErrorBody, BatchRequest, Iteration, ListResponse, Project, Team, WiqlRequest, WiqlResponse,
    WireRevision, WireWorkItem, WorkItemType,
};

pub const API_VERSION: &str = "7.0";

/// Upstream error code for "query result exceeds the size limit".
const TOO_MANY_RESULTS_CODE: &str = "VS403474";

/// Revisions requested per page.
const REVISION_PAGE: usize = 200;

const BODY_PREVIEW: usize = 300;

/// Client bound to one organization.
///
/// Authenticates every request with a personal access token (HTTP basic,
/// empty user name). Never retries: a failed request surfaces as an error
/// and the caller decides.
#[derive(Debug, Clone)]
pub struct AdoClient {
    http: reqwest::Client,
    base_url: Url,
    organization: String,
    /// Project scope for batch and revision endpoints; organization-wide
    /// endpoints are used when unset.
    project: Option<String>,
    pat: String,
}

impl AdoClient {
    /// # Errors
    ///
    /// Returns [`AsofError::Config`] for an unusable base URL or blank
    /// organization, [`AsofError::AuthenticationMissing`] for a blank token.
    pub fn new(
        base_url: &str,
        organization: &str,
        pat: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AsofError> {
        let pat = pat.into();
        if pat.trim().is_empty() {
            return Err(AsofError::AuthenticationMissing);
        }
        if organization.trim().is_empty() {
            return Err(AsofError::Config("organization is required".to_string()));
        }
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| AsofError::Config(format!("invalid base url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AsofError::Config(format!("invalid base url '{base_url}'")));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("asof/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| transport(&e))?;

        Ok(Self {
            http,
            base_url,
            organization: organization.trim().to_string(),
            project: None,
            pat,
        })
    }

    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    #[must_use]
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Build `{base}/{org}/{segments...}/_apis/{api}?api-version=7.0`.
    ///
    /// Segments are percent-encoded, so team names with spaces are safe.
    #[must_use]
    pub fn endpoint(&self, scope: &[&str], api: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push(&self.organization)
                .extend(scope)
                .push("_apis")
                .extend(api);
        }
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("api-version", API_VERSION);
        }
        url
    }

    fn project_scope(&self) -> Vec<&str> {
        self.project.as_deref().into_iter().collect()
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth("", Some(&self.pat))
            .header(ACCEPT, "application/json")
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, AsofError> {
        let response = request.send().await.map_err(|e| transport(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport(&e))?;
        debug!(context, status = status.as_u16(), bytes = body.len(), "upstream response");

        // An invalid token is answered with 203 and an HTML sign-in page.
        if status.as_u16() == 203 {
            return Err(AsofError::from_status(
                203,
                "authentication rejected; check the personal access token",
            ));
        }
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| AsofError::Decode {
            context: context.to_string(),
            detail: e.to_string(),
        })
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        url: Url,
        context: &str,
    ) -> Result<Vec<T>, AsofError> {
        let list: ListResponse<T> = self
            .send_json(self.request(Method::GET, url), context)
            .await?;
        Ok(list.value)
    }

    /// Projects in the organization.
    ///
    /// # Errors
    ///
    /// Returns transport or decode failures.
    pub async fn list_projects(&self) -> Result<Vec<Project>, AsofError> {
        let url = self.endpoint(&[], &["projects"], &[]);
        self.get_list(url, "project list").await
    }

    /// Teams of one project.
    ///
    /// # Errors
    ///
    /// Returns transport or decode failures.
    pub async fn list_teams(&self, project: &str) -> Result<Vec<Team>, AsofError> {
        let url = self.endpoint(&[], &["projects", project, "teams"], &[]);
        self.get_list(url, "team list").await
    }

    /// Iterations subscribed by a team.
    ///
    /// # Errors
    ///
    /// Returns transport or decode failures.
    pub async fn list_iterations(
        &self,
        project: &str,
        team: &str,
    ) -> Result<Vec<Iteration>, AsofError> {
        let url = self.endpoint(
            &[project, team],
            &["work", "teamsettings", "iterations"],
            &[],
        );
        self.get_list(url, "iteration list").await
    }

    /// Work item types defined for a project.
    ///
    /// # Errors
    ///
    /// Returns transport or decode failures.
    pub async fn list_work_item_types(
        &self,
        project: &str,
    ) -> Result<Vec<WorkItemType>, AsofError> {
        let url = self.endpoint(&[project], &["wit", "workitemtypes"], &[]);
        self.get_list(url, "work item type list").await
    }
}

#[async_trait]
impl WorkItemSource for AdoClient {
    async fn list_matching_ids(&self, selection: &Selection) -> Result<Vec<WorkItemId>, AsofError> {
        let query = build_wiql(selection);
        let url = self.endpoint(
            &[selection.project.as_str(), selection.team.as_str()],
            &["wit", "wiql"],
            &[],
        );
        let response: WiqlResponse = self
            .send_json(
                self.request(Method::POST, url)
                    .json(&WiqlRequest { query: &query }),
                "wiql result",
            )
            .await?;
        Ok(response
            .work_items
            .into_iter()
            .map(|item| WorkItemId(item.id))
            .collect())
    }

    async fn fetch_fields(
        &self,
        ids: &[WorkItemId],
        fields: &[&str],
    ) -> Result<Vec<WorkItemFields>, AsofError> {
        if ids.len() > BATCH_LIMIT {
            return Err(AsofError::InvalidSelection(format!(
                "batch of {} ids exceeds the limit of {BATCH_LIMIT}",
                ids.len()
            )));
        }
        let url = self.endpoint(&self.project_scope(), &["wit", "workitemsbatch"], &[]);
        let body = BatchRequest {
            ids: ids.iter().map(|id| id.get()).collect(),
            fields,
        };
        let list: ListResponse<WireWorkItem> = self
            .send_json(
                self.request(Method::POST, url).json(&body),
                "work item batch",
            )
            .await?;
        Ok(list.value.into_iter().map(WireWorkItem::into_fields).collect())
    }

    async fn fetch_revision_history(&self, id: WorkItemId) -> Result<RevisionHistory, AsofError> {
        let id_segment = id.to_string();
        let mut revisions: Vec<Revision> = Vec::new();

        loop {
            let url = self.endpoint(
                &self.project_scope(),
                &["wit", "workItems", id_segment.as_str(), "revisions"],
                &[
                    ("$top", REVISION_PAGE.to_string()),
                    ("$skip", revisions.len().to_string()),
                ],
            );
            let page: ListResponse<WireRevision> = self
                .send_json(self.request(Method::GET, url), "revision history")
                .await?;

            let fetched = page.value.len();
            revisions.extend(page.value.into_iter().map(Revision::from));
            if fetched < REVISION_PAGE {
                break;
            }
        }

        revisions.sort_by_key(|r| r.rev);
        let history = RevisionHistory::new(id, revisions);
        if !history.is_chronological() {
            warn!(id = %id, "revision dates are not in revision order");
        }
        debug!(id = %id, revisions = history.len(), "fetched revision history");
        Ok(history)
    }
}

/// Map a non-success response to an [`AsofError`].
///
/// The upstream's "too many results" refusal becomes
/// [`AsofError::TooManyResults`]; anything else is a transport error carrying
/// the upstream message (or a preview of the raw body).
#[must_use]
pub fn classify_error(status: u16, body: &str) -> AsofError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.trim().is_empty() {
        body.chars().take(BODY_PREVIEW).collect()
    } else {
        parsed.message
    };

    if message.contains(TOO_MANY_RESULTS_CODE) {
        return AsofError::TooManyResults {
            upstream_message: message,
        };
    }
    if let Some(type_key) = parsed.type_key {
        debug!(status, type_key = %type_key, "upstream error");
    }
    AsofError::from_status(status, message)
}

fn transport(err: &reqwest::Error) -> AsofError {
    AsofError::Transport {
        status: err.status().map(|s| s.as_u16()),
        detail: err.to_string(),
        retryable: err.is_timeout() || err.is_connect(),
    }
}
