//! Serde shapes of the Azure DevOps REST payloads we consume.
//!
//! Only the members the engine reads are modelled; everything else is
//! ignored. Dates are kept as strings on the wire and parsed leniently so a
//! single odd timestamp never fails a whole page.

use std::collections::HashMap;

use asof_core::model::item::fields;
use asof_core::{Revision, WorkItemFields, WorkItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope used by every list endpoint: `{ "count": n, "value": [...] }`.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: String,
    pub name: String,
    /// Full iteration path, the value a selection filters on.
    pub path: String,
    #[serde(default)]
    pub attributes: IterationAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationAttributes {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub finish_date: Option<String>,
    /// `past`, `current` or `future`.
    #[serde(default)]
    pub time_frame: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemType {
    pub name: String,
    #[serde(default)]
    pub reference_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_disabled: bool,
}

#[derive(Debug, Serialize)]
pub struct WiqlRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiqlResponse {
    #[serde(default)]
    pub work_items: Vec<WorkItemRef>,
}

#[derive(Debug, Deserialize)]
pub struct WorkItemRef {
    pub id: u32,
}

#[derive(Debug, Serialize)]
pub struct BatchRequest<'a> {
    pub ids: Vec<u32>,
    pub fields: &'a [&'a str],
}

/// A user reference. Newer API versions send an identity object, older
/// ones (and some custom fields) a plain `"Name <domain\\user>"` string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IdentityRef {
    Identity {
        #[serde(rename = "displayName")]
        display_name: String,
    },
    Plain(String),
}

impl IdentityRef {
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Identity { display_name } => display_name,
            Self::Plain(name) => name,
        }
    }
}

/// A work item as returned by `workitemsbatch`.
#[derive(Debug, Deserialize)]
pub struct WireWorkItem {
    pub id: u32,
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl WireWorkItem {
    fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(value_text)
    }

    #[must_use]
    pub fn into_fields(self) -> WorkItemFields {
        WorkItemFields {
            id: WorkItemId(self.id),
            work_item_type: self.text(fields::WORK_ITEM_TYPE).unwrap_or_default(),
            title: self.text(fields::TITLE).unwrap_or_default(),
            state: self.text(fields::STATE).unwrap_or_default(),
            created_date: self
                .text(fields::CREATED_DATE)
                .as_deref()
                .and_then(parse_wire_date),
            area_path: self.text(fields::AREA_PATH).unwrap_or_default(),
            iteration_path: self.text(fields::ITERATION_PATH).unwrap_or_default(),
            target_release: self.text(fields::TARGET_RELEASE),
            board_column: self.text(fields::BOARD_COLUMN),
        }
    }
}

/// One entry of `workItems/{id}/revisions`.
#[derive(Debug, Deserialize)]
pub struct WireRevision {
    pub rev: u32,
    #[serde(default)]
    pub fields: RevisionFields,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevisionFields {
    #[serde(rename = "System.State", default)]
    pub state: Option<String>,
    #[serde(rename = "System.ChangedBy", default)]
    pub changed_by: Option<IdentityRef>,
    #[serde(rename = "System.ChangedDate", default)]
    pub changed_date: Option<String>,
}

impl From<WireRevision> for Revision {
    fn from(wire: WireRevision) -> Self {
        let RevisionFields {
            state,
            changed_by,
            changed_date,
        } = wire.fields;
        Self {
            rev: wire.rev,
            state: state.unwrap_or_default(),
            changed_by: changed_by.map(|who| who.display_name().to_string()),
            changed_date: changed_date.as_deref().and_then(parse_wire_date),
        }
    }
}

/// Error body of a failed request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub type_key: Option<String>,
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(_) => serde_json::from_value::<IdentityRef>(value.clone())
            .ok()
            .map(|who| who.display_name().to_string()),
        other => Some(other.to_string()),
    }
}

fn parse_wire_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_with_identity_object() {
        let wire: WireRevision = serde_json::from_str(
            r#"{
                "id": 42, "rev": 3,
                "fields": {
                    "System.State": "Active",
                    "System.ChangedBy": {"displayName": "Ana Lima", "uniqueName": "ana@fabrikam.com"},
                    "System.ChangedDate": "2024-03-01T09:00:00.123Z"
                }
            }"#,
        )
        .expect("parse revision");
        let rev = Revision::from(wire);
        assert_eq!(rev.rev, 3);
        assert_eq!(rev.state, "Active");
        assert_eq!(rev.changed_by.as_deref(), Some("Ana Lima"));
        assert_eq!(
            rev.changed_date.map(|ts| ts.timestamp_millis()),
            Some(1_709_283_600_123)
        );
    }

    #[test]
    fn revision_with_plain_string_identity() {
        let wire: WireRevision = serde_json::from_str(
            r#"{"rev": 1, "fields": {
                "System.State": "New",
                "System.ChangedBy": "Ben Ode <FABRIKAM\\ben>",
                "System.ChangedDate": "2024-01-01T10:00:00Z"
            }}"#,
        )
        .expect("parse revision");
        let rev = Revision::from(wire);
        assert_eq!(rev.changed_by.as_deref(), Some(r"Ben Ode <FABRIKAM\ben>"));
    }

    #[test]
    fn revision_with_bad_date_is_malformed() {
        let wire: WireRevision = serde_json::from_str(
            r#"{"rev": 2, "fields": {"System.State": "New", "System.ChangedDate": "yesterday"}}"#,
        )
        .expect("parse revision");
        assert!(Revision::from(wire).is_malformed());
    }

    #[test]
    fn batch_item_maps_projection() {
        let wire: WireWorkItem = serde_json::from_str(
            r#"{
                "id": 101,
                "fields": {
                    "System.Id": 101,
                    "System.WorkItemType": "Bug",
                    "System.Title": "Login times out",
                    "System.State": "Active",
                    "System.CreatedDate": "2023-12-20T08:15:00Z",
                    "System.AreaPath": "Fabrikam\\Web",
                    "System.IterationPath": "Fabrikam\\Sprint 12",
                    "Custom.TargetRelease": 2024.2,
                    "System.BoardColumn": "Doing"
                }
            }"#,
        )
        .expect("parse work item");
        let item = wire.into_fields();
        assert_eq!(item.id, WorkItemId(101));
        assert_eq!(item.work_item_type, "Bug");
        assert_eq!(item.area_path, r"Fabrikam\Web");
        assert_eq!(item.target_release.as_deref(), Some("2024.2"));
        assert_eq!(item.board_column.as_deref(), Some("Doing"));
        assert!(item.created_date.is_some());
    }

    #[test]
    fn batch_item_without_optional_fields() {
        let wire: WireWorkItem =
            serde_json::from_str(r#"{"id": 7, "fields": {"System.Title": "bare"}}"#)
                .expect("parse work item");
        let item = wire.into_fields();
        assert_eq!(item.title, "bare");
        assert!(item.target_release.is_none());
        assert!(item.created_date.is_none());
    }

    #[test]
    fn list_envelope_and_iteration_attributes() {
        let list: ListResponse<Iteration> = serde_json::from_str(
            r#"{"count": 1, "value": [{
                "id": "a1", "name": "Sprint 12", "path": "Fabrikam\\Sprint 12",
                "attributes": {"startDate": "2024-02-05T00:00:00Z", "timeFrame": "current"}
            }]}"#,
        )
        .expect("parse list");
        assert_eq!(list.count, Some(1));
        assert_eq!(list.value[0].attributes.time_frame.as_deref(), Some("current"));
        assert!(list.value[0].attributes.finish_date.is_none());
    }
}
