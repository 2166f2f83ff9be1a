//! Data model: identities, revisions, snapshots and comparison records.

pub mod item;
pub mod revision;
pub mod snapshot;

pub use item::{ComparisonRecord, ItemError, WorkItemFields};
pub use revision::{Revision, RevisionHistory, WorkItemId};
pub use snapshot::PointInTimeSnapshot;
