//! asof-core: point-in-time state reconstruction for tracker work items.
//!
//! Given a selection of work items and two instants, the engine fetches each
//! item's static fields and full revision history, resolves the effective
//! state at both instants and flags the items that moved in between.
//!
//! # Conventions
//!
//! - **Errors**: [`AsofError`] for everything that crosses the
//!   [`WorkItemSource`] seam; `anyhow::Result` for config file handling.
//! - **Logging**: `tracing` macros. Per-item failures are `warn!`, request
//!   summaries are `info!`, wire detail is `debug!`.
//! - **Time**: all instants are UTC. Bare dates mean midnight UTC.

pub mod audit;
pub mod compare;
pub mod config;
pub mod error;
pub mod fixture;
pub mod model;
pub mod plan;
pub mod projection;
pub mod resolve;
pub mod source;
pub mod time;

pub use audit::{AuditSender, AuditWriter, BatchEvent};
pub use compare::{CompareOptions, ComparisonSummary, compare_work_items, is_changed};
pub use error::{AsofError, ErrorCode, Result};
pub use model::{
    ComparisonRecord, ItemError, PointInTimeSnapshot, Revision, RevisionHistory, WorkItemFields,
    WorkItemId,
};
pub use plan::{BATCH_LIMIT, Selection};
pub use projection::{OutputRow, project};
pub use resolve::resolve;
pub use source::WorkItemSource;
