//! Audit mirroring of fetched batches.
//!
//! The planner emits a [`BatchEvent`] after each batch of fields arrives.
//! Emission is fire-and-forget: it never blocks, and a closed or missing
//! receiver is not an error. [`AuditWriter`] is the durable consumer; it
//! writes every mirrored item into one JSON array per request.
//!
//! Whether auditing happens is decided per request by handing the planner
//! an enabled or [`disabled`](AuditSender::disabled) sender.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::WorkItemFields;

/// One completed field batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEvent {
    pub batch_index: usize,
    pub batch_count: usize,
    pub items: Vec<WorkItemFields>,
}

/// Sending half of the audit channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct AuditSender {
    tx: Option<UnboundedSender<BatchEvent>>,
}

impl AuditSender {
    /// A sender that drops every event.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, event: BatchEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).is_err() {
            debug!("audit receiver closed; batch not mirrored");
        }
    }
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn channel() -> (AuditSender, UnboundedReceiver<BatchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AuditSender { tx: Some(tx) }, rx)
}

/// File name for a request started at `started`, e.g.
/// `workitems_2024-03-01T09-00-00-000Z.json`.
#[must_use]
pub fn audit_file_name(started: DateTime<Utc>) -> String {
    format!(
        "workitems_{}.json",
        started.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

/// Background consumer that mirrors batches into `<dir>/workitems_<ts>.json`.
pub struct AuditWriter;

impl AuditWriter {
    /// Spawn the writer on the current runtime.
    ///
    /// The task ends once every clone of the returned sender is dropped and
    /// resolves to the written path, or `None` if writing failed (the
    /// failure is logged, never propagated).
    #[must_use]
    pub fn spawn(
        dir: PathBuf,
        started: DateTime<Utc>,
    ) -> (AuditSender, JoinHandle<Option<PathBuf>>) {
        let (sender, rx) = channel();
        let path = dir.join(audit_file_name(started));
        let handle = tokio::spawn(async move {
            match write_batches(&dir, &path, rx).await {
                Ok(count) => {
                    info!(path = %path.display(), items = count, "audit file written");
                    Some(path)
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "audit write failed");
                    None
                }
            }
        });
        (sender, handle)
    }
}

async fn write_batches(
    dir: &Path,
    path: &Path,
    mut rx: UnboundedReceiver<BatchEvent>,
) -> std::io::Result<usize> {
    tokio::fs::create_dir_all(dir).await?;
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(b"[").await?;

    let mut written = 0_usize;
    while let Some(event) = rx.recv().await {
        debug!(
            batch = event.batch_index,
            batch_count = event.batch_count,
            "mirroring batch"
        );
        for item in &event.items {
            let json = serde_json::to_string_pretty(item)?;
            let sep: &[u8] = if written == 0 { b"\n" } else { b",\n" };
            file.write_all(sep).await?;
            file.write_all(json.as_bytes()).await?;
            written += 1;
        }
    }

    file.write_all(b"\n]\n").await?;
    file.flush().await?;
    Ok(written)
}
