use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use asof_core::audit::{AuditSender, AuditWriter};
use asof_core::config::{AsofConfig, resolve_config};
use asof_core::fixture::FixtureSource;
use asof_core::time::{format_day, format_timestamp, parse_instant};
use asof_core::{
    CompareOptions, ComparisonRecord, ComparisonSummary, OutputRow, PointInTimeSnapshot,
    Selection, WorkItemSource, compare_work_items, project,
};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use super::{ConnectionArgs, required};
use crate::output::{
    OutputMode, Renderable, pretty_kv, pretty_rule, pretty_section, render_mode, write_list,
    write_tsv_row,
};

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Iteration path to select (e.g. "Fabrikam\Sprint 12").
    #[arg(long, short = 'i', value_name = "PATH")]
    pub iteration: String,

    /// Restrict to these work item types (repeatable or comma-separated).
    #[arg(long = "type", short = 't', value_name = "TYPE", value_delimiter = ',')]
    pub types: Vec<String>,

    /// First instant: a date (midnight UTC) or RFC 3339 timestamp.
    #[arg(long, visible_alias = "as-of", value_name = "WHEN")]
    pub from: String,

    /// Second instant to compare against.
    #[arg(long, visible_alias = "compare-date", value_name = "WHEN")]
    pub to: String,

    /// Only show items whose state or change day differs.
    #[arg(long)]
    pub only_changed: bool,

    /// Read items and histories from a JSON fixture instead of the API.
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// Mirror fetched work items to `<audit dir>/workitems_<timestamp>.json`.
    #[arg(long)]
    pub audit: bool,

    /// Directory for audit files (overrides `audit.dir`).
    #[arg(long, value_name = "DIR")]
    pub audit_dir: Option<PathBuf>,

    /// Maximum concurrent history fetches (overrides `fetch.item_concurrency`).
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

/// Everything a `compare` run reports.
#[derive(Debug, Serialize)]
struct CompareReport {
    from: String,
    to: String,
    summary: ComparisonSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit_file: Option<String>,
    rows: Vec<OutputRow>,
    #[serde(skip)]
    records: Vec<ComparisonRecord>,
}

impl Renderable for OutputRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "#{} {} {}", self.id, self.work_item_type, self.title)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        write_tsv_row(w, &self.cells())
    }

    fn table_headers() -> &'static [&'static str] {
        OutputRow::COLUMNS
    }
}

pub fn run_compare(
    args: &CompareArgs,
    pat_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let config = resolve_config(project_root)?;
    run_compare_with(args, &config, pat_flag, output)
}

fn run_compare_with(
    args: &CompareArgs,
    config: &AsofConfig,
    pat_flag: Option<&str>,
    output: OutputMode,
) -> Result<()> {
    let instant_a = parse_instant(&args.from)?;
    let instant_b = parse_instant(&args.to)?;
    let selection = Selection {
        project: required(args.connection.project(config), "project")?,
        team: required(args.connection.team(config), "team")?,
        iteration_path: args.iteration.clone(),
        types: args.types.clone(),
    };
    selection.validate()?;

    // The token is checked before anything is fetched.
    let source: Box<dyn WorkItemSource> = match &args.fixture {
        Some(path) => Box::new(FixtureSource::load(path)?),
        None => Box::new(args.connection.connect(config, pat_flag)?),
    };

    let rt = super::runtime()?;
    let report = rt.block_on(async {
        let audit_enabled = args.audit || config.audit.enabled;
        let (audit, writer) = if audit_enabled {
            let dir = args
                .audit_dir
                .clone()
                .unwrap_or_else(|| config.audit.dir.clone());
            let (sender, handle) = AuditWriter::spawn(dir, Utc::now());
            (sender, Some(handle))
        } else {
            (AuditSender::disabled(), None)
        };

        let options = CompareOptions {
            item_concurrency: args.concurrency.unwrap_or(config.fetch.item_concurrency),
            batch_concurrency: config.fetch.batch_concurrency,
            audit,
        };

        let result = tokio::select! {
            result = compare_work_items(
                source.as_ref(),
                &selection,
                instant_a,
                instant_b,
                &options,
            ) => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; discarding partial results");
                bail!("interrupted");
            }
        };
        // The writer finishes once the last sender is gone.
        drop(options);
        let audit_file = match writer {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        };

        let records = result?;
        Ok::<_, anyhow::Error>(build_report(
            records,
            instant_a,
            instant_b,
            args.only_changed,
            audit_file,
        ))
    })?;

    info!(
        total = report.summary.total,
        shown = report.rows.len(),
        "rendering comparison"
    );
    render_mode(
        output,
        &report,
        |r, w| write_list(w, &r.rows, OutputMode::Text),
        render_pretty,
    )
}

fn build_report(
    records: Vec<ComparisonRecord>,
    instant_a: DateTime<Utc>,
    instant_b: DateTime<Utc>,
    only_changed: bool,
    audit_file: Option<PathBuf>,
) -> CompareReport {
    let summary = ComparisonSummary::of(&records);
    let records: Vec<ComparisonRecord> = records
        .into_iter()
        .filter(|r| !only_changed || r.changed)
        .collect();
    CompareReport {
        from: format_timestamp(instant_a),
        to: format_timestamp(instant_b),
        summary,
        audit_file: audit_file.map(|p| p.display().to_string()),
        rows: project(&records),
        records,
    }
}

fn snapshot_line(label: &str, snapshot: &PointInTimeSnapshot) -> String {
    if !snapshot.resolved {
        return format!("{label}: (no history)");
    }
    let mut line = format!(
        "{label}: {:<12} by {:<20} on {}",
        snapshot.state.as_deref().unwrap_or_default(),
        snapshot.changed_by.as_deref().unwrap_or("-"),
        snapshot.changed_date.map(format_timestamp).unwrap_or_default(),
    );
    if snapshot.predates_history() {
        line.push_str("  *");
    }
    line
}

fn render_pretty(report: &CompareReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(
        w,
        &format!("Work item state: {} vs {}", report.from, report.to),
    )?;

    let mut any_fallback = false;
    for record in &report.records {
        let fields = &record.fields;
        let marker = if record.changed { "CHANGED" } else { "" };
        writeln!(
            w,
            "#{:<7} {:<12} {:<40} {marker}",
            fields.id, fields.work_item_type, fields.title
        )?;
        writeln!(
            w,
            "    {}",
            snapshot_line(
                &format_day(record.snapshot_a.instant),
                &record.snapshot_a
            )
        )?;
        writeln!(
            w,
            "    {}",
            snapshot_line(
                &format_day(record.snapshot_b.instant),
                &record.snapshot_b
            )
        )?;
        if let Some(error) = &record.error {
            writeln!(w, "    error[{}]: {}", error.code, error.message)?;
        }
        any_fallback |=
            record.snapshot_a.predates_history() || record.snapshot_b.predates_history();
    }

    if report.records.is_empty() {
        writeln!(w, "No work items to show.")?;
    }
    pretty_rule(w)?;
    pretty_kv(w, "Items", report.summary.total.to_string())?;
    pretty_kv(w, "Changed", report.summary.changed.to_string())?;
    if report.summary.failed > 0 {
        pretty_kv(w, "Failed", report.summary.failed.to_string())?;
    }
    if let Some(path) = &report.audit_file {
        pretty_kv(w, "Audit file", path)?;
    }
    if any_fallback {
        writeln!(
            w,
            "* instant precedes the item's first revision; its earliest state is shown"
        )?;
    }
    Ok(())
}
