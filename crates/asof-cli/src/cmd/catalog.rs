//! Catalog lookups that help pick a selection: projects, teams, iterations
//! and work item types.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use asof_ado::{Iteration, Project, Team, WorkItemType};
use asof_core::config::resolve_config;
use clap::Args;
use tracing::debug;

use super::{ConnectionArgs, required};
use crate::output::{OutputMode, Renderable, render_list, write_tsv_row};

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Projects,
    Teams,
    Iterations,
    Types,
}

pub fn run_catalog(
    kind: Catalog,
    args: &CatalogArgs,
    pat_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let config = resolve_config(project_root)?;
    let client = args.connection.connect(&config, pat_flag)?;
    let rt = super::runtime()?;
    debug!(?kind, organization = client.organization(), "listing catalog");

    match kind {
        Catalog::Projects => {
            let projects = rt.block_on(client.list_projects())?;
            render_list(&projects, output)?;
        }
        Catalog::Teams => {
            let project = required(args.connection.project(&config), "project")?;
            let teams = rt.block_on(client.list_teams(&project))?;
            render_list(&teams, output)?;
        }
        Catalog::Iterations => {
            let project = required(args.connection.project(&config), "project")?;
            let team = required(args.connection.team(&config), "team")?;
            let iterations = rt.block_on(client.list_iterations(&project, &team))?;
            render_list(&iterations, output)?;
        }
        Catalog::Types => {
            let project = required(args.connection.project(&config), "project")?;
            let mut types = rt.block_on(client.list_work_item_types(&project))?;
            types.retain(|t| !t.is_disabled);
            render_list(&types, output)?;
        }
    }
    Ok(())
}

fn json_line<T: serde::Serialize>(w: &mut dyn Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *w, value)?;
    writeln!(w)
}

impl Renderable for Project {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        match &self.description {
            Some(description) if !description.is_empty() => {
                writeln!(w, "{:<32} {description}", self.name)
            }
            _ => writeln!(w, "{}", self.name),
        }
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        json_line(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        write_tsv_row(w, &[self.name.clone(), self.id.clone()])
    }

    fn table_headers() -> &'static [&'static str] {
        &["name", "id"]
    }
}

impl Renderable for Team {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}", self.name)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        json_line(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        write_tsv_row(w, &[self.name.clone(), self.id.clone()])
    }

    fn table_headers() -> &'static [&'static str] {
        &["name", "id"]
    }
}

impl Renderable for Iteration {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let dates = match (&self.attributes.start_date, &self.attributes.finish_date) {
            (Some(start), Some(finish)) => format!("{} .. {}", day(start), day(finish)),
            _ => String::new(),
        };
        let current = if self.attributes.time_frame.as_deref() == Some("current") {
            " (current)"
        } else {
            ""
        };
        writeln!(w, "{:<40} {dates}{current}", self.path)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        json_line(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let attrs = &self.attributes;
        write_tsv_row(
            w,
            &[
                self.path.clone(),
                self.name.clone(),
                attrs.start_date.clone().unwrap_or_default(),
                attrs.finish_date.clone().unwrap_or_default(),
                attrs.time_frame.clone().unwrap_or_default(),
            ],
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["path", "name", "start", "finish", "timeframe"]
    }
}

impl Renderable for WorkItemType {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}", self.name)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        json_line(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        write_tsv_row(
            w,
            &[
                self.name.clone(),
                self.reference_name.clone().unwrap_or_default(),
            ],
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["name", "reference"]
    }
}

/// Date part of an upstream timestamp.
fn day(raw: &str) -> &str {
    raw.split_once('T').map_or(raw, |(date, _)| date)
}
