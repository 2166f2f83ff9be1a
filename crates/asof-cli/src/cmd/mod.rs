pub mod catalog;
pub mod compare;
pub mod completions;
pub mod config;

use std::time::Duration;

use anyhow::{Context, Result};
use asof_ado::AdoClient;
use asof_core::config::{AsofConfig, resolve_pat};
use asof_core::AsofError;
use clap::Args;

/// Connection flags shared by every command that talks to the upstream.
///
/// Each flag overrides the matching `[connection]` config key.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Azure DevOps organization.
    #[arg(long = "org", value_name = "ORG")]
    pub organization: Option<String>,

    /// Project name.
    #[arg(long, short = 'p')]
    pub project: Option<String>,

    /// Team name.
    #[arg(long)]
    pub team: Option<String>,

    /// Service root (defaults to https://dev.azure.com).
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,
}

impl ConnectionArgs {
    pub fn organization(&self, config: &AsofConfig) -> Option<String> {
        pick(self.organization.as_deref(), config.connection.organization.as_deref())
    }

    pub fn project(&self, config: &AsofConfig) -> Option<String> {
        pick(self.project.as_deref(), config.connection.project.as_deref())
    }

    pub fn team(&self, config: &AsofConfig) -> Option<String> {
        pick(self.team.as_deref(), config.connection.team.as_deref())
    }

    /// Build a live client from flags, config and the resolved token.
    ///
    /// # Errors
    ///
    /// Fails with [`AsofError::AuthenticationMissing`] before any request is
    /// made when no token is available.
    pub fn connect(&self, config: &AsofConfig, pat_flag: Option<&str>) -> Result<AdoClient> {
        let pat = resolve_pat(pat_flag)?;
        let organization = self.organization(config).ok_or_else(|| {
            AsofError::Config("organization is required (--org or connection.organization)".into())
        })?;
        let base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| config.connection.base_url.clone());
        let timeout = Duration::from_secs(config.connection.timeout_secs.max(1));

        let client = AdoClient::new(&base_url, &organization, pat, timeout)
            .with_context(|| format!("failed to set up client for {base_url}"))?;
        Ok(match self.project(config) {
            Some(project) => client.with_project(project),
            None => client,
        })
    }
}

/// Flag value if set and non-blank, otherwise the config value.
fn pick(flag: Option<&str>, config: Option<&str>) -> Option<String> {
    [flag, config]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Require a value that may come from a flag or config.
pub fn required(value: Option<String>, what: &str) -> Result<String> {
    value.ok_or_else(|| AsofError::InvalidSelection(format!("{what} is required")).into())
}

/// Single-threaded runtime shared by all async commands.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
