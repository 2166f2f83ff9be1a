use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::compare::{DEFAULT_BATCH_CONCURRENCY, DEFAULT_ITEM_CONCURRENCY};
use crate::error::AsofError;

/// Environment variable holding the personal access token.
pub const PAT_ENV: &str = "AZURE_DEVOPS_PAT";

/// Project-local config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".asof.toml";

pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsofConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            organization: None,
            project: None,
            team: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_item_concurrency")]
    pub item_concurrency: usize,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            item_concurrency: default_item_concurrency(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_audit_dir(),
        }
    }
}

/// Raw layer as written on disk: every key optional so a project file can
/// override a single user setting without restating the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigLayer {
    #[serde(default)]
    connection: ConnectionLayer,
    #[serde(default)]
    fetch: FetchLayer,
    #[serde(default)]
    audit: AuditLayer,
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConnectionLayer {
    organization: Option<String>,
    project: Option<String>,
    team: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FetchLayer {
    item_concurrency: Option<usize>,
    batch_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuditLayer {
    enabled: Option<bool>,
    dir: Option<PathBuf>,
}

impl AsofConfig {
    fn apply(&mut self, layer: ConfigLayer) {
        let c = layer.connection;
        if c.organization.is_some() {
            self.connection.organization = c.organization;
        }
        if c.project.is_some() {
            self.connection.project = c.project;
        }
        if c.team.is_some() {
            self.connection.team = c.team;
        }
        if let Some(base_url) = c.base_url {
            self.connection.base_url = base_url;
        }
        if let Some(timeout) = c.timeout_secs {
            self.connection.timeout_secs = timeout;
        }
        if let Some(n) = layer.fetch.item_concurrency {
            self.fetch.item_concurrency = n.max(1);
        }
        if let Some(n) = layer.fetch.batch_concurrency {
            self.fetch.batch_concurrency = n.max(1);
        }
        if let Some(enabled) = layer.audit.enabled {
            self.audit.enabled = enabled;
        }
        if let Some(dir) = layer.audit.dir {
            self.audit.dir = dir;
        }
        if layer.output.is_some() {
            self.output = layer.output;
        }
    }
}

pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_CONFIG_FILE)
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("asof/config.toml"))
}

fn load_layer(path: &Path) -> Result<Option<ConfigLayer>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ConfigLayer>(&content)
        .map(Some)
        .map_err(|e| AsofError::Config(format!("{}: {e}", path.display())).into())
}

/// Load config from an explicit user file and project root.
///
/// Precedence (highest wins): project file, user file, built-in defaults.
pub fn load_config_from(user_path: Option<&Path>, project_root: &Path) -> Result<AsofConfig> {
    let mut config = AsofConfig::default();
    if let Some(layer) = user_path.map(load_layer).transpose()?.flatten() {
        config.apply(layer);
    }
    if let Some(layer) = load_layer(&project_config_path(project_root))? {
        config.apply(layer);
    }
    Ok(config)
}

pub fn resolve_config(project_root: &Path) -> Result<AsofConfig> {
    load_config_from(user_config_path().as_deref(), project_root)
}

/// Pick the personal access token: flag first, then environment.
///
/// # Errors
///
/// Returns [`AsofError::AuthenticationMissing`] when neither is set.
pub fn resolve_pat(flag: Option<&str>) -> Result<String, AsofError> {
    resolve_pat_inner(flag, env::var(PAT_ENV).ok().as_deref())
}

fn resolve_pat_inner(flag: Option<&str>, env_value: Option<&str>) -> Result<String, AsofError> {
    flag.into_iter()
        .chain(env_value)
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(ToString::to_string)
        .ok_or(AsofError::AuthenticationMissing)
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_item_concurrency() -> usize {
    DEFAULT_ITEM_CONCURRENCY
}

const fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("audit")
}
