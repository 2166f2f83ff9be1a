use anyhow::{Context, Result, anyhow, bail};
use asof_core::config::{AsofConfig, project_config_path, resolve_config, user_config_path};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use toml::Value;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show resolved or raw configuration
    Show(ShowArgs),
    /// Print the config file locations
    Path,
    /// Set a configuration key in project or user scope
    Set(SetArgs),
    /// Unset a configuration key in project or user scope
    Unset(UnsetArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show raw project config only
    #[arg(long, conflicts_with = "user")]
    project: bool,

    /// Show raw user config only
    #[arg(long)]
    user: bool,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Key (e.g. connection.organization, fetch.item_concurrency, output)
    key: String,

    /// New value
    value: String,
}

#[derive(Args, Debug)]
struct UnsetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Key (e.g. connection.team, audit.enabled)
    key: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ConfigScope {
    Project,
    User,
}

/// Where a key lives and what type its value has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Text,
    Integer,
    Flag,
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
        ConfigCommand::Path => run_path(project_root, output),
        ConfigCommand::Set(set) => run_set(set, project_root, output),
        ConfigCommand::Unset(unset) => run_unset(unset, project_root, output),
    }
}

fn scope_path(scope: ConfigScope, project_root: &Path) -> Result<PathBuf> {
    match scope {
        ConfigScope::Project => Ok(project_config_path(project_root)),
        ConfigScope::User => {
            user_config_path().ok_or_else(|| anyhow!("No user config directory on this platform"))
        }
    }
}

const fn scope_label(scope: ConfigScope) -> &'static str {
    match scope {
        ConfigScope::Project => "project",
        ConfigScope::User => "user",
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project || args.user {
        let scope = if args.project {
            ConfigScope::Project
        } else {
            ConfigScope::User
        };
        let value = load_toml_table(&scope_path(scope, project_root)?)?;
        print_toml_or_json(&value, output)?;
        return Ok(());
    }

    let effective = resolve_config(project_root)?;
    print_effective(&effective, output)
}

#[derive(Debug, Serialize)]
struct ConfigPaths {
    project: String,
    user: Option<String>,
}

fn run_path(project_root: &Path, output: OutputMode) -> Result<()> {
    let paths = ConfigPaths {
        project: project_config_path(project_root).display().to_string(),
        user: user_config_path().map(|p| p.display().to_string()),
    };
    render_mode(
        output,
        &paths,
        |p, w| {
            writeln!(w, "project\t{}", p.project)?;
            writeln!(w, "user\t{}", p.user.as_deref().unwrap_or_default())
        },
        |p, w| {
            pretty_kv(w, "Project", &p.project)?;
            pretty_kv(w, "User", p.user.as_deref().unwrap_or("(none)"))
        },
    )
}

fn run_set(args: &SetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_set(&mut value, &args.key, &args.value)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "set", scope_label(args.scope), &args.key)
}

fn run_unset(args: &UnsetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_unset(&mut value, &args.key)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "unset", scope_label(args.scope), &args.key)
}

/// Split a key into an optional section and a leaf, rejecting unknown keys.
fn split_known_key(key: &str) -> Result<(Option<&str>, &str, KeyKind)> {
    let (section, leaf) = key
        .split_once('.')
        .map_or((None, key), |(section, leaf)| (Some(section), leaf));

    let kind = match (section, leaf) {
        (Some("connection"), "organization" | "project" | "team" | "base_url")
        | (Some("audit"), "dir")
        | (None, "output") => KeyKind::Text,
        (Some("connection"), "timeout_secs")
        | (Some("fetch"), "item_concurrency" | "batch_concurrency") => KeyKind::Integer,
        (Some("audit"), "enabled") => KeyKind::Flag,
        _ => bail!("Unsupported key `{key}`"),
    };
    Ok((section, leaf, kind))
}

fn parse_value(key: &str, kind: KeyKind, raw: &str) -> Result<Value> {
    match kind {
        KeyKind::Text => {
            if key == "output" && !matches!(raw, "pretty" | "text" | "json") {
                bail!("output expects pretty, text or json");
            }
            Ok(Value::String(raw.to_string()))
        }
        KeyKind::Integer => {
            let number: i64 = raw
                .parse()
                .with_context(|| format!("{key} expects a whole number"))?;
            if number < 1 {
                bail!("{key} must be at least 1");
            }
            Ok(Value::Integer(number))
        }
        KeyKind::Flag => {
            let value: bool = raw
                .parse()
                .with_context(|| format!("{key} expects true or false"))?;
            Ok(Value::Boolean(value))
        }
    }
}

fn apply_set(root: &mut Value, key: &str, raw: &str) -> Result<()> {
    let (section, leaf, kind) = split_known_key(key)?;
    let parsed = parse_value(key, kind, raw)?;

    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    let Some(section) = section else {
        table.insert(leaf.to_string(), parsed);
        return Ok(());
    };

    let section_table = table
        .entry(section.to_string())
        .or_insert_with(|| Value::Table(toml::map::Map::new()))
        .as_table_mut()
        .ok_or_else(|| anyhow!("Section {section} must be a TOML table"))?;

    section_table.insert(leaf.to_string(), parsed);
    Ok(())
}

fn apply_unset(root: &mut Value, key: &str) -> Result<()> {
    let (section, leaf, _) = split_known_key(key)?;
    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    let Some(section) = section else {
        table.remove(leaf);
        return Ok(());
    };

    if let Some(section_table) = table.get_mut(section).and_then(Value::as_table_mut) {
        section_table.remove(leaf);
        if section_table.is_empty() {
            table.remove(section);
        }
    }
    Ok(())
}

fn load_toml_table(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Table(toml::map::Map::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if !value.is_table() {
        bail!("{} must contain a top-level TOML table", path.display());
    }

    Ok(value)
}

fn write_toml_table(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let serialized = toml::to_string_pretty(value)?;
    std::fs::write(path, serialized).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_toml_or_json(value: &Value, output: OutputMode) -> Result<()> {
    if output.is_json() {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", toml::to_string_pretty(value)?);
    }
    Ok(())
}

fn print_effective(config: &AsofConfig, output: OutputMode) -> Result<()> {
    render_mode(
        output,
        config,
        |c, w| {
            for (key, value) in flatten(c) {
                writeln!(w, "{key}={value}")?;
            }
            Ok(())
        },
        |c, w| {
            pretty_section(w, "Effective configuration")?;
            for (key, value) in flatten(c) {
                pretty_kv(w, &key, value)?;
            }
            Ok(())
        },
    )
}

fn flatten(config: &AsofConfig) -> Vec<(String, String)> {
    let c = &config.connection;
    let opt = |v: Option<&str>| v.unwrap_or_default().to_string();
    vec![
        ("connection.organization".into(), opt(c.organization.as_deref())),
        ("connection.project".into(), opt(c.project.as_deref())),
        ("connection.team".into(), opt(c.team.as_deref())),
        ("connection.base_url".into(), c.base_url.clone()),
        ("connection.timeout_secs".into(), c.timeout_secs.to_string()),
        (
            "fetch.item_concurrency".into(),
            config.fetch.item_concurrency.to_string(),
        ),
        (
            "fetch.batch_concurrency".into(),
            config.fetch.batch_concurrency.to_string(),
        ),
        ("audit.enabled".into(), config.audit.enabled.to_string()),
        ("audit.dir".into(), config.audit.dir.display().to_string()),
        ("output".into(), opt(config.output.as_deref())),
    ]
}

fn render_mutation(output: OutputMode, action: &str, scope: &str, key: &str) -> Result<()> {
    let payload = serde_json::json!({
        "ok": true,
        "action": action,
        "scope": scope,
        "key": key,
    });
    render_mode(
        output,
        &payload,
        |_, w| writeln!(w, "{action}\t{scope}\t{key}"),
        |_, w| writeln!(w, "Config {action}: {scope}.{key}"),
    )
}
