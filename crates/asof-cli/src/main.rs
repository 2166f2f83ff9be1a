#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::process::ExitCode;

use asof_core::config::resolve_config;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cmd::catalog::{Catalog, CatalogArgs};

#[derive(Parser, Debug)]
#[command(
    name = "asof",
    author,
    version,
    about = "asof: point-in-time work item state comparison for Azure DevOps",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (pretty, text, json).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Personal access token (defaults to `AZURE_DEVOPS_PAT`).
    #[arg(long, global = true, value_name = "TOKEN")]
    pat: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn pat_flag(&self) -> Option<&str> {
        self.pat.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Compare",
        about = "Compare work item state at two instants",
        long_about = "Select the work items of an iteration and report each item's state, \
                      who set it and when, as of two points in time.",
        after_help = "EXAMPLES:\n    # Compare a sprint between two dates\n    asof compare --org fabrikam -p Web --team \"Web Team\" \\\n        -i \"Web\\Sprint 12\" --from 2024-02-01 --to 2024-03-01\n\n    # Only bugs, only rows that changed\n    asof compare -i \"Web\\Sprint 12\" -t Bug --from 2024-02-01 --to 2024-03-01 --only-changed\n\n    # Replay a saved fixture with machine-readable output\n    asof compare -p Web --team T -i \"Web\\Sprint 12\" --from 2024-02-01 --to 2024-03-01 \\\n        --fixture items.json --format json"
    )]
    Compare(cmd::compare::CompareArgs),

    #[command(
        next_help_heading = "Catalog",
        about = "List projects in the organization",
        after_help = "EXAMPLES:\n    # List projects\n    asof projects --org fabrikam\n\n    # Emit machine-readable output\n    asof projects --org fabrikam --format json"
    )]
    Projects(CatalogArgs),

    #[command(
        next_help_heading = "Catalog",
        about = "List teams in a project",
        after_help = "EXAMPLES:\n    # List teams\n    asof teams --org fabrikam -p Web"
    )]
    Teams(CatalogArgs),

    #[command(
        next_help_heading = "Catalog",
        about = "List a team's iterations",
        after_help = "EXAMPLES:\n    # List iterations with their dates\n    asof iterations --org fabrikam -p Web --team \"Web Team\""
    )]
    Iterations(CatalogArgs),

    #[command(
        next_help_heading = "Catalog",
        about = "List enabled work item types",
        after_help = "EXAMPLES:\n    # List work item types\n    asof types --org fabrikam -p Web"
    )]
    Types(CatalogArgs),

    #[command(
        next_help_heading = "Configuration",
        about = "Show or edit configuration",
        long_about = "Show effective configuration, or set and unset keys in the project \
                      (.asof.toml) or user scope.",
        after_help = "EXAMPLES:\n    # Show effective configuration\n    asof config show\n\n    # Set the default organization for this directory\n    asof config set connection.organization fabrikam\n\n    # Set a user-wide default\n    asof config set --scope user fetch.item_concurrency 8"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Configuration",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    asof completions bash\n\n    # Generate zsh completions\n    asof completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("ASOF_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "asof=debug,info"
        } else if quiet {
            "error"
        } else {
            "asof=info,warn"
        })
    });

    let format = env::var("ASOF_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;
    let pat = cli.pat_flag();

    match &cli.command {
        Commands::Compare(args) => cmd::compare::run_compare(args, pat, output, &project_root),
        Commands::Projects(args) => {
            cmd::catalog::run_catalog(Catalog::Projects, args, pat, output, &project_root)
        }
        Commands::Teams(args) => {
            cmd::catalog::run_catalog(Catalog::Teams, args, pat, output, &project_root)
        }
        Commands::Iterations(args) => {
            cmd::catalog::run_catalog(Catalog::Iterations, args, pat, output, &project_root)
        }
        Commands::Types(args) => {
            cmd::catalog::run_catalog(Catalog::Types, args, pat, output, &project_root)
        }
        Commands::Config(args) => cmd::config::run_config(args, &project_root, output),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // A broken config file is reported by the command itself.
    let config_output = env::current_dir()
        .ok()
        .and_then(|root| resolve_config(&root).ok())
        .and_then(|config| config.output);
    let output = resolve_output_mode(cli.format, cli.json, config_output.as_deref());
    debug!(?output, "output mode resolved");

    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error = CliError::from_anyhow(&err);
            if render_error(output, &error).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
