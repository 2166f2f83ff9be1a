use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate a completion script for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `command` to stdout.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_completions(shell, command, &mut out)?;
    Ok(())
}

/// The script is registered under the command's own name, so it follows a
/// renamed binary.
pub fn write_completions(
    shell: Shell,
    command: &mut clap::Command,
    out: &mut dyn Write,
) -> io::Result<()> {
    let name = command.get_name().to_string();
    generate(shell, command, name, out);
    out.flush()
}
