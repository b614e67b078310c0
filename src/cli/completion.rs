//! Shell completion generation for docsnap
//!
//! Completion scripts for bash, zsh and fish, generated from the clap
//! definition of [`CliArgs`].

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

/// Binary name the scripts complete.
const BIN_NAME: &str = "docsnap";

/// Write the completion script for `shell_name` to stdout.
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let script = completion_script(shell_name)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&script)?;
    stdout.flush()?;
    Ok(())
}

/// Render the completion script for `shell_name`.
pub fn completion_script(shell_name: &str) -> Result<Vec<u8>> {
    let shell = parse_shell(shell_name)?;
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    Ok(buffer)
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        _ => Err(ConfigError::Generic(format!(
            "Unsupported shell: {}. Supported shells: bash, zsh, fish",
            shell_name
        ))
        .into()),
    }
}
