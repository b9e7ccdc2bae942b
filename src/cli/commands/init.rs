//! Init and Config commands.

use anyhow::{Context, Result};

use crate::config::Settings;

/// Create `.hdlindex/settings.toml` in the current directory.
pub fn run_init(force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Cannot determine the current directory")?;
    let path = Settings::init_config_file(&cwd, force)?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize include paths, defines and logging.");
    Ok(())
}

/// Print the effective settings as TOML.
pub fn run_config(settings: &Settings) -> Result<()> {
    let body = toml::to_string_pretty(settings).context("Cannot render settings")?;
    println!("{body}");
    Ok(())
}
