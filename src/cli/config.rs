//! `prompt-cache config` handler.

use anyhow::{Context, Result};

use prompt_cache::Config;

/// Print the effective configuration as pretty JSON.
pub(crate) fn cmd_config() -> Result<()> {
    let config = Config::load().context("Failed to load cache config")?;
    println!("# {}", Config::path().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
