//! `codeloop tools`: print the tool catalogue.

use std::path::PathBuf;

use anyhow::Context;
use codeloop_config::AppConfig;

pub fn run(dir: PathBuf, json: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let registry = codeloop_tools::default_registry(&config.tools, dir)
        .context("Failed to register tools")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        return Ok(());
    }

    let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);
    for def in registry.definitions() {
        println!("  {:width$}  {}", def.name, def.description);
    }
    Ok(())
}
