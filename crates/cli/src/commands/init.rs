//! `codeloop init`: write the default config file.

use std::path::Path;

use anyhow::Context;
use codeloop_config::AppConfig;

pub fn run(force: bool) -> anyhow::Result<()> {
    let path = AppConfig::config_dir().join("config.toml");
    if write_default(&path, force)? {
        println!("Created {}", path.display());
        println!("Set CODELOOP_API_KEY (or OPENAI_API_KEY), or add api_key to the file.");
    } else {
        println!("Config already exists at {} (use --force to overwrite)", path.display());
    }
    Ok(())
}

/// Returns `false` when the file exists and `force` is off.
fn write_default(path: &Path, force: bool) -> anyhow::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_once_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        assert!(write_default(&path, false).unwrap());
        std::fs::write(&path, "model = \"custom\"\n").unwrap();

        assert!(!write_default(&path, false).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "model = \"custom\"\n");

        assert!(write_default(&path, true).unwrap());
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.model, "gpt-4o");
    }
}
