//! Config file commands.

use std::path::Path;

use crate::config::{self, Config};
use crate::error::ResultExt;

/// Print the effective configuration as TOML
pub fn cmd_config_show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = config::load(path);
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Write the default configuration
pub fn cmd_config_init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path()
            .ok_or(config::ConfigError::NoConfigDir)
            .with_context("locating config file")?,
    };

    if target.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", target.display());
    }

    config::save(&Config::default(), Some(&target))
        .with_context(format!("writing {}", target.display()))?;
    println!("Wrote {}", target.display());
    Ok(())
}
