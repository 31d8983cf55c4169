//! Configuration commands.

use console::style;

use crate::config::HarvestConfig;

/// Print the effective configuration as TOML.
pub fn cmd_config_show(config: &HarvestConfig) -> anyhow::Result<()> {
    match &config.source_path {
        Some(path) => eprintln!("{} Loaded from {}", style("→").dim(), path.display()),
        None => eprintln!("{} No config file found, using defaults", style("!").yellow()),
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
