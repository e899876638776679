// CLI Commands
// Subcommand implementations and shared config loading

pub mod plan;
pub mod run;

use crate::output;

use std::path::{Path, PathBuf};

use color_eyre::Result;

use kubeforge_service::config::default_config_path;
use kubeforge_service::ForgeConfig;

/// Load the configuration at `path`, or the default location
pub fn load_config(path: Option<&Path>) -> Result<ForgeConfig> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    output::status("Loading", &format!("{}", path.display()));
    let config = ForgeConfig::from_file(&path)?;
    if config.inventory.hosts.is_empty() {
        color_eyre::eyre::bail!("Inventory in {} declares no hosts", path.display());
    }
    Ok(config)
}
