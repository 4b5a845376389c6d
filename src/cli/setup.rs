use crate::core::config::AppConfig;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");

/// Writes the example configuration to the default config location.
pub fn setup(force: bool) -> Result<()> {
    let path = AppConfig::default_config_path()?;
    let written = write_example_config(&path, force)?;
    println!(
        "Wrote {}. Point the feeds at your vendors, then run `equity-aggregator aggregate`.",
        written.display()
    );
    Ok(())
}

/// Writes the example configuration to `path`, refusing to replace an
/// existing file unless `force` is set.
pub fn write_example_config(path: &Path, force: bool) -> Result<PathBuf> {
    if path.exists() && !force {
        bail!(
            "Configuration file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    info!(path = %path.display(), overwritten = force, "Wrote example configuration");
    Ok(path.to_path_buf())
}
