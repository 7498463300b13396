//! Resolver configuration file management.

use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use zonegraph::ResolverConfig;

/// File name inside the platform config directory
pub const CONFIG_FILE: &str = "resolver.toml";

/// Default config file path.
pub fn default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("dev", "zonegraph", "zonegraph")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(dirs.config_dir().join(CONFIG_FILE))
}

/// The explicit path if given, else the default one.
pub fn path(explicit: Option<&Path>) -> Result<PathBuf> {
    explicit.map_or_else(default_path, |p| Ok(p.to_path_buf()))
}

/// Load and validate; a missing file yields defaults.
pub fn load(path: &Path) -> Result<ResolverConfig> {
    let config = ResolverConfig::load(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(config.validate()?)
}

/// Write the default configuration.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(&ResolverConfig::default())?;
    std::fs::write(path, content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        init(&path, false).unwrap();
        assert_eq!(load(&path).unwrap(), ResolverConfig::default());

        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "maxResolutionHops = 40\n").unwrap();

        assert!(load(&path).is_err());
    }
}
