//! Initialization helpers for `.planrun/` scaffolding and workspace trust.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::config::{EngineConfig, write_config};

/// All canonical paths within `.planrun/` for a workspace.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub trust_marker_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl EnginePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".planrun");
        Self {
            root: root.clone(),
            config_path: state_dir.join("config.toml"),
            trust_marker_path: state_dir.join("TRUSTED"),
            gitignore_path: state_dir.join(".gitignore"),
            state_dir,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Overwrite an existing config with defaults.
    pub force: bool,
    /// Mark the workspace trusted for live runs.
    pub trust: bool,
}

/// Create `.planrun/` with a default config, optionally marking trust.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<EnginePaths> {
    let paths = EnginePaths::new(root);
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create {}", paths.state_dir.display()))?;

    if options.force || !paths.config_path.exists() {
        write_config(&paths.config_path, &EngineConfig::default())?;
        debug!(path = %paths.config_path.display(), "wrote default config");
    }
    if !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, "TRUSTED\n")
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }
    if options.trust {
        fs::write(&paths.trust_marker_path, "")
            .with_context(|| format!("write {}", paths.trust_marker_path.display()))?;
    }
    Ok(paths)
}

/// A workspace is trusted once `.planrun/TRUSTED` exists.
pub fn is_trusted(paths: &EnginePaths) -> bool {
    paths.trust_marker_path.is_file()
}
