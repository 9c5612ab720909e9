//! Engine configuration stored under `.planrun/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// conservative values: live mode, shell and install disabled, trust required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Validate and report without persisting any mutation.
    pub dry_run: bool,

    /// Permit `shell` steps (and the shell primitive used by `install`).
    pub allow_shell: bool,

    /// Permit `install` steps. Only meaningful when `allow_shell` is also set.
    pub allow_install: bool,

    /// Refuse live runs in an untrusted workspace.
    pub require_trusted_workspace: bool,

    /// Re-plan and re-run after failures.
    pub auto_repair: bool,

    /// Upper bound on repair generations after the initial run.
    pub max_repair_attempts: u32,

    /// Keep at most this many bytes of each subprocess stream.
    pub output_limit_bytes: usize,

    /// Bounded wait for `shell`/`install`. Unset means wait until exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_timeout_secs: Option<u64>,

    pub shell: ShellConfig,
    pub install: InstallConfig,
    pub generator: GeneratorConfig,
    pub listing: ListingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell binary (`sh` on unix, `cmd` on windows).
    pub program: String,
    /// Arguments placed before the command string (`-c` / `/C`).
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                program: "cmd".to_string(),
                args: vec!["/C".to_string()],
            }
        } else {
            Self {
                program: "sh".to_string(),
                args: vec!["-c".to_string()],
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallConfig {
    /// Package manager invocation prefix (e.g. `["npm","install"]`).
    pub command: Vec<String>,
    /// Flag appended for dev dependencies.
    pub dev_flag: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            command: vec!["npm".to_string(), "install".to_string()],
            dev_flag: "--save-dev".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// External plan generator. Receives the prompt on stdin, prints plan text.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListingConfig {
    /// Directory names skipped by the post-run listing.
    pub ignore: Vec<String>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            ignore: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                ".planrun".to_string(),
            ],
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            allow_shell: false,
            allow_install: false,
            require_trusted_workspace: true,
            auto_repair: false,
            max_repair_attempts: 2,
            output_limit_bytes: 1_000_000,
            shell_timeout_secs: None,
            shell: ShellConfig::default(),
            install: InstallConfig::default(),
            generator: GeneratorConfig::default(),
            listing: ListingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.shell_timeout_secs == Some(0) {
            return Err(anyhow!("shell_timeout_secs must be > 0 when set"));
        }
        if self.shell.program.trim().is_empty() {
            return Err(anyhow!("shell.program must be non-empty"));
        }
        if self.install.command.is_empty() || self.install.command[0].trim().is_empty() {
            return Err(anyhow!("install.command must be a non-empty array"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn shell_timeout(&self) -> Option<Duration> {
        self.shell_timeout_secs.map(Duration::from_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
