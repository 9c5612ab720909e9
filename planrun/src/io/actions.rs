//! Per-action primitives used by the executor.
//!
//! Every function resolves its paths through the sandbox first, so an
//! escaping path fails before any filesystem access in both dry-run and live
//! mode. In dry-run mode the mutation is computed but never persisted.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use regex::RegexBuilder;
use tracing::{debug, instrument, warn};

use crate::core::errors::PlanError;
use crate::core::plan::Find;
use crate::core::sandbox::resolve;
use crate::io::config::{EngineConfig, InstallConfig};
use crate::io::process::run_command;

/// Resolved plan root plus the gates in force for this run.
#[derive(Debug, Clone, Copy)]
pub struct ActionEnv<'a> {
    pub root: &'a Path,
    pub config: &'a EngineConfig,
}

impl ActionEnv<'_> {
    fn dry_run(&self) -> bool {
        self.config.dry_run
    }
}

/// Captured output of a successful action (`shell`/`install` only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ActionOutput {
    fn captured(stdout: String, stderr: String) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
        }
    }
}

pub fn mkdir(env: ActionEnv<'_>, path: &str) -> Result<ActionOutput, PlanError> {
    let target = target(env, "mkdir", path)?;
    if env.dry_run() {
        return Ok(ActionOutput::default());
    }
    if let Err(err) = fs::create_dir_all(&target) {
        debug!(path = %target.display(), err = %err, "ignoring mkdir error");
    }
    Ok(ActionOutput::default())
}

pub fn write(env: ActionEnv<'_>, path: &str, content: &str) -> Result<ActionOutput, PlanError> {
    let target = target(env, "write", path)?;
    if env.dry_run() {
        return Ok(ActionOutput::default());
    }
    persist(&target, content)?;
    Ok(ActionOutput::default())
}

pub fn append(env: ActionEnv<'_>, path: &str, content: &str) -> Result<ActionOutput, PlanError> {
    let target = target(env, "append", path)?;
    let mut next = match fs::read_to_string(&target) {
        Ok(existing) => existing,
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => return Err(PlanError::io("read", &target, err)),
    };
    next.push_str(content);
    if env.dry_run() {
        return Ok(ActionOutput::default());
    }
    persist(&target, &next)?;
    Ok(ActionOutput::default())
}

pub fn edit(
    env: ActionEnv<'_>,
    path: &str,
    find: &Find,
    replace: &str,
) -> Result<ActionOutput, PlanError> {
    let target = target(env, "edit", path)?;
    if find.is_empty() {
        return Err(PlanError::MissingField {
            action: "edit",
            field: "find",
        });
    }
    let original = match fs::read_to_string(&target) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(PlanError::MissingFile {
                path: path.to_string(),
            });
        }
        Err(err) => return Err(PlanError::io("read", &target, err)),
    };
    let updated = apply_find(&original, find, replace)?;
    if env.dry_run() {
        return Ok(ActionOutput::default());
    }
    if updated != original {
        persist(&target, &updated)?;
    }
    Ok(ActionOutput::default())
}

#[instrument(skip_all, fields(cmd = %cmd))]
pub fn shell(env: ActionEnv<'_>, cmd: &str, cwd: Option<&str>) -> Result<ActionOutput, PlanError> {
    if !env.config.allow_shell {
        return Err(PlanError::PermissionGate {
            action: "shell",
            gate: "allow_shell",
        });
    }
    if cmd.trim().is_empty() {
        return Err(PlanError::MissingField {
            action: "shell",
            field: "cmd",
        });
    }
    let workdir = resolve(env.root, cwd.unwrap_or("."))?;
    if env.dry_run() {
        return Ok(ActionOutput::captured(String::new(), String::new()));
    }

    let shell = &env.config.shell;
    let mut command = Command::new(&shell.program);
    command.args(&shell.args).arg(cmd).current_dir(&workdir);
    let output = run_command(
        command,
        None,
        env.config.shell_timeout(),
        env.config.output_limit_bytes,
    )
    .map_err(|err| PlanError::Subprocess {
        message: format!("failed to run `{cmd}`: {err:#}"),
        stdout: None,
        stderr: None,
    })?;

    let stdout = output.stdout_text();
    let stderr = output.stderr_text();
    if output.timed_out {
        warn!("shell step timed out");
        return Err(PlanError::Subprocess {
            message: format!(
                "`{cmd}` timed out after {}s",
                env.config.shell_timeout_secs.unwrap_or_default()
            ),
            stdout: Some(stdout),
            stderr: Some(stderr),
        });
    }
    if !output.status.success() {
        let code = output
            .status
            .code()
            .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
        return Err(PlanError::Subprocess {
            message: format!("`{cmd}` exited with {code}"),
            stdout: Some(stdout),
            stderr: Some(stderr),
        });
    }
    Ok(ActionOutput::captured(stdout, stderr))
}

pub fn install(
    env: ActionEnv<'_>,
    packages: &[String],
    dev: bool,
    cwd: Option<&str>,
) -> Result<ActionOutput, PlanError> {
    if !env.config.allow_install {
        return Err(PlanError::PermissionGate {
            action: "install",
            gate: "allow_install",
        });
    }
    if packages.is_empty() {
        return Ok(ActionOutput::default());
    }
    let cmd = install_command(&env.config.install, packages, dev);
    shell(env, &cmd, cwd)
}

/// Single package-manager invocation with each package name double-quoted.
pub fn install_command(config: &InstallConfig, packages: &[String], dev: bool) -> String {
    let mut parts = config.command.clone();
    if dev && !config.dev_flag.is_empty() {
        parts.push(config.dev_flag.clone());
    }
    parts.extend(packages.iter().map(|pkg| quote(pkg)));
    parts.join(" ")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Substitute `find` in `original`.
///
/// Literals replace every non-overlapping occurrence. Patterns honour their
/// flags: `g` replaces all matches (otherwise only the first), `i`, `m`, `s`
/// and `x` map onto the regex builder, `u` is accepted as a no-op. The
/// replacement uses `$&`, `$1`.. and `$$` references; see
/// [`replacement_template`].
pub fn apply_find(original: &str, find: &Find, replace: &str) -> Result<String, PlanError> {
    let (body, flags) = match find {
        Find::Literal(text) => return Ok(original.replace(text.as_str(), replace)),
        Find::Pattern { body, flags } => (body, flags),
    };
    let invalid = |reason: String| PlanError::InvalidPattern {
        body: body.clone(),
        flags: flags.clone(),
        reason,
    };

    let mut builder = RegexBuilder::new(body);
    let mut global = false;
    for flag in flags.chars() {
        match flag {
            'g' => global = true,
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'u' => {}
            other => return Err(invalid(format!("unsupported flag `{other}`"))),
        }
    }
    let re = builder.build().map_err(|err| invalid(err.to_string()))?;
    let replacement = replacement_template(replace);
    let updated = if global {
        re.replace_all(original, replacement.as_str())
    } else {
        re.replace(original, replacement.as_str())
    };
    Ok(updated.into_owned())
}

/// Rewrite a `$&` / `$1` / `$$` replacement into `regex` expansion syntax.
///
/// Numbered groups are braced so trailing word characters stay literal
/// (`$1bar` is group 1 followed by `bar`). Any other `$` is kept as text.
fn replacement_template(replace: &str) -> String {
    let mut out = String::with_capacity(replace.len() + 8);
    let mut chars = replace.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    digits.push(d);
                }
                out.push_str(&format!("${{{digits}}}"));
            }
            _ => out.push_str("$$"),
        }
    }
    out
}

fn target(env: ActionEnv<'_>, action: &'static str, path: &str) -> Result<PathBuf, PlanError> {
    if path.trim().is_empty() {
        return Err(PlanError::MissingField {
            action,
            field: "path",
        });
    }
    resolve(env.root, path)
}

fn persist(target: &Path, contents: &str) -> Result<(), PlanError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|err| PlanError::io("create directory", parent, err))?;
    }
    fs::write(target, contents).map_err(|err| PlanError::io("write", target, err))
}
