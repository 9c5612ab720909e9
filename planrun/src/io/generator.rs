//! Plan generator abstraction.
//!
//! The [`PlanGenerator`] trait decouples orchestration from the model backend.
//! [`CommandGenerator`] pipes the rendered prompt into an external command
//! (by default `codex exec -`) and returns its stdout as raw plan text. Tests
//! use scripted generators that return predetermined text without spawning
//! processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::plan::{Plan, parse_plan};
use crate::io::config::GeneratorConfig;
use crate::io::history::Turn;
use crate::io::process::run_command;
use crate::io::prompt::PromptEngine;

/// Instruction profile for a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Full schema and general scaffolding rules.
    Planning,
    /// Same schema; minimal, targeted steps addressing reported failures.
    Repair,
}

/// Parameters for a generator invocation.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub profile: Profile,
    /// Prior turns, oldest first.
    pub history: Vec<Turn>,
    /// User request or repair context brief.
    pub prompt: String,
}

/// Abstraction over plan generation backends.
pub trait PlanGenerator {
    /// Return raw text expected to contain a plan.
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

/// Generator that spawns an external command.
pub struct CommandGenerator {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptEngine,
}

impl CommandGenerator {
    pub fn new(config: &GeneratorConfig, workdir: PathBuf, output_limit_bytes: usize) -> Self {
        Self {
            command: config.command.clone(),
            workdir,
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes,
            prompts: PromptEngine::new(),
        }
    }
}

impl PlanGenerator for CommandGenerator {
    #[instrument(skip_all, fields(profile = ?request.profile, timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        info!(program = %program, "invoking plan generator");

        let prompt = self.prompts.render_request(request)?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);

        let output = run_command(
            cmd,
            Some(prompt.as_bytes()),
            Some(self.timeout),
            self.output_limit_bytes,
        )
        .with_context(|| format!("run generator `{program}`"))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        debug!(bytes = output.stdout.len(), "generator completed");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// A coerced plan plus the raw text it came from.
#[derive(Debug, Clone)]
pub struct Generated {
    pub plan: Plan,
    pub raw: String,
}

/// Generate and coerce a plan.
///
/// Generator failures and unparseable output are both errors; a parse failure
/// carries [`crate::core::errors::PlanError::Parse`].
#[instrument(skip_all, fields(profile = ?request.profile))]
pub fn generate_plan<G: PlanGenerator>(
    generator: &G,
    request: &GenerateRequest,
) -> Result<Generated> {
    let raw = generator.generate(request)?;
    let plan = parse_plan(&raw)?;
    debug!(steps = plan.steps.len(), goal = %plan.goal, "parsed generated plan");
    Ok(Generated { plan, raw })
}
