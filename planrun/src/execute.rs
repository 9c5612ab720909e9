//! Plan execution: a flat, ordered, continue-on-error interpreter.
//!
//! Trust is checked once per run, before any step. After that every step
//! yields exactly one [`StepResult`] in declaration order; a failing step is
//! recorded and the next step runs.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::errors::PlanError;
use crate::core::hash::plan_hash;
use crate::core::plan::{Plan, Step};
use crate::core::report::{RunReport, StepResult};
use crate::core::sandbox::resolve;
use crate::io::actions::{self, ActionEnv, ActionOutput};
use crate::io::config::EngineConfig;
use crate::io::listing::list_tree;
use crate::io::snapshot::{RevertStore, record_snapshot};

/// Everything a run consults: the workspace boundary, the gates, and trust.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub workspace: PathBuf,
    pub config: EngineConfig,
    pub trusted: bool,
}

impl ExecContext {
    pub fn new(workspace: impl Into<PathBuf>, config: EngineConfig, trusted: bool) -> Self {
        Self {
            workspace: workspace.into(),
            config,
            trusted,
        }
    }

    /// Live runs in an untrusted workspace are refused when trust is required.
    pub fn check_trust(&self) -> Result<(), PlanError> {
        if !self.config.dry_run && self.config.require_trusted_workspace && !self.trusted {
            return Err(PlanError::TrustRequired);
        }
        Ok(())
    }
}

/// Execute `plan` without snapshotting.
///
/// Fails only with [`PlanError::TrustRequired`]; every per-step problem is
/// reported in the returned results.
pub fn execute_plan(ctx: &ExecContext, plan: &Plan) -> Result<Vec<StepResult>> {
    ctx.check_trust()?;
    Ok(execute_steps(ctx, plan))
}

/// Snapshot, execute, and list: the full run used by sessions and the CLI.
///
/// Snapshots are skipped in dry-run mode since nothing is written.
#[instrument(skip_all, fields(steps = plan.steps.len(), dry_run = ctx.config.dry_run))]
pub fn run_plan(ctx: &ExecContext, store: &mut RevertStore, plan: &Plan) -> Result<RunReport> {
    ctx.check_trust()?;
    let hash = plan_hash(plan);
    let snapshot_files = if ctx.config.dry_run {
        0
    } else {
        record_snapshot(store, &ctx.workspace, plan, &hash)
    };

    let results = execute_steps(ctx, plan);
    let listing = list_root(ctx, plan);
    let report = RunReport {
        plan_hash: hash,
        dry_run: ctx.config.dry_run,
        snapshot_files,
        results,
        listing,
    };
    let summary = report.summary();
    info!(ok = summary.ok, failed = summary.failed, "plan executed");
    Ok(report)
}

fn execute_steps(ctx: &ExecContext, plan: &Plan) -> Vec<StepResult> {
    let root = resolve(&ctx.workspace, &plan.root);
    let mut results = Vec::with_capacity(plan.steps.len());
    for (index, step) in plan.steps.iter().enumerate() {
        let label = step.label(index);
        let outcome = match &root {
            Ok(root) => dispatch(
                ActionEnv {
                    root,
                    config: &ctx.config,
                },
                step,
            ),
            Err(err) => {
                results.push(StepResult::failed(label, err));
                continue;
            }
        };
        match outcome {
            Ok(output) => {
                debug!(step = %label, "step ok");
                results.push(StepResult::ok(label, output.stdout, output.stderr));
            }
            Err(err) => {
                warn!(step = %label, err = %err, "step failed");
                results.push(StepResult::failed(label, &err));
            }
        }
    }
    results
}

fn dispatch(env: ActionEnv<'_>, step: &Step) -> Result<ActionOutput, PlanError> {
    match step {
        Step::Mkdir { path } => actions::mkdir(env, path),
        Step::Write { path, content } => actions::write(env, path, content),
        Step::Append { path, content } => actions::append(env, path, content),
        Step::Edit {
            path,
            find,
            replace,
        } => actions::edit(env, path, find, replace),
        Step::Shell { cmd, cwd } => actions::shell(env, cmd, cwd.as_deref()),
        Step::Install { packages, dev, cwd } => {
            actions::install(env, packages, *dev, cwd.as_deref())
        }
        Step::Unknown { action } => Err(PlanError::UnknownAction {
            action: action.clone(),
        }),
    }
}

/// Informational listing; failures never affect step outcomes.
fn list_root(ctx: &ExecContext, plan: &Plan) -> Vec<String> {
    let Ok(root) = resolve(&ctx.workspace, &plan.root) else {
        return Vec::new();
    };
    if !root.exists() {
        return Vec::new();
    }
    match list_tree(&root, &ctx.config.listing.ignore) {
        Ok(listing) => listing,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "listing failed");
            Vec::new()
        }
    }
}
