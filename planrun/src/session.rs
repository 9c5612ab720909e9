//! Interactive session: generate, apply, repair, and revert within one process.
//!
//! A [`Session`] owns the execution context, the generator, the bounded
//! conversation history and the in-memory revert store. Nothing here is
//! persisted; reverting is only possible for plans applied by the same
//! session.

use anyhow::{Result, anyhow};
use tracing::{info, instrument};

use crate::core::errors::PlanError;
use crate::core::plan::Plan;
use crate::core::report::RunReport;
use crate::execute::{ExecContext, run_plan};
use crate::io::generator::{GenerateRequest, Generated, PlanGenerator, Profile, generate_plan};
use crate::io::history::{History, Role};
use crate::io::snapshot::{RevertOutcome, RevertStore, revert};
use crate::repair::{RepairOutcome, run_repair_loop, summary_line};

/// Result of [`Session::handle`].
#[derive(Debug, Clone)]
pub struct Handled {
    pub plan: Plan,
    pub report: RunReport,
    /// Present when auto-repair ran.
    pub repair: Option<RepairOutcome>,
}

impl Handled {
    /// Whether failures remain after the initial run and any repairs.
    pub fn has_failures(&self) -> bool {
        match self.repair.as_ref().and_then(RepairOutcome::last_report) {
            Some(report) => report.has_failures(),
            None => self.report.has_failures(),
        }
    }
}

pub struct Session<G> {
    ctx: ExecContext,
    generator: G,
    history: History,
    store: RevertStore,
    last_plan: Option<Plan>,
}

impl<G: PlanGenerator> Session<G> {
    pub fn new(ctx: ExecContext, generator: G) -> Self {
        Self {
            ctx,
            generator,
            history: History::new(),
            store: RevertStore::new(),
            last_plan: None,
        }
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn store(&self) -> &RevertStore {
        &self.store
    }

    /// Most recently applied plan (including repair plans).
    pub fn last_plan(&self) -> Option<&Plan> {
        self.last_plan.as_ref()
    }

    /// Generate a plan for `request` with the planning profile.
    #[instrument(skip_all)]
    pub fn plan(&mut self, request: &str) -> Result<Generated> {
        let generate = GenerateRequest {
            profile: Profile::Planning,
            history: self.history.turns(),
            prompt: request.to_string(),
        };
        self.history.push(Role::User, request);
        let generated = generate_plan(&self.generator, &generate)?;
        self.history.push(Role::Model, generated.raw.clone());
        Ok(generated)
    }

    /// Snapshot and execute `plan`.
    pub fn apply(&mut self, plan: &Plan) -> Result<RunReport> {
        let report = run_plan(&self.ctx, &mut self.store, plan)?;
        self.history.push(Role::Model, summary_line(&report));
        self.last_plan = Some(plan.clone());
        Ok(report)
    }

    /// Plan and apply `request`, then repair when enabled and needed.
    #[instrument(skip_all, fields(auto_repair = self.ctx.config.auto_repair))]
    pub fn handle(&mut self, request: &str) -> Result<Handled> {
        let generated = self.plan(request)?;
        let report = self.apply(&generated.plan)?;

        let repair = if self.ctx.config.auto_repair && report.has_failures() {
            let outcome = run_repair_loop(
                &self.generator,
                &mut self.history,
                &mut self.store,
                &self.ctx,
                &generated.plan,
                &report,
                self.ctx.config.max_repair_attempts,
            )?;
            if let Some(last) = outcome.attempts.last() {
                self.last_plan = Some(last.plan.clone());
            }
            info!(attempts = outcome.attempts.len(), stop = ?outcome.stop, "repair finished");
            Some(outcome)
        } else {
            None
        };

        Ok(Handled {
            plan: generated.plan,
            report,
            repair,
        })
    }

    /// Restore the files captured before `plan` ran.
    ///
    /// Revert writes to the workspace, so it needs trust whenever live runs
    /// do. Dry-run mode does not apply.
    pub fn revert(&mut self, plan: &Plan) -> Result<RevertOutcome> {
        if self.ctx.config.require_trusted_workspace && !self.ctx.trusted {
            return Err(PlanError::TrustRequired.into());
        }
        let outcome = revert(&self.store, plan)?;
        self.history.push(Role::Model, outcome.message());
        Ok(outcome)
    }

    pub fn revert_last(&mut self) -> Result<RevertOutcome> {
        let plan = self
            .last_plan
            .clone()
            .ok_or_else(|| anyhow!("no plan has been applied in this session"))?;
        self.revert(&plan)
    }
}
