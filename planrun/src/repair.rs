//! Bounded repair loop: regenerate and re-execute until failures clear.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::plan::Plan;
use crate::core::report::{RunReport, StepResult};
use crate::execute::{ExecContext, run_plan};
use crate::io::generator::{GenerateRequest, PlanGenerator, Profile, generate_plan};
use crate::io::history::{History, Role};
use crate::io::prompt::{PromptEngine, RepairContext};
use crate::io::snapshot::RevertStore;

/// Reason why `run_repair_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairStop {
    /// The latest run had no failed steps.
    Resolved,
    /// `max_attempts` repair plans ran and failures remain.
    Exhausted,
    /// The generator (or coercion of its output) failed; not retried.
    GenerationFailed { error: String },
}

/// One repair generation and its execution.
#[derive(Debug, Clone)]
pub struct RepairAttempt {
    pub attempt: u32,
    pub plan: Plan,
    pub report: RunReport,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub attempts: Vec<RepairAttempt>,
    pub stop: RepairStop,
}

impl RepairOutcome {
    /// Report of the last executed repair plan, if any ran.
    pub fn last_report(&self) -> Option<&RunReport> {
        self.attempts.last().map(|attempt| &attempt.report)
    }
}

/// `- <label>: <error>` per failed result, or `None` when nothing failed.
pub fn failure_brief(results: &[StepResult]) -> Option<String> {
    let lines: Vec<String> = results
        .iter()
        .filter_map(|result| {
            result
                .error()
                .map(|error| format!("- {}: {}", result.label, error))
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// One-line human summary recorded as a model turn after each run.
pub fn summary_line(report: &RunReport) -> String {
    let summary = report.summary();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    format!(
        "Executed plan {}{mode}: {} ok, {} failed.",
        short_hash(&report.plan_hash),
        summary.ok,
        summary.failed
    )
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Repair `plan` until its failures clear, `max_attempts` is reached, or the
/// generator errors.
///
/// Each attempt asks for a repair-profile plan built from the latest failure
/// brief and executes it with a fresh snapshot. Whole-run errors (trust) from
/// executing a repair plan are returned as `Err`.
#[instrument(skip_all, fields(max_attempts = max_attempts))]
pub fn run_repair_loop<G: PlanGenerator>(
    generator: &G,
    history: &mut History,
    store: &mut RevertStore,
    ctx: &ExecContext,
    plan: &Plan,
    report: &RunReport,
    max_attempts: u32,
) -> Result<RepairOutcome> {
    let prompts = PromptEngine::new();
    let workspace = ctx.workspace.display().to_string();
    let mut attempts = Vec::new();
    let mut brief = failure_brief(&report.results);
    let mut prior = plan.clone();

    while let Some(failures) = brief.take() {
        let attempt = attempts.len() as u32 + 1;
        if attempt > max_attempts {
            info!(attempts = max_attempts, "repair attempts exhausted");
            return Ok(RepairOutcome {
                attempts,
                stop: RepairStop::Exhausted,
            });
        }

        let prompt = prompts.render_repair_context(&RepairContext {
            goal: &prior.goal,
            root: &prior.root,
            workspace: &workspace,
            failures: &failures,
        })?;
        let request = GenerateRequest {
            profile: Profile::Repair,
            history: history.turns(),
            prompt: prompt.clone(),
        };
        history.push(Role::User, prompt);

        let generated = match generate_plan(generator, &request) {
            Ok(generated) => generated,
            Err(err) => {
                let error = format!("{err:#}");
                warn!(attempt, err = %error, "repair generation failed");
                return Ok(RepairOutcome {
                    attempts,
                    stop: RepairStop::GenerationFailed { error },
                });
            }
        };
        history.push(Role::Model, generated.raw.clone());

        let report = run_plan(ctx, store, &generated.plan)?;
        history.push(Role::Model, summary_line(&report));
        info!(
            attempt,
            failed = report.summary().failed,
            "repair attempt executed"
        );

        brief = failure_brief(&report.results);
        prior = generated.plan.clone();
        attempts.push(RepairAttempt {
            attempt,
            plan: generated.plan,
            report,
        });
    }

    Ok(RepairOutcome {
        attempts,
        stop: RepairStop::Resolved,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::errors::PlanError;
    use crate::core::plan::parse_plan;
    use crate::io::config::EngineConfig;
    use crate::test_support::ScriptedGenerator;

    fn failing_report(ctx: &ExecContext, store: &mut RevertStore) -> (Plan, RunReport) {
        let plan = parse_plan(
            r#"{"goal":"fix a","steps":[{"action":"edit","path":"a.txt","find":"x","replace":"y"}]}"#,
        )
        .expect("plan");
        let report = run_plan(ctx, store, &plan).expect("run");
        assert!(report.has_failures());
        (plan, report)
    }

    #[test]
    fn failure_brief_lists_failed_results_in_order() {
        let results = vec![
            StepResult::ok("#1 mkdir".to_string(), None, None),
            StepResult::failed("#2 edit".to_string(), &PlanError::MissingFile {
                path: "a.js".to_string(),
            }),
            StepResult::failed("#3 shell".to_string(), &PlanError::PermissionGate {
                action: "shell",
                gate: "allow_shell",
            }),
        ];
        let brief = failure_brief(&results).expect("brief");
        let lines: Vec<&str> = brief.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("- #2 edit: "));
        assert!(lines[1].starts_with("- #3 shell: "));
        assert!(failure_brief(&results[..1]).is_none());
    }

    #[test]
    fn repair_resolves_on_first_successful_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ExecContext::new(temp.path(), EngineConfig::default(), true);
        let mut store = RevertStore::new();
        let (plan, report) = failing_report(&ctx, &mut store);
        let generator = ScriptedGenerator::new([
            r#"{"goal":"fix a","steps":[{"action":"write","path":"a.txt","content":"y"}]}"#,
        ]);
        let mut history = History::new();

        let outcome = run_repair_loop(&generator, &mut history, &mut store, &ctx, &plan, &report, 3)
            .expect("repair");

        assert_eq!(outcome.stop, RepairStop::Resolved);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "y");
        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].profile, Profile::Repair);
        assert!(requests[0].prompt.contains("Previous goal: fix a"));
        assert!(requests[0].prompt.contains("- #1 edit: "));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn repair_stops_after_max_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ExecContext::new(temp.path(), EngineConfig::default(), true);
        let mut store = RevertStore::new();
        let (plan, report) = failing_report(&ctx, &mut store);
        let still_failing =
            r#"{"steps":[{"action":"edit","path":"a.txt","find":"x","replace":"y"}]}"#;
        let generator = ScriptedGenerator::new([still_failing; 5]);
        let mut history = History::new();

        let outcome = run_repair_loop(&generator, &mut history, &mut store, &ctx, &plan, &report, 2)
            .expect("repair");

        assert_eq!(outcome.stop, RepairStop::Exhausted);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(generator.requests().len(), 2);
    }

    #[test]
    fn zero_attempts_never_calls_the_generator() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ExecContext::new(temp.path(), EngineConfig::default(), true);
        let mut store = RevertStore::new();
        let (plan, report) = failing_report(&ctx, &mut store);
        let generator = ScriptedGenerator::new(Vec::<&str>::new());
        let mut history = History::new();

        let outcome = run_repair_loop(&generator, &mut history, &mut store, &ctx, &plan, &report, 0)
            .expect("repair");

        assert_eq!(outcome.stop, RepairStop::Exhausted);
        assert!(generator.requests().is_empty());
    }

    #[test]
    fn generator_errors_end_the_loop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ExecContext::new(temp.path(), EngineConfig::default(), true);
        let mut store = RevertStore::new();
        let (plan, report) = failing_report(&ctx, &mut store);
        let generator = ScriptedGenerator::new(["no json here"]);
        let mut history = History::new();

        let outcome = run_repair_loop(&generator, &mut history, &mut store, &ctx, &plan, &report, 3)
            .expect("repair");

        match outcome.stop {
            RepairStop::GenerationFailed { error } => assert!(error.contains("parse")),
            other => panic!("unexpected stop: {other:?}"),
        }
        assert!(outcome.attempts.is_empty());
        assert_eq!(generator.requests().len(), 1);
    }

    #[test]
    fn clean_report_needs_no_repair() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ExecContext::new(temp.path(), EngineConfig::default(), true);
        let mut store = RevertStore::new();
        let plan = parse_plan(r#"{"steps":[{"action":"mkdir","path":"d"}]}"#).expect("plan");
        let report = run_plan(&ctx, &mut store, &plan).expect("run");
        let generator = ScriptedGenerator::new(Vec::<&str>::new());
        let mut history = History::new();

        let outcome = run_repair_loop(&generator, &mut history, &mut store, &ctx, &plan, &report, 2)
            .expect("repair");
        assert_eq!(outcome.stop, RepairStop::Resolved);
        assert!(outcome.last_report().is_none());
    }
}
