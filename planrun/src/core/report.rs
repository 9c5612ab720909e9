//! Per-step results and the run report handed to presentation.

use serde::Serialize;

use super::errors::PlanError;

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
}

/// Labelled outcome, one per step, in step order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub label: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn ok(label: String, stdout: Option<String>, stderr: Option<String>) -> Self {
        Self {
            label,
            outcome: StepOutcome::Ok { stdout, stderr },
        }
    }

    pub fn failed(label: String, err: &PlanError) -> Self {
        let (stdout, stderr) = err.captured_output();
        Self {
            label,
            outcome: StepOutcome::Failed {
                error: err.to_string(),
                stdout: stdout.map(str::to_string),
                stderr: stderr.map(str::to_string),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, StepOutcome::Ok { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            StepOutcome::Failed { error, .. } => Some(error),
            StepOutcome::Ok { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub label: String,
    pub error: String,
}

/// `{ok, failed, failures}` counts for a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ok: usize,
    pub failed: usize,
    pub failures: Vec<FailureEntry>,
}

impl RunSummary {
    pub fn from_results(results: &[StepResult]) -> Self {
        let failures: Vec<FailureEntry> = results
            .iter()
            .filter_map(|result| {
                result.error().map(|error| FailureEntry {
                    label: result.label.clone(),
                    error: error.to_string(),
                })
            })
            .collect();
        Self {
            ok: results.len() - failures.len(),
            failed: failures.len(),
            failures,
        }
    }
}

/// Everything one plan execution produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub plan_hash: String,
    pub dry_run: bool,
    /// Files captured for revert before execution (0 when nothing was snapshotted).
    pub snapshot_files: usize,
    pub results: Vec<StepResult>,
    /// Sorted recursive listing of the plan root, directories suffixed with `/`.
    pub listing: Vec<String>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|result| !result.is_ok())
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let mut buf = String::new();
        if self.dry_run {
            buf.push_str("(dry run: nothing was written)\n");
        }
        for result in &self.results {
            match &result.outcome {
                StepOutcome::Ok { stdout, stderr } => {
                    buf.push_str(&format!("ok     {}\n", result.label));
                    push_output(&mut buf, stdout.as_deref(), stderr.as_deref());
                }
                StepOutcome::Failed {
                    error,
                    stdout,
                    stderr,
                } => {
                    buf.push_str(&format!("FAILED {}: {}\n", result.label, error));
                    push_output(&mut buf, stdout.as_deref(), stderr.as_deref());
                }
            }
        }
        let summary = self.summary();
        buf.push_str(&format!("\n{} ok, {} failed\n", summary.ok, summary.failed));
        if !self.listing.is_empty() {
            buf.push_str("\nfiles:\n");
            for entry in &self.listing {
                buf.push_str(&format!("  {entry}\n"));
            }
        }
        buf
    }
}

fn push_output(buf: &mut String, stdout: Option<&str>, stderr: Option<&str>) {
    for (name, text) in [("stdout", stdout), ("stderr", stderr)] {
        let Some(text) = text.map(str::trim_end).filter(|text| !text.is_empty()) else {
            continue;
        };
        buf.push_str(&format!("       [{name}]\n"));
        for line in text.lines() {
            buf.push_str(&format!("       {line}\n"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> Vec<StepResult> {
        vec![
            StepResult::ok("#1 mkdir".to_string(), None, None),
            StepResult::failed(
                "#2 edit".to_string(),
                &PlanError::MissingFile {
                    path: "a.txt".to_string(),
                },
            ),
            StepResult::ok("#3 shell".to_string(), Some("hi\n".to_string()), None),
        ]
    }

    #[test]
    fn summary_counts_and_lists_failures_in_order() {
        let summary = RunSummary::from_results(&sample_results());
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].label, "#2 edit");
        assert!(summary.failures[0].error.contains("a.txt"));
    }

    #[test]
    fn results_serialize_with_status_tag() {
        let value = serde_json::to_value(&sample_results()[1]).expect("serialize");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["label"], "#2 edit");
        assert!(value.get("stdout").is_none());
    }

    #[test]
    fn text_report_includes_output_and_listing() {
        let report = RunReport {
            plan_hash: "abc".to_string(),
            dry_run: false,
            snapshot_files: 1,
            results: sample_results(),
            listing: vec!["src/".to_string(), "src/main.rs".to_string()],
        };
        let text = report.render_text();
        assert!(text.contains("FAILED #2 edit"));
        assert!(text.contains("       hi"));
        assert!(text.contains("2 ok, 1 failed"));
        assert!(text.contains("  src/main.rs"));
        assert!(report.has_failures());
    }
}
