//! Error taxonomy for plan coercion and execution.
//!
//! Whole-run errors (`Parse`, `TrustRequired`) abort before any step executes
//! and reach the caller wrapped in `anyhow::Error`. Every other variant is
//! scoped to a single step: the executor renders it into a failed result and
//! moves on to the next step.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("could not parse plan: {0}")]
    Parse(String),

    #[error("path `{path}` escapes sandbox root {}", root.display())]
    PathEscape { path: String, root: PathBuf },

    #[error("workspace is not trusted (run `planrun init --trust` or pass `--trust`)")]
    TrustRequired,

    #[error("`{action}` is disabled (enable `{gate}`)")]
    PermissionGate {
        action: &'static str,
        gate: &'static str,
    },

    #[error("cannot edit missing file `{path}`")]
    MissingFile { path: String },

    #[error("unknown action `{action}`")]
    UnknownAction { action: String },

    #[error("`{action}` step is missing `{field}`")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("invalid pattern `/{body}/{flags}`: {reason}")]
    InvalidPattern {
        body: String,
        flags: String,
        reason: String,
    },

    #[error("{message}")]
    Subprocess {
        message: String,
        stdout: Option<String>,
        stderr: Option<String>,
    },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PlanError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlanError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Output captured before a subprocess failure, if any.
    pub fn captured_output(&self) -> (Option<&str>, Option<&str>) {
        match self {
            PlanError::Subprocess { stdout, stderr, .. } => (stdout.as_deref(), stderr.as_deref()),
            _ => (None, None),
        }
    }
}
