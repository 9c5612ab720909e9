//! Plan model: the closed step vocabulary and coercion from untrusted text.
//!
//! Generator output is treated as untrusted. Coercion is tolerant: it strips
//! code fences and surrounding prose, fills in defaults, and silently drops
//! steps whose `action` is not one of the six known kinds. Field-level checks
//! (missing `path`, empty `cmd`, ...) are left to the executor.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::errors::PlanError;

/// Goal used when the generator omits one.
pub const DEFAULT_GOAL: &str = "(untitled plan)";
/// Plan root used when the generator omits one.
pub const DEFAULT_ROOT: &str = ".";

/// Action names accepted by coercion, in documentation order.
pub const ACTIONS: [&str; 6] = ["mkdir", "write", "append", "edit", "shell", "install"];

/// `/body/flags` framing. Flags are restricted to regex flag letters so that
/// ordinary paths such as `/usr/bin` stay literal.
static PATTERN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A/(.+)/([gimsuyx]*)\z").expect("pattern framing regex"));

/// A goal, a root relative to the workspace, and ordered steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub goal: String,
    pub root: String,
    pub steps: Vec<Step>,
}

/// The `find` operand of an `edit` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Find {
    /// Replace every non-overlapping occurrence of the text.
    Literal(String),
    /// Regular expression with its trailing flag letters.
    Pattern { body: String, flags: String },
}

impl Find {
    /// Discriminate the raw `find` string once, at step construction.
    pub fn parse(raw: &str) -> Self {
        match PATTERN_RE.captures(raw) {
            Some(caps) => Find::Pattern {
                body: caps[1].to_string(),
                flags: caps[2].to_string(),
            },
            None => Find::Literal(raw.to_string()),
        }
    }

    /// Wire form (`text` or `/body/flags`).
    pub fn render(&self) -> String {
        match self {
            Find::Literal(text) => text.clone(),
            Find::Pattern { body, flags } => format!("/{body}/{flags}"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Find::Literal(text) => text.is_empty(),
            Find::Pattern { body, .. } => body.is_empty(),
        }
    }
}

/// One declarative operation. All paths are relative to the plan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Mkdir {
        path: String,
    },
    Write {
        path: String,
        content: String,
    },
    Append {
        path: String,
        content: String,
    },
    Edit {
        path: String,
        find: Find,
        replace: String,
    },
    Shell {
        cmd: String,
        cwd: Option<String>,
    },
    Install {
        packages: Vec<String>,
        dev: bool,
        cwd: Option<String>,
    },
    /// Never produced by [`parse_plan`]; only reachable when a plan is built
    /// directly. The executor rejects it.
    Unknown {
        action: String,
    },
}

impl Step {
    pub fn action(&self) -> &str {
        match self {
            Step::Mkdir { .. } => "mkdir",
            Step::Write { .. } => "write",
            Step::Append { .. } => "append",
            Step::Edit { .. } => "edit",
            Step::Shell { .. } => "shell",
            Step::Install { .. } => "install",
            Step::Unknown { action } => action,
        }
    }

    /// Stable display label, `#<1-based index> <action>`.
    pub fn label(&self, index: usize) -> String {
        format!("#{} {}", index + 1, self.action())
    }

    /// Path whose prior content must be captured before this step runs.
    ///
    /// Only `write`/`append`/`edit` are revertible.
    pub fn snapshot_path(&self) -> Option<&str> {
        match self {
            Step::Write { path, .. } | Step::Append { path, .. } | Step::Edit { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Step::Mkdir { path } => json!({ "action": "mkdir", "path": path }),
            Step::Write { path, content } => {
                json!({ "action": "write", "path": path, "content": content })
            }
            Step::Append { path, content } => {
                json!({ "action": "append", "path": path, "content": content })
            }
            Step::Edit {
                path,
                find,
                replace,
            } => json!({
                "action": "edit",
                "path": path,
                "find": find.render(),
                "replace": replace,
            }),
            Step::Shell { cmd, cwd } => {
                let mut value = json!({ "action": "shell", "cmd": cmd });
                if let Some(cwd) = cwd {
                    value["cwd"] = json!(cwd);
                }
                value
            }
            Step::Install { packages, dev, cwd } => {
                let mut value = json!({ "action": "install", "packages": packages, "dev": dev });
                if let Some(cwd) = cwd {
                    value["cwd"] = json!(cwd);
                }
                value
            }
            Step::Unknown { action } => json!({ "action": action }),
        }
    }

    fn from_value(value: &Value) -> Option<Step> {
        let obj = value.as_object()?;
        let action = obj.get("action")?.as_str()?;
        let text = |key: &str| coerce_string(obj.get(key)).unwrap_or_default();
        let cwd = coerce_string(obj.get("cwd")).filter(|cwd| !cwd.trim().is_empty());
        let step = match action {
            "mkdir" => Step::Mkdir { path: text("path") },
            "write" => Step::Write {
                path: text("path"),
                content: text("content"),
            },
            "append" => Step::Append {
                path: text("path"),
                content: text("content"),
            },
            "edit" => Step::Edit {
                path: text("path"),
                find: Find::parse(&text("find")),
                replace: text("replace"),
            },
            "shell" => Step::Shell {
                cmd: text("cmd"),
                cwd,
            },
            "install" => Step::Install {
                packages: coerce_packages(obj.get("packages")),
                dev: coerce_bool(obj.get("dev")),
                cwd,
            },
            _ => return None,
        };
        Some(step)
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Plan {
    pub fn to_value(&self) -> Value {
        json!({
            "goal": self.goal,
            "root": self.root,
            "steps": self.steps.iter().map(Step::to_value).collect::<Vec<_>>(),
        })
    }
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Coerce raw generator text into a [`Plan`].
///
/// Tries the whole (fence-stripped) text first, then the substring between
/// the first `{` and the last `}`.
pub fn parse_plan(raw: &str) -> Result<Plan, PlanError> {
    let text = strip_fences(raw);
    let obj = match parse_object(text) {
        Ok(obj) => obj,
        Err(first) => {
            let slice = brace_slice(text).ok_or_else(|| PlanError::Parse(first.clone()))?;
            parse_object(slice).map_err(PlanError::Parse)?
        }
    };
    Ok(normalize(&obj))
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(err) => Err(err.to_string()),
    }
}

fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (`json`, `jsonc`, ...) along with the fence.
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn normalize(obj: &Map<String, Value>) -> Plan {
    let goal = coerce_string(obj.get("goal"))
        .filter(|goal| !goal.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_GOAL.to_string());
    let root = coerce_string(obj.get("root"))
        .filter(|root| !root.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ROOT.to_string());
    let raw_steps = match obj.get("steps") {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    };
    let steps: Vec<Step> = raw_steps.iter().filter_map(Step::from_value).collect();
    if steps.len() != raw_steps.len() {
        debug!(
            dropped = raw_steps.len() - steps.len(),
            "dropped unrecognized steps"
        );
    }
    Plan { goal, root, steps }
}

fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_packages(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| coerce_string(Some(item)))
            .map(|pkg| pkg.trim().to_string())
            .filter(|pkg| !pkg.is_empty())
            .collect(),
        Some(Value::String(list)) => list.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn coerce_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
