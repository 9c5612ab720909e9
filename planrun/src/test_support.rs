//! Test-only helpers: a temporary workspace, a scripted plan generator and
//! plan builders.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::plan::{DEFAULT_GOAL, DEFAULT_ROOT, Find, Plan, Step};
use crate::execute::ExecContext;
use crate::io::config::EngineConfig;
use crate::io::generator::{GenerateRequest, PlanGenerator};
use crate::io::init::{EnginePaths, InitOptions, init_workspace, is_trusted};

/// Temporary workspace initialized with `.planrun/` and marked trusted.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp workspace")?;
        init_workspace(
            dir.path(),
            &InitOptions {
                force: false,
                trust: true,
            },
        )?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Execution context honoring the workspace's trust marker.
    pub fn context(&self, config: EngineConfig) -> ExecContext {
        let trusted = is_trusted(&EnginePaths::new(self.path()));
        ExecContext::new(self.path(), config, trusted)
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn seed(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path().join(rel).exists()
    }
}

/// Generator that replays canned responses in order and records every request.
///
/// Once the script runs out, `generate` fails like a broken backend would.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<GenerateRequest>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.borrow().clone()
    }
}

impl PlanGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator has no responses left"))
    }
}

/// Plan rooted at the workspace with the default goal.
pub fn plan(steps: Vec<Step>) -> Plan {
    Plan {
        goal: DEFAULT_GOAL.to_string(),
        root: DEFAULT_ROOT.to_string(),
        steps,
    }
}

pub fn write(path: &str, content: &str) -> Step {
    Step::Write {
        path: path.to_string(),
        content: content.to_string(),
    }
}

pub fn append(path: &str, content: &str) -> Step {
    Step::Append {
        path: path.to_string(),
        content: content.to_string(),
    }
}

/// `find` goes through the same `/body/flags` discrimination as parsed plans.
pub fn edit(path: &str, find: &str, replace: &str) -> Step {
    Step::Edit {
        path: path.to_string(),
        find: Find::parse(find),
        replace: replace.to_string(),
    }
}

/// Serialized plan text as a generator would return it.
pub fn plan_text(plan: &Plan) -> String {
    plan.to_value().to_string()
}
