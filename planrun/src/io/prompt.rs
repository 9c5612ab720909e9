//! Prompt rendering for the plan generator.
//!
//! Two instruction profiles exist: planning (full schema, general rules) and
//! repair (same schema, minimal targeted steps only). The request template
//! wraps a profile with the conversation history and the user/context text.

use anyhow::Result;
use minijinja::{Environment, context};
use tracing::debug;

use crate::io::generator::{GenerateRequest, Profile};

const PLANNING_PROFILE: &str = include_str!("prompts/planning.md");
const REPAIR_PROFILE: &str = include_str!("prompts/repair.md");
const REQUEST_TEMPLATE: &str = include_str!("prompts/request.md");
const REPAIR_CONTEXT_TEMPLATE: &str = include_str!("prompts/repair_context.md");

/// Inputs for the repair context brief.
#[derive(Debug, Clone)]
pub struct RepairContext<'a> {
    pub goal: &'a str,
    pub root: &'a str,
    pub workspace: &'a str,
    /// `- <label>: <error>` lines.
    pub failures: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("request", REQUEST_TEMPLATE)
            .expect("request template should be valid");
        env.add_template("repair_context", REPAIR_CONTEXT_TEMPLATE)
            .expect("repair context template should be valid");
        Self { env }
    }

    /// Full prompt text for a generator request.
    pub fn render_request(&self, request: &GenerateRequest) -> Result<String> {
        let template = self.env.get_template("request")?;
        let rendered = template.render(context! {
            instructions => profile_text(request.profile).trim(),
            history => &request.history,
            prompt => request.prompt.trim(),
        })?;
        debug!(
            profile = ?request.profile,
            bytes = rendered.len(),
            "rendered generator prompt"
        );
        Ok(rendered)
    }

    /// User text for a repair request: prior goal/root, workspace, failures.
    pub fn render_repair_context(&self, repair: &RepairContext<'_>) -> Result<String> {
        let template = self.env.get_template("repair_context")?;
        let rendered = template.render(context! {
            goal => repair.goal,
            root => repair.root,
            workspace => repair.workspace,
            failures => repair.failures.trim_end(),
        })?;
        Ok(rendered)
    }
}

pub fn profile_text(profile: Profile) -> &'static str {
    match profile {
        Profile::Planning => PLANNING_PROFILE,
        Profile::Repair => REPAIR_PROFILE,
    }
}
