//! Sandboxed plan runner.
//!
//! Turns a natural-language request into a plan (via an external generator
//! command), executes it inside the current directory under explicit safety
//! gates, and can repair failed runs automatically.

use std::fs;
use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use planrun::core::plan::{Plan, parse_plan};
use planrun::core::report::{RunReport, RunSummary};
use planrun::execute::{ExecContext, run_plan};
use planrun::exit_codes;
use planrun::io::config::{EngineConfig, load_config};
use planrun::io::generator::{CommandGenerator, GenerateRequest, Profile, generate_plan};
use planrun::io::init::{EnginePaths, InitOptions, init_workspace, is_trusted};
use planrun::io::snapshot::RevertStore;
use planrun::logging;
use planrun::repair::RepairStop;
use planrun::session::{Handled, Session};

#[derive(Parser)]
#[command(
    name = "planrun",
    version,
    about = "Generate and apply sandboxed file-system plans"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.planrun/config.toml` with defaults.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        /// Mark this workspace trusted for live runs.
        #[arg(long)]
        trust: bool,
    },
    /// Generate a plan and print it as JSON without executing it.
    Plan {
        #[arg(required = true)]
        request: Vec<String>,
    },
    /// Execute plan text from a file (or `-` for stdin).
    Apply {
        file: String,
        #[command(flatten)]
        gates: GateArgs,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Generate a plan for the request, execute it, and repair if enabled.
    Run {
        #[arg(required = true)]
        request: Vec<String>,
        #[command(flatten)]
        gates: GateArgs,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Read requests line by line (`:revert`, `:history`, `:quit`).
    Session {
        #[command(flatten)]
        gates: GateArgs,
    },
}

/// Per-invocation overrides; each flag can only enable its setting.
#[derive(Args, Debug, Clone, Copy, Default)]
struct GateArgs {
    /// Validate and report without writing anything.
    #[arg(long)]
    dry_run: bool,
    /// Permit `shell` steps.
    #[arg(long)]
    allow_shell: bool,
    /// Permit `install` steps (implies `--allow-shell`).
    #[arg(long)]
    allow_install: bool,
    /// Re-plan after failed steps.
    #[arg(long)]
    auto_repair: bool,
    /// Treat the workspace as trusted for this invocation.
    #[arg(long)]
    trust: bool,
}

impl GateArgs {
    fn apply(&self, config: &mut EngineConfig) {
        config.dry_run |= self.dry_run;
        config.allow_shell |= self.allow_shell || self.allow_install;
        config.allow_install |= self.allow_install;
        config.auto_repair |= self.auto_repair;
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    plan: &'a Plan,
    summary: RunSummary,
    report: &'a RunReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    repairs: Vec<JsonReport<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repair_stop: Option<String>,
}

impl<'a> JsonReport<'a> {
    fn new(plan: &'a Plan, report: &'a RunReport) -> Self {
        Self {
            plan,
            summary: report.summary(),
            report,
            repairs: Vec::new(),
            repair_stop: None,
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force, trust } => cmd_init(force, trust),
        Command::Plan { request } => cmd_plan(&request.join(" ")),
        Command::Apply { file, gates, json } => cmd_apply(&file, gates, json),
        Command::Run {
            request,
            gates,
            json,
        } => cmd_run(&request.join(" "), gates, json),
        Command::Session { gates } => cmd_session(gates),
    }
}

fn workspace() -> Result<PathBuf> {
    std::env::current_dir().context("resolve current directory")
}

fn load_context(gates: GateArgs) -> Result<ExecContext> {
    let workspace = workspace()?;
    let paths = EnginePaths::new(&workspace);
    let mut config = load_config(&paths.config_path)?;
    gates.apply(&mut config);
    let trusted = gates.trust || is_trusted(&paths);
    Ok(ExecContext::new(workspace, config, trusted))
}

fn command_generator(ctx: &ExecContext) -> CommandGenerator {
    CommandGenerator::new(
        &ctx.config.generator,
        ctx.workspace.clone(),
        ctx.config.output_limit_bytes,
    )
}

fn cmd_init(force: bool, trust: bool) -> Result<i32> {
    let paths = init_workspace(&workspace()?, &InitOptions { force, trust })?;
    println!("initialized {}", paths.state_dir.display());
    if is_trusted(&paths) {
        println!("workspace is trusted");
    }
    Ok(exit_codes::OK)
}

fn cmd_plan(request: &str) -> Result<i32> {
    let ctx = load_context(GateArgs::default())?;
    let generator = command_generator(&ctx);
    let generated = generate_plan(
        &generator,
        &GenerateRequest {
            profile: Profile::Planning,
            history: Vec::new(),
            prompt: request.to_string(),
        },
    )?;
    println!(
        "{}",
        serde_json::to_string_pretty(&generated.plan).context("serialize plan")?
    );
    Ok(exit_codes::OK)
}

fn cmd_apply(file: &str, gates: GateArgs, json: bool) -> Result<i32> {
    let ctx = load_context(gates)?;
    let raw = read_plan_text(file)?;
    let plan = parse_plan(&raw)?;
    let mut store = RevertStore::new();
    let report = run_plan(&ctx, &mut store, &plan)?;

    if json {
        print_json(&JsonReport::new(&plan, &report))?;
    } else {
        println!("goal: {}", plan.goal);
        print!("{}", report.render_text());
    }
    Ok(run_exit_code(report.has_failures()))
}

fn cmd_run(request: &str, gates: GateArgs, json: bool) -> Result<i32> {
    let ctx = load_context(gates)?;
    let generator = command_generator(&ctx);
    let mut session = Session::new(ctx, generator);
    let handled = session.handle(request)?;

    if json {
        let mut out = JsonReport::new(&handled.plan, &handled.report);
        if let Some(repair) = &handled.repair {
            out.repairs = repair
                .attempts
                .iter()
                .map(|attempt| JsonReport::new(&attempt.plan, &attempt.report))
                .collect();
            out.repair_stop = Some(describe_stop(&repair.stop));
        }
        print_json(&out)?;
    } else {
        print_handled(&handled);
    }
    Ok(run_exit_code(handled.has_failures()))
}

fn cmd_session(gates: GateArgs) -> Result<i32> {
    let ctx = load_context(gates)?;
    let generator = command_generator(&ctx);
    let mut session = Session::new(ctx, generator);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        write!(stdout, "planrun> ").context("write prompt")?;
        stdout.flush().context("flush prompt")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("read request")? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":history" => {
                for turn in session.history().turns() {
                    println!("[{}] {}", turn.role.as_str(), turn.text);
                }
            }
            ":revert" => match session.revert_last() {
                Ok(outcome) => println!("{}", outcome.message()),
                Err(err) => eprintln!("{err:#}"),
            },
            request => match session.handle(request) {
                Ok(handled) => print_handled(&handled),
                Err(err) => eprintln!("{err:#}"),
            },
        }
    }
    Ok(exit_codes::OK)
}

fn read_plan_text(file: &str) -> Result<String> {
    if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read plan from stdin")?;
        return Ok(buf);
    }
    let path = Path::new(file);
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn print_handled(handled: &Handled) {
    println!("goal: {}", handled.plan.goal);
    print!("{}", handled.report.render_text());
    if let Some(repair) = &handled.repair {
        for attempt in &repair.attempts {
            println!("\nrepair attempt {}: {}", attempt.attempt, attempt.plan.goal);
            print!("{}", attempt.report.render_text());
        }
        println!("\n{}", describe_stop(&repair.stop));
    }
}

fn describe_stop(stop: &RepairStop) -> String {
    match stop {
        RepairStop::Resolved => "repair: resolved".to_string(),
        RepairStop::Exhausted => "repair: attempts exhausted".to_string(),
        RepairStop::GenerationFailed { error } => format!("repair: generation failed: {error}"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize report")?;
    println!("{text}");
    Ok(())
}

fn run_exit_code(has_failures: bool) -> i32 {
    if has_failures {
        exit_codes::FAILED
    } else {
        exit_codes::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_apply_with_gates() {
        let cli = Cli::try_parse_from(["planrun", "apply", "-", "--dry-run", "--allow-install"])
            .expect("parse");
        let Command::Apply { file, gates, json } = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(file, "-");
        assert!(gates.dry_run);
        assert!(gates.allow_install);
        assert!(!json);
    }

    #[test]
    fn parse_run_joins_request_words() {
        let cli = Cli::try_parse_from(["planrun", "run", "add", "a", "readme", "--json"])
            .expect("parse");
        let Command::Run { request, json, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(request.join(" "), "add a readme");
        assert!(json);
    }

    #[test]
    fn run_requires_a_request() {
        assert!(Cli::try_parse_from(["planrun", "run"]).is_err());
    }

    #[test]
    fn gates_only_enable_settings() {
        let mut config = EngineConfig {
            allow_shell: true,
            ..EngineConfig::default()
        };
        GateArgs {
            allow_install: true,
            ..GateArgs::default()
        }
        .apply(&mut config);
        assert!(config.allow_shell);
        assert!(config.allow_install);
        assert!(!config.dry_run);
    }
}
