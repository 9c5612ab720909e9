//! Session-level harness tests for the plan → apply → repair → revert cycle.
//!
//! These drive `Session::handle` with a scripted generator to verify the
//! repair bound, the request sequence the generator sees, and that repair
//! plans get their own snapshots.

use planrun::execute::ExecContext;
use planrun::io::config::EngineConfig;
use planrun::io::generator::Profile;
use planrun::repair::RepairStop;
use planrun::session::Session;
use planrun::test_support::{
    ScriptedGenerator, TestWorkspace, append, edit, plan, plan_text, write,
};

fn auto_repair(max_repair_attempts: u32) -> EngineConfig {
    EngineConfig {
        auto_repair: true,
        max_repair_attempts,
        ..EngineConfig::default()
    }
}

/// A plan that always fails stops after exactly `max_repair_attempts` repair
/// generations: one planning request plus two repair requests.
#[test]
fn always_failing_plan_is_repaired_at_most_max_attempts_times() {
    let ws = TestWorkspace::new().expect("workspace");
    let failing = plan_text(&plan(vec![edit("missing.txt", "a", "b")]));
    let generator = ScriptedGenerator::new(vec![failing; 6]);
    let mut session = Session::new(ws.context(auto_repair(2)), generator);

    let handled = session.handle("edit the file").expect("handle");
    let repair = handled.repair.as_ref().expect("repair ran");

    assert_eq!(repair.stop, RepairStop::Exhausted);
    assert_eq!(repair.attempts.len(), 2);
    assert!(handled.has_failures());
}

/// Full cycle: the first plan half-fails, the repair plan fixes it, and
/// reverting the last plan only undoes the repair plan's own writes.
///
/// Execution sequence:
/// 1. Planning: write `a.txt`, edit missing `b.txt` (fails)
/// 2. Repair 1: write `b.txt`, append to `a.txt` (succeeds)
/// 3. Revert last: `b.txt` deleted, `a.txt` back to the planning result
#[test]
fn repair_then_revert_undoes_only_the_repair_plan() {
    let ws = TestWorkspace::new().expect("workspace");
    let first = plan_text(&plan(vec![
        write("a.txt", "one"),
        edit("b.txt", "/x/g", "y"),
    ]));
    let fix = plan_text(&plan(vec![write("b.txt", "y"), append("a.txt", " two")]));
    let mut session = Session::new(
        ws.context(auto_repair(3)),
        ScriptedGenerator::new([first, fix]),
    );

    let handled = session.handle("make a and b").expect("handle");
    let repair = handled.repair.as_ref().expect("repair ran");
    assert_eq!(repair.stop, RepairStop::Resolved);
    assert_eq!(repair.attempts.len(), 1);
    assert_eq!(ws.read("a.txt").expect("read"), "one two");

    let outcome = session.revert_last().expect("revert");
    assert_eq!(outcome.restored, 1);
    assert_eq!(outcome.deleted, 1);
    assert_eq!(ws.read("a.txt").expect("read"), "one");
    assert!(!ws.exists("b.txt"));
}

#[test]
fn repair_requests_use_repair_profile_and_latest_failures() {
    let ws = TestWorkspace::new().expect("workspace");
    let first = plan_text(&plan(vec![edit("a.txt", "x", "y")]));
    let second = plan_text(&plan(vec![edit("b.txt", "x", "y")]));
    let generator = ScriptedGenerator::new([first, second, "garbage".to_string()]);
    let mut session = Session::new(ws.context(auto_repair(5)), generator);

    let handled = session.handle("edit things").expect("handle");
    let repair = handled.repair.as_ref().expect("repair ran");
    assert!(matches!(repair.stop, RepairStop::GenerationFailed { .. }));
    assert_eq!(repair.attempts.len(), 1);
    assert!(handled.has_failures());

    let requests = session.generator().requests();
    let profiles: Vec<Profile> = requests.iter().map(|request| request.profile).collect();
    assert_eq!(
        profiles,
        vec![Profile::Planning, Profile::Repair, Profile::Repair]
    );
    assert!(requests[1].prompt.contains("missing file `a.txt`"));
    assert!(requests[2].prompt.contains("missing file `b.txt`"));
    assert!(!requests[2].prompt.contains("`a.txt`"));
}

#[test]
fn untrusted_dry_run_repairs_never_touch_the_workspace() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.seed("notes/b.txt", "keep").expect("seed");
    let first = plan_text(&plan(vec![edit("a.txt", "x", "y")]));
    let fix = plan_text(&plan(vec![write("a.txt", "y"), write("notes/b.txt", "lost")]));
    let generator = ScriptedGenerator::new([first, fix]);
    let config = EngineConfig {
        dry_run: true,
        ..auto_repair(2)
    };
    let mut session = Session::new(ExecContext::new(ws.path(), config, false), generator);

    let handled = session.handle("fix a").expect("handle");
    let repair = handled.repair.as_ref().expect("repair ran");
    assert_eq!(repair.stop, RepairStop::Resolved);
    assert!(!ws.exists("a.txt"));
    assert_eq!(ws.read("notes/b.txt").expect("read"), "keep");
    assert!(session.store().is_empty());
    assert_eq!(session.history().len(), 6);
}
