//! Black-box tests for the `daybook` binary.

use predicates::prelude::*;
use rstest::rstest;

mod helpers;
use helpers::{assertions, CliTestHarness};

#[test]
fn test_cli_help_and_version() {
    let harness = CliTestHarness::new();

    harness
        .run_success(&["--help"])
        .stdout(predicate::str::contains("task"))
        .stdout(predicate::str::contains("timer"))
        .stdout(predicate::str::contains("habit"));

    harness
        .run_success(&["--version"])
        .stdout(predicate::str::contains("daybook"));

    harness
        .run_failure(&["invalid-command"])
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_task_lifecycle() {
    let harness = CliTestHarness::new();

    let id = harness.add(&[
        "task", "add", "Write report", "--due", "2030-01-15", "--priority", "high", "--label", "work",
    ]);

    let listing = harness.stdout(&["task", "list"]);
    assert!(listing.contains("Write report"));
    assert!(listing.contains("2030-01-15"));
    assert!(listing.contains("high"));

    harness
        .run_success(&["task", "edit", &id, "--text", "Write final report", "--due-clear"])
        .stdout(predicate::str::contains("Write final report"));

    harness
        .run_success(&["task", "done", &id])
        .stdout(predicate::str::contains("Completed task"));

    // Completed tasks are hidden unless asked for
    assert!(!harness.stdout(&["task", "list"]).contains("Write final report"));
    assert!(harness.stdout(&["task", "list", "--all"]).contains("Write final report"));

    harness
        .run_success(&["task", "delete", &id, "--force"])
        .stdout(predicate::str::contains("Deleted task"));
    harness
        .run_success(&["task", "list", "--all"])
        .stdout(predicate::str::contains("No tasks found"));
}

#[rstest]
#[case(&["task", "add", "   "])]
#[case(&["task", "add", "Bad priority", "--priority", "urgent"])]
#[case(&["task", "add", "Bad date", "--due", "not a date at all"])]
#[case(&["task", "done", "x"])]
#[case(&["task", "done", "ffffffff"])]
fn test_task_input_errors(#[case] args: &[&str]) {
    let harness = CliTestHarness::new();
    harness.run_failure(args);
}

#[test]
fn test_blank_task_reports_invalid_input() {
    let harness = CliTestHarness::new();
    harness
        .run_failure(&["task", "add", "   "])
        .stderr(assertions::has_error())
        .stderr(predicate::str::contains("cannot be empty"));
}

#[test]
fn test_dependencies_reject_cycles() {
    let harness = CliTestHarness::new();
    let a = harness.add(&["task", "add", "Design"]);
    let b = harness.add(&["task", "add", "Build"]);

    harness
        .run_success(&["task", "depend", &b, &a])
        .stdout(predicate::str::contains("now waits on"));

    harness
        .run_failure(&["task", "depend", &a, &b])
        .stderr(predicate::str::contains("Circular dependency"));

    harness
        .run_success(&["task", "undepend", &b, &a])
        .stdout(predicate::str::contains("no longer waits on"));
    harness.run_success(&["task", "depend", &a, &b]);
}

#[test]
fn test_subtasks() {
    let harness = CliTestHarness::new();
    let id = harness.add(&["task", "add", "Move house", "--subtask", "Pack", "--subtask", "Clean"]);

    harness
        .run_success(&["task", "subtask", "toggle", &id, "2"])
        .stdout(predicate::str::contains("1/2 subtasks done"));
    harness
        .run_success(&["task", "subtask", "add", &id, "Hand over keys"])
        .stdout(predicate::str::contains("3 subtasks"));
    harness
        .run_failure(&["task", "subtask", "toggle", &id, "9"])
        .stderr(predicate::str::contains("no subtask #9"));
}

#[test]
fn test_delete_without_force_is_cancelled_when_not_interactive() {
    let harness = CliTestHarness::new();
    let id = harness.add(&["task", "add", "Keep me"]);

    harness
        .run_success(&["task", "delete", &id])
        .stdout(assertions::cancelled());
    assert!(harness.stdout(&["task", "list"]).contains("Keep me"));
}

#[test]
fn test_notebooks_and_notes() {
    let harness = CliTestHarness::new();
    let work = harness.add(&["notebook", "add", "Work"]);

    harness
        .run_failure(&["notebook", "add", "work"])
        .stderr(predicate::str::contains("Already exists"));

    let note = harness.add(&[
        "note", "add", "Standup", "--content", "Talk about the release", "--notebook", &work,
    ]);
    harness.add(&["note", "add", "Groceries"]);

    let in_work = harness.stdout(&["note", "list", "--notebook", &work]);
    assert!(in_work.contains("Standup"));
    assert!(!in_work.contains("Groceries"));

    let unfiled = harness.stdout(&["note", "list", "--unfiled"]);
    assert!(unfiled.contains("Groceries"));
    assert!(!unfiled.contains("Standup"));

    harness
        .run_success(&["note", "show", &note])
        .stdout(predicate::str::contains("Talk about the release"));
    harness
        .run_success(&["note", "pin", &note])
        .stdout(predicate::str::contains("Pinned"));

    let books = harness.stdout(&["notebook", "list"]);
    assert!(books.contains("Work"));

    harness
        .run_success(&["notebook", "delete", &work, "--force"])
        .stdout(predicate::str::contains("(1 notes)"));
    harness.run_failure(&["note", "show", &note]);
    assert!(harness.stdout(&["note", "list"]).contains("Groceries"));
}

#[test]
fn test_habits() {
    let harness = CliTestHarness::new();
    let id = harness.add(&["habit", "add", "Drink water", "--target", "3"]);

    harness
        .run_success(&["habit", "log", &id, "--count", "3"])
        .stdout(predicate::str::contains("Drink water: 3"));

    let listing = harness.stdout(&["habit", "list"]);
    assert!(listing.contains("3/3"));
    assert!(listing.contains("1 days"));

    harness
        .run_success(&["habit", "log", &id, "--count", "0"])
        .stdout(predicate::str::contains("cleared"));
    harness
        .run_success(&["habit", "delete", &id, "--force"])
        .stdout(predicate::str::contains("Deleted habit"));
}

#[test]
fn test_events() {
    let harness = CliTestHarness::new();
    let id = harness.add(&[
        "event", "add", "Dentist", "--start", "2030-03-04 10:00", "--duration", "45m",
    ]);

    harness
        .run_success(&["event", "list", "--from", "2030-03-04", "--days", "1"])
        .stdout(predicate::str::contains("Dentist"));
    harness
        .run_success(&["event", "list", "--from", "2030-03-06"])
        .stdout(predicate::str::contains("No events found"));

    harness
        .run_failure(&[
            "event", "add", "Backwards", "--start", "2030-03-04 10:00", "--end", "2030-03-04 09:00",
        ])
        .stderr(assertions::has_error());

    harness.run_success(&["event", "delete", &id, "--force"]);
}

#[test]
fn test_reminders_fire_once() {
    let harness = CliTestHarness::new();
    let start = (chrono::Utc::now() + chrono::Duration::minutes(10)).to_rfc3339();
    harness.add(&["event", "add", "Call with Sam", "--start", &start]);

    harness
        .run_success(&["event", "reminders", "--lead", "15"])
        .stdout(predicate::str::contains("Call with Sam"));
    harness
        .run_success(&["event", "reminders", "--lead", "15"])
        .stdout(predicate::str::contains("No upcoming reminders"));
}

#[test]
fn test_timer_and_time_log() {
    let harness = CliTestHarness::new();
    let activity = harness.add(&["activity", "add", "Reading"]);

    harness
        .run_success(&["timer", "start", &activity])
        .stdout(predicate::str::contains("Tracking"));
    assert!(harness.stdout(&["timer", "list"]).contains("running"));

    harness.run_success(&["timer", "pause", &activity]);
    assert!(harness.stdout(&["timer", "list"]).contains("paused"));
    harness
        .run_failure(&["timer", "pause", &activity])
        .stderr(predicate::str::contains("Invalid input"));

    harness.run_success(&["timer", "resume", &activity]);
    harness
        .run_success(&["timer", "stop", &activity, "--notes", "chapter 3"])
        .stdout(predicate::str::contains("Logged"));
    harness
        .run_success(&["timer", "list"])
        .stdout(predicate::str::contains("No active timers"));

    harness.run_success(&[
        "log", "add", &activity, "--start", "2030-01-01 09:00", "--duration", "1h30m",
    ]);
    let log = harness.stdout(&["log", "list", "--activity", &activity]);
    assert!(log.contains("1h 30m"));
    assert!(log.contains("manual"));
    assert!(log.contains("timer"));

    // Activities with logged time cannot be removed
    harness
        .run_failure(&["activity", "delete", &activity, "--force"])
        .stderr(assertions::has_error());
}

#[rstest]
#[case("999999999999999h", "Failed to parse duration")]
#[case("2562047788015h", "out of range")]
fn test_oversized_durations_are_reported(#[case] length: &str, #[case] message: &str) {
    let harness = CliTestHarness::new();
    let activity = harness.add(&["activity", "add", "Sleep"]);

    harness
        .run_failure(&["log", "add", &activity, "--start", "2030-01-01 09:00", "--duration", length])
        .code(1)
        .stderr(assertions::has_error())
        .stderr(predicate::str::contains(message));
    harness
        .run_success(&["log", "list"])
        .stdout(predicate::str::contains("No time log entries found"));
}

#[test]
fn test_timer_discard_logs_nothing() {
    let harness = CliTestHarness::new();
    let activity = harness.add(&["activity", "add", "Gaming"]);

    harness.run_success(&["timer", "start", &activity]);
    harness.run_success(&["timer", "discard", &activity, "--force"]);
    harness
        .run_success(&["log", "list"])
        .stdout(predicate::str::contains("No time log entries found"));
    harness
        .run_failure(&["timer", "stop", &activity])
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_feature_overrides_gate_commands() {
    let harness = CliTestHarness::new();

    harness
        .run_success(&["features"])
        .stdout(predicate::str::contains("habits"));

    harness
        .run_success(&["features", "disable", "habits"])
        .stdout(predicate::str::contains("Disabled habits"));
    assert!(harness.state_path().exists());

    harness
        .run_failure(&["habit", "list"])
        .stderr(predicate::str::contains("feature is disabled"));

    harness.run_success(&["features", "reset"]);
    harness.run_success(&["habit", "list"]);

    harness
        .run_failure(&["features", "enable", "teleportation"])
        .stderr(predicate::str::contains("Unknown feature"));
}

#[test]
fn test_env_disables_a_feature() {
    let harness = CliTestHarness::new();
    harness
        .command()
        .env("DAYBOOK_FEATURES__TIME_TRACKING", "false")
        .args(["timer", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("time_tracking"));
}

#[test]
fn test_sync_requires_the_remote_sync_feature() {
    let harness = CliTestHarness::new();
    harness
        .run_failure(&["sync", "push"])
        .stderr(predicate::str::contains("remote_sync"));
    assert!(!harness.remote_dir().exists());
}

#[test]
fn test_sync_push_then_pull_restores_tasks() {
    let harness = CliTestHarness::new();
    harness.run_success(&["features", "enable", "remote_sync"]);

    harness
        .run_success(&["sync", "pull"])
        .stdout(predicate::str::contains("Nothing to pull"));

    let id = harness.add(&["task", "add", "Back me up"]);
    harness
        .run_success(&["sync", "push"])
        .stdout(predicate::str::contains("Pushed 1 tasks"));
    assert!(harness
        .remote_dir()
        .join("users/local/appData/userSpecificData.json")
        .exists());

    harness.run_success(&["task", "delete", &id, "--force"]);
    harness.add(&["task", "add", "Only on this machine"]);

    harness
        .run_success(&["sync", "pull"])
        .stdout(predicate::str::contains("Pulled 1 tasks"));
    let listing = harness.stdout(&["task", "list"]);
    assert!(listing.contains("Back me up"));
    assert!(!listing.contains("Only on this machine"));
}

#[test]
fn test_data_persists_between_runs() {
    let harness = CliTestHarness::new();
    harness.add(&["task", "add", "Survives restarts"]);
    assert!(harness.db_path().exists());
    assert!(harness.stdout(&["task", "list"]).contains("Survives restarts"));
}
