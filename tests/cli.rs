#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

fn quadrant(root: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("quadrant")?;
    cmd.env("QUADRANT_LOG", "off")
        .env("QUADRANT_TIMEZONE", "UTC")
        .arg("--db")
        .arg(root.join("quadrant.sqlite3"))
        .arg("--cache-dir")
        .arg(root.join("cache"))
        .args(["--owner", "u1"]);
    Ok(cmd)
}

fn stdout_json(output: &std::process::Output) -> Result<Value> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn add_then_list_tasks() -> Result<()> {
    let dir = tempdir()?;
    let added = quadrant(dir.path())?
        .args(["--json", "tasks", "add", "Write report", "--important"])
        .output()?;
    assert_eq!(added.status.code(), Some(0));
    let added = stdout_json(&added)?;
    assert_eq!(added["status"], "persisted");
    assert_eq!(added["entity"]["quadrant"], "q2");

    let listed = quadrant(dir.path())?
        .args(["--json", "tasks", "list"])
        .output()?;
    assert_eq!(listed.status.code(), Some(0));
    let listed = stdout_json(&listed)?;
    assert_eq!(listed["source"], "remote");
    assert_eq!(listed["tasks"][0]["title"], "Write report");
    Ok(())
}

#[test]
fn offline_list_serves_cache_with_exit_code_two() -> Result<()> {
    let dir = tempdir()?;
    quadrant(dir.path())?
        .args(["tasks", "add", "Cached task"])
        .assert()
        .success();

    let listed = quadrant(dir.path())?
        .args(["--offline", "--json", "tasks", "list"])
        .output()?;
    assert_eq!(listed.status.code(), Some(2));
    let listed = stdout_json(&listed)?;
    assert_eq!(listed["source"], "cache");
    assert_eq!(listed["tasks"][0]["title"], "Cached task");
    Ok(())
}

#[test]
fn empty_title_exits_with_validation_error() -> Result<()> {
    let dir = tempdir()?;
    let output = quadrant(dir.path())?.args(["tasks", "add", ""]).output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid input"));
    Ok(())
}

#[test]
fn ritual_check_updates_stats() -> Result<()> {
    let dir = tempdir()?;
    let added = quadrant(dir.path())?
        .args(["--json", "rituals", "add", "Meditate", "--days", "mon,tue,wed,thu,fri,sat,sun"])
        .output()?;
    assert_eq!(added.status.code(), Some(0));
    let id = stdout_json(&added)?["entity"]["id"]
        .as_str()
        .expect("ritual id")
        .to_string();

    let checked = quadrant(dir.path())?
        .args(["--json", "rituals", "check", &id])
        .output()?;
    assert_eq!(checked.status.code(), Some(0));
    let checked = stdout_json(&checked)?;
    assert_eq!(checked["completed"], true);
    assert_eq!(checked["streak"], 1);

    let stats = quadrant(dir.path())?
        .args(["--json", "rituals", "stats", &id])
        .output()?;
    assert_eq!(stats.status.code(), Some(0));
    assert_eq!(stdout_json(&stats)?["stats"]["longest"], 1);
    Ok(())
}

#[test]
fn bad_weekday_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    quadrant(dir.path())?
        .args(["rituals", "add", "Gym", "--days", "mon,funday"])
        .assert()
        .code(1);
    Ok(())
}

#[test]
fn cache_show_prints_versioned_snapshot() -> Result<()> {
    let dir = tempdir()?;
    quadrant(dir.path())?
        .args(["tasks", "add", "Snapshot me"])
        .assert()
        .success();

    let output = quadrant(dir.path())?
        .args(["cache", "show", "tasks"])
        .output()?;
    assert_eq!(output.status.code(), Some(0));
    let snapshot = stdout_json(&output)?;
    assert_eq!(snapshot["version"], 1);
    assert_eq!(snapshot["items"][0]["title"], "Snapshot me");

    quadrant(dir.path())?
        .args(["cache", "show", "projects"])
        .assert()
        .code(1);
    Ok(())
}
