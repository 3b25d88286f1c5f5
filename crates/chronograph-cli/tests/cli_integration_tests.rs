//! CLI integration tests for chronograph
//!
//! Drives the chronograph binary end-to-end against a journal in a temp dir.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Command isolated from the user's config and journal
#[allow(deprecated)]
fn chronograph_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("chronograph").unwrap();
    cmd.env("CHRONOGRAPH_CONFIG_DIR", dir.path().join("config"));
    cmd.env("RUST_LOG", "off");
    cmd.arg("--journal").arg(dir.path().join("journal.jsonl"));
    cmd
}

fn record_skill(dir: &TempDir, level: u32, author: &str, change: &str) {
    chronograph_cmd(dir)
        .args([
            "record-element",
            "skill-python",
            "--type",
            "skill",
            "--data",
            &format!(r#"{{"name": "python", "level": {}}}"#, level),
            "--author",
            author,
            "--change",
            change,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded skill-python"));
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    chronograph_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("record-element"))
        .stdout(predicate::str::contains("graph-at"))
        .stdout(predicate::str::contains("index-stats"));
}

#[test]
fn test_history_persists_across_invocations() {
    let dir = TempDir::new().unwrap();
    record_skill(&dir, 1, "user1", "create");
    record_skill(&dir, 2, "user2", "update");
    record_skill(&dir, 3, "user3", "update");

    assert!(dir.path().join("journal.jsonl").exists());

    let history = json_stdout(chronograph_cmd(&dir).args(["--format", "json", "history", "skill-python"]));
    let authors: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["author"].as_str().unwrap())
        .collect();
    assert_eq!(authors, vec!["user1", "user2", "user3"]);

    chronograph_cmd(&dir)
        .args(["history", "skill-python"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v3"))
        .stdout(predicate::str::contains("user3"));
}

#[test]
fn test_unknown_element_reports_code() {
    let dir = TempDir::new().unwrap();
    chronograph_cmd(&dir)
        .args(["history", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001"));
}

#[test]
fn test_update_after_delete_is_rejected() {
    let dir = TempDir::new().unwrap();
    record_skill(&dir, 1, "user1", "create");
    record_skill(&dir, 1, "user1", "delete");

    chronograph_cmd(&dir)
        .args([
            "record-element",
            "skill-python",
            "--type",
            "skill",
            "--data",
            r#"{"level": 9}"#,
            "--change",
            "update",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E102"))
        .stderr(predicate::str::contains("--change create"));
}

#[test]
fn test_relationship_flow() {
    let dir = TempDir::new().unwrap();
    chronograph_cmd(&dir)
        .args([
            "record-relationship",
            "--id",
            "rel-1",
            "--from",
            "skill-1",
            "--to",
            "persona-1",
            "--type",
            "uses",
            "--confidence",
            "0.9",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("skill-1 -[uses]-> persona-1"));

    chronograph_cmd(&dir)
        .args(["record-relationship", "--id", "rel-1", "--from", "skill-1", "--to", "persona-1"])
        .args(["--type", "uses", "--confidence", "0.85", "--change", "update"])
        .assert()
        .success();

    let history = json_stdout(
        chronograph_cmd(&dir).args(["--format", "json", "relation-history", "rel-1", "--decay"]),
    );
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        let original = entry["original_confidence"].as_f64().unwrap();
        let decayed = entry["decayed_confidence"].as_f64().unwrap();
        assert!(decayed <= original);
    }

    chronograph_cmd(&dir)
        .args(["related", "persona-1", "--direction", "reverse"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rel-1"));

    let projected = json_stdout(
        chronograph_cmd(&dir).args(["--format", "json", "project", "rel-1", "2999-01-01T00:00:00Z"]),
    );
    assert_eq!(projected["original_confidence"], 0.85);
    assert!(projected["projected_confidence"].as_f64().unwrap() < 0.85);
    assert!(projected["decay_percentage"].as_f64().unwrap() > 0.0);

    chronograph_cmd(&dir)
        .args(["project", "rel-1", "2000-01-01T00:00:00Z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E107"));

    let stats = json_stdout(chronograph_cmd(&dir).args(["--format", "json", "index-stats"]));
    let mut keys: Vec<&str> = stats.as_object().unwrap().keys().map(|k| k.as_str()).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "cache_hits",
            "cache_misses",
            "cache_size",
            "forward_entries",
            "reverse_entries"
        ]
    );
}

#[test]
fn test_relationship_missing_fields_rejected() {
    let dir = TempDir::new().unwrap();
    chronograph_cmd(&dir)
        .args(["record-relationship", "--from", "a", "--type", "uses", "--confidence", "0.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E103"));
    assert!(!dir.path().join("journal.jsonl").exists());
}

#[test]
fn test_decayed_threshold_out_of_range() {
    let dir = TempDir::new().unwrap();
    for threshold in ["-0.5", "1.5"] {
        chronograph_cmd(&dir)
            .args(["decayed", "--threshold", threshold])
            .assert()
            .failure()
            .stderr(predicate::str::contains("E106"));
    }
}

#[test]
fn test_graph_before_any_change_is_empty() {
    let dir = TempDir::new().unwrap();
    record_skill(&dir, 1, "user1", "create");

    let graph = json_stdout(
        chronograph_cmd(&dir).args(["--format", "json", "graph-at", "2000-01-01T00:00:00Z"]),
    );
    assert_eq!(graph["elements"].as_object().unwrap().len(), 0);
    assert_eq!(graph["relationships"].as_object().unwrap().len(), 0);

    chronograph_cmd(&dir)
        .args(["graph-at", "not-a-time"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E105"));
}

#[test]
fn test_stats_and_export_version() {
    let dir = TempDir::new().unwrap();
    record_skill(&dir, 1, "user1", "create");
    record_skill(&dir, 2, "user2", "update");

    let stats = json_stdout(chronograph_cmd(&dir).args(["--format", "json", "stats"]));
    assert_eq!(stats["tracked_elements"], 1);
    assert_eq!(stats["tracked_relationships"], 0);
    assert_eq!(stats["total_element_versions"], 2);
    assert_eq!(stats["decay_stats"]["total_relationships"], 0);
    assert_eq!(stats["decay_stats"]["decay_configuration"]["decay_function"], "exponential");

    let exported = json_stdout(chronograph_cmd(&dir).args(["export-version", "skill-python", "1"]));
    assert_eq!(exported["level"], 1);

    chronograph_cmd(&dir)
        .args(["export-version", "skill-python", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E003"));
}

#[test]
fn test_config_set_get_and_show() {
    let dir = TempDir::new().unwrap();
    chronograph_cmd(&dir)
        .args(["config", "set", "decay.function", "linear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set decay.function = linear"));

    chronograph_cmd(&dir)
        .args(["config", "get", "decay.function"])
        .assert()
        .success()
        .stdout(predicate::str::contains("linear"));

    chronograph_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("index.cache_capacity = 1024"));

    chronograph_cmd(&dir)
        .args(["config", "set", "decay.half_life_hours", "-1"])
        .assert()
        .failure();

    chronograph_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
