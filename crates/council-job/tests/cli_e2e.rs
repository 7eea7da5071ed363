//! End-to-end tests against the built `council-job` binary
//!
//! Members are plain shell commands, so these run without any agent CLI
//! installed. Workers are real detached processes.
//! - start → wait chain → results → clean
//! - stop cancels a running member
//! - structural errors exit non-zero with a coded message

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

fn council_job(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_council-job"))
        .args(args)
        .env_remove("COUNCIL_CONFIG")
        .env_remove("COUNCIL_JOBS_DIR")
        .env_remove("COUNCIL_CHAIRMAN")
        .env_remove("COUNCIL_HOST_ROLE")
        .env_remove("COUNCIL_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run council-job")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "council-job failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

fn write_config(dir: &Path, members: &str) -> PathBuf {
    let path = dir.join("council.config.yaml");
    std::fs::write(
        &path,
        format!("council:\n  chairman:\n    role: chair\n  members:\n{members}  settings:\n    timeout: 20\n"),
    )
    .unwrap();
    path
}

fn start_job(members: &str) -> (TempDir, String) {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), members);
    let jobs = dir.path().join("jobs");
    let output = council_job(&[
        "start",
        "--json",
        "--config",
        config.to_str().unwrap(),
        "--jobs-dir",
        jobs.to_str().unwrap(),
        "What",
        "is",
        "best?",
    ]);
    let started = stdout_json(&output);
    let job_dir = started["jobDir"].as_str().unwrap().to_string();
    (dir, job_dir)
}

fn status(job_dir: &str) -> Value {
    stdout_json(&council_job(&["status", job_dir]))
}

fn member_state(snapshot: &Value, member: &str) -> String {
    snapshot["members"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["member"] == member)
        .map(|m| m["state"].as_str().unwrap().to_string())
        .unwrap_or_default()
}

fn poll_until(job_dir: &str, what: &str, pred: impl Fn(&Value) -> bool) -> Value {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let snapshot = status(job_dir);
        if pred(&snapshot) {
            return snapshot;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}: {snapshot}");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn test_start_wait_results_clean() {
    let (_dir, job_dir) = start_job(concat!(
        "    - name: alpha\n      command: echo alpha says\n",
        "    - name: beta\n      command: sh -c 'echo beta failed >&2; exit 3'\n",
        "    - name: ghost\n      command: council-test-missing-cli --ask\n",
    ));

    let first = stdout_json(&council_job(&["wait", "--interval-ms", "50", &job_dir]));
    assert!(first["cursor"].as_str().unwrap().starts_with("v2:1:"));
    assert_eq!(first["ui"]["progress"]["total"], 3);

    let mut last = first;
    let mut calls = 1;
    while last["overallState"] != "done" {
        last = stdout_json(&council_job(&[
            "wait",
            "--interval-ms",
            "50",
            "--timeout-ms",
            "20000",
            &job_dir,
        ]));
        calls += 1;
        assert!(calls <= 6, "wait chain did not settle: {last}");
    }
    assert!(last["cursor"].as_str().unwrap().ends_with(":1"));
    let plan = last["ui"]["codex"]["update_plan"]["plan"].as_array().unwrap();
    assert!(plan.iter().all(|step| step["status"] == "completed"));

    let results = stdout_json(&council_job(&["results", "--json", &job_dir]));
    assert_eq!(results["prompt"], "What is best?");
    let members = results["members"].as_array().unwrap();
    assert_eq!(members.len(), 3);
    assert_eq!(members[0]["member"], "alpha");
    assert_eq!(members[0]["state"], "done");
    assert_eq!(members[0]["exitCode"], 0);
    assert_eq!(members[0]["output"], "alpha says What is best?\n");
    assert_eq!(members[1]["state"], "error");
    assert_eq!(members[1]["exitCode"], 3);
    assert_eq!(members[1]["error"], "beta failed\n");
    assert_eq!(members[2]["state"], "missing_cli");

    let checklist = council_job(&["status", "--checklist", &job_dir]);
    let text = String::from_utf8(checklist.stdout).unwrap();
    assert!(text.contains("[x] alpha: done (exit 0)"));
    assert!(text.contains("[!] beta: error (exit 3)"));
    assert!(text.contains("[!] ghost: missing_cli"));

    let text = String::from_utf8(council_job(&["results", &job_dir]).stdout).unwrap();
    assert!(text.contains("=== alpha (done) ===\nalpha says What is best?\n"));

    let cleaned = council_job(&["clean", &job_dir]);
    assert!(cleaned.status.success());
    assert!(!Path::new(&job_dir).exists());
}

#[test]
fn test_stop_cancels_running_member() {
    let (_dir, job_dir) = start_job(concat!(
        "    - name: slow\n      command: sh -c 'sleep 30'\n",
        "    - name: quick\n      command: echo done\n",
    ));

    poll_until(&job_dir, "slow to run", |s| {
        member_state(s, "slow") == "running" && member_state(s, "quick") == "done"
    });

    let stopped = council_job(&["stop", &job_dir]);
    assert_eq!(
        String::from_utf8(stopped.stdout).unwrap(),
        "stop: sent SIGTERM to running members\n"
    );

    let snapshot = poll_until(&job_dir, "cancellation", |s| s["overallState"] == "done");
    assert_eq!(member_state(&snapshot, "slow"), "canceled");
    assert_eq!(member_state(&snapshot, "quick"), "done");

    let again = council_job(&["stop", &job_dir]);
    assert_eq!(
        String::from_utf8(again.stdout).unwrap(),
        "stop: no running members\n"
    );
}

#[test]
fn test_missing_job_is_reported() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("council-nope");

    let output = council_job(&["status", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("[NOT_FOUND] jobDir not found"), "{stderr}");

    let output = council_job(&["results", "--json", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["code"], "NOT_FOUND");

    let output = council_job(&["wait", "--bucket", "0", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["code"], "INVALID_ARGUMENT");
}
