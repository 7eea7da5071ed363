//! Human-readable output for status and results

use council::{JobResults, MemberState, StatusSnapshot};
use std::fmt::Write;

fn exit_suffix(exit_code: Option<i32>) -> String {
    exit_code
        .map(|code| format!(" (exit {code})"))
        .unwrap_or_default()
}

/// `members 1/3 done; running=2 queued=0`, plus one line per member when
/// `verbose`
pub fn status_text(snapshot: &StatusSnapshot, verbose: bool) -> String {
    let counts = &snapshot.counts;
    let mut out = format!(
        "members {}/{} done; running={} queued={}\n",
        counts.terminal(),
        counts.total,
        counts.running,
        counts.queued
    );
    if verbose {
        for m in &snapshot.members {
            let _ = writeln!(out, "- {}: {}{}", m.member, m.state, exit_suffix(m.exit_code));
        }
    }
    out
}

fn checklist_mark(state: MemberState) -> &'static str {
    match state {
        MemberState::Done => "[x]",
        MemberState::Queued | MemberState::Running => "[ ]",
        _ => "[!]",
    }
}

pub fn status_checklist(snapshot: &StatusSnapshot) -> String {
    let counts = &snapshot.counts;
    let mut out = format!("Agent Council ({})\n", snapshot.id);
    let _ = writeln!(
        out,
        "Progress: {}/{} done  (running {}, queued {})",
        counts.terminal(),
        counts.total,
        counts.running,
        counts.queued
    );
    for m in &snapshot.members {
        let _ = writeln!(
            out,
            "{} {}: {}{}",
            checklist_mark(m.state),
            m.member,
            m.state,
            exit_suffix(m.exit_code)
        );
    }
    out
}

/// One `=== member (state) ===` section per member. Stderr is shown only
/// when the member produced no output.
pub fn results_text(results: &JobResults) -> String {
    let mut out = String::new();
    for m in &results.members {
        let _ = write!(out, "\n=== {} ({}) ===\n", m.member, m.state);
        if let Some(message) = &m.message {
            let _ = writeln!(out, "{message}");
        }
        out.push_str(&m.output);
        if m.output.is_empty() && !m.error.is_empty() {
            out.push('\n');
            out.push_str(&m.error);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use council::{MemberResult, MemberSnapshot, OverallState, StateCounts};
    use std::path::PathBuf;

    fn member(name: &str, state: MemberState, exit_code: Option<i32>) -> MemberSnapshot {
        MemberSnapshot {
            member: name.to_string(),
            slug: name.to_string(),
            state,
            started_at: None,
            finished_at: None,
            exit_code,
            message: None,
        }
    }

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            job_dir: PathBuf::from("/jobs/council-1"),
            id: "council-1".to_string(),
            chairman_role: "claude".to_string(),
            overall_state: OverallState::Running,
            counts: StateCounts {
                total: 3,
                running: 1,
                done: 1,
                timed_out: 1,
                ..StateCounts::default()
            },
            members: vec![
                member("codex", MemberState::Done, Some(0)),
                member("gemini", MemberState::TimedOut, None),
                member("grok", MemberState::Running, None),
            ],
        }
    }

    #[test]
    fn test_status_text() {
        assert_eq!(
            status_text(&snapshot(), false),
            "members 2/3 done; running=1 queued=0\n"
        );
        let verbose = status_text(&snapshot(), true);
        assert!(verbose.contains("- codex: done (exit 0)\n"));
        assert!(verbose.contains("- gemini: timed_out\n"));
    }

    #[test]
    fn test_checklist_marks() {
        let text = status_checklist(&snapshot());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Agent Council (council-1)");
        assert_eq!(lines[1], "Progress: 2/3 done  (running 1, queued 0)");
        assert_eq!(lines[2], "[x] codex: done (exit 0)");
        assert_eq!(lines[3], "[!] gemini: timed_out");
        assert_eq!(lines[4], "[ ] grok: running");
    }

    #[test]
    fn test_results_text_falls_back_to_stderr() {
        let results = JobResults {
            job_dir: PathBuf::from("/jobs/council-1"),
            id: "council-1".to_string(),
            prompt: "q".to_string(),
            members: vec![
                MemberResult {
                    member: "codex".to_string(),
                    slug: "codex".to_string(),
                    state: MemberState::Done,
                    exit_code: Some(0),
                    message: None,
                    output: "answer\n".to_string(),
                    error: "noise\n".to_string(),
                },
                MemberResult {
                    member: "gemini".to_string(),
                    slug: "gemini".to_string(),
                    state: MemberState::Error,
                    exit_code: Some(2),
                    message: Some("exited with code 2".to_string()),
                    output: String::new(),
                    error: "bad flag\n".to_string(),
                },
            ],
        };
        let text = results_text(&results);
        assert_eq!(
            text,
            "\n=== codex (done) ===\nanswer\n\n\n=== gemini (error) ===\nexited with code 2\n\nbad flag\n\n"
        );
    }
}
