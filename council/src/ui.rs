//! Progress steps for host planning UIs
//!
//! A snapshot maps to one canonical step list (dispatch, one step per member,
//! synthesize), which is then rendered into each host's plan/todo shape.
//! Steps only ever go `pending -> completed`.

use serde::Serialize;

use crate::status::{OverallState, StatusSnapshot};

/// Text used for step labels
#[derive(Debug, Clone)]
pub struct UiLabels {
    pub prefix: String,
}

impl Default for UiLabels {
    fn default() -> Self {
        Self {
            prefix: "[Council]".to_string(),
        }
    }
}

impl UiLabels {
    fn dispatch(&self) -> String {
        format!("{} Prompt dispatch", self.prefix)
    }

    fn member(&self, name: &str) -> String {
        format!("{} Ask {name}", self.prefix)
    }

    fn synthesize(&self) -> String {
        format!("{} Synthesize", self.prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
}

impl StepStatus {
    fn from_complete(complete: bool) -> Self {
        if complete {
            Self::Completed
        } else {
            Self::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Dispatch,
    Member(String),
    Synthesize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub label: String,
    pub status: StepStatus,
}

impl Step {
    /// Present-tense description for todo-style UIs
    pub fn active_form(&self) -> &'static str {
        let done = self.status == StepStatus::Completed;
        match (&self.kind, done) {
            (StepKind::Dispatch, true) => "Dispatched council prompts",
            (StepKind::Dispatch, false) => "Dispatching council prompts",
            (StepKind::Member(_), true) => "Finished",
            (StepKind::Member(_), false) => "Awaiting response",
            (StepKind::Synthesize, true) => "Council results ready",
            (StepKind::Synthesize, false) => "Waiting to synthesize",
        }
    }
}

/// Canonical step list, members ordered by name
pub fn steps(snapshot: &StatusSnapshot, labels: &UiLabels) -> Vec<Step> {
    let mut members: Vec<_> = snapshot.members.iter().collect();
    members.sort_by(|a, b| a.member.cmp(&b.member));

    let mut steps = Vec::with_capacity(members.len() + 2);
    steps.push(Step {
        kind: StepKind::Dispatch,
        label: labels.dispatch(),
        status: StepStatus::from_complete(snapshot.counts.queued == 0),
    });
    for m in members {
        steps.push(Step {
            kind: StepKind::Member(m.member.clone()),
            label: labels.member(&m.member),
            status: StepStatus::from_complete(m.state.is_terminal()),
        });
    }
    steps.push(Step {
        kind: StepKind::Synthesize,
        label: labels.synthesize(),
        status: StepStatus::from_complete(snapshot.is_done()),
    });
    steps
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub overall_state: OverallState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub step: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatePlan {
    pub plan: Vec<PlanStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodexUi {
    pub update_plan: UpdatePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub content: String,
    pub status: StepStatus,
    pub active_form: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodoWrite {
    pub todos: Vec<Todo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaudeUi {
    pub todo_write: TodoWrite,
}

/// Every host shape for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiPayload {
    pub progress: Progress,
    pub codex: CodexUi,
    pub claude: ClaudeUi,
}

pub fn build_ui_payload(snapshot: &StatusSnapshot, labels: &UiLabels) -> UiPayload {
    let steps = steps(snapshot, labels);
    let plan = steps
        .iter()
        .map(|s| PlanStep {
            step: s.label.clone(),
            status: s.status,
        })
        .collect();
    let todos = steps
        .iter()
        .map(|s| Todo {
            content: s.label.clone(),
            status: s.status,
            active_form: s.active_form().to_string(),
        })
        .collect();

    UiPayload {
        progress: Progress {
            done: snapshot.counts.terminal(),
            total: snapshot.counts.total,
            overall_state: snapshot.overall_state,
        },
        codex: CodexUi {
            update_plan: UpdatePlan { plan },
        },
        claude: ClaudeUi {
            todo_write: TodoWrite { todos },
        },
    }
}
