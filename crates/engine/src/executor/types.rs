//! Core executor data types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of one action invocation.
///
/// Phases only move forward; `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActionPhase {
    /// Created, handler not yet looked up.
    Pending,
    /// Configuration templates are being resolved and validated.
    ResolvingConfig,
    /// The handler is executing.
    Running,
    Succeeded,
    Failed,
}

impl ActionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionPhase::Succeeded | ActionPhase::Failed)
    }
}

/// Outcome summary of one action invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    /// Action name (result/error map key).
    pub name: String,
    /// Handler key.
    pub key: String,
    /// Final phase reached.
    pub phase: ActionPhase,
    /// Attempts made by the handler (>= 1 once it ran).
    pub attempts: u32,
    /// Wall time spent, in milliseconds.
    pub duration_ms: u64,
    /// Error record when the action failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ActionReport {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            phase: ActionPhase::Pending,
            attempts: 0,
            duration_ms: 0,
            error: None,
        }
    }

    /// Move to a later phase. Earlier or equal phases are ignored.
    pub fn advance(&mut self, phase: ActionPhase) {
        if !self.phase.is_terminal() && phase_rank(phase) > phase_rank(self.phase) {
            self.phase = phase;
        }
    }
}

fn phase_rank(phase: ActionPhase) -> u8 {
    match phase {
        ActionPhase::Pending => 0,
        ActionPhase::ResolvingConfig => 1,
        ActionPhase::Running => 2,
        ActionPhase::Succeeded | ActionPhase::Failed => 3,
    }
}

/// Result of running a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub pipeline: String,
    /// One report per action that was started, in order.
    pub actions: Vec<ActionReport>,
    /// True when a failing action with `onError: halt` stopped the run.
    pub halted: bool,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        !self.halted && self.actions.iter().all(|report| report.phase == ActionPhase::Succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionReport> {
        self.actions.iter().filter(|report| report.phase == ActionPhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        let mut report = ActionReport::new("load", "http.request");
        report.advance(ActionPhase::Running);
        report.advance(ActionPhase::ResolvingConfig);
        assert_eq!(report.phase, ActionPhase::Running);
        report.advance(ActionPhase::Failed);
        report.advance(ActionPhase::Succeeded);
        assert_eq!(report.phase, ActionPhase::Failed);
    }
}
