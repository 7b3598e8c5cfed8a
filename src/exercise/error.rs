use std::fmt;

use serde::Serialize;

use super::types::PhaseKind;

/// Events the session state machine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionAction {
    Start,
    ToggleChecklist,
    DismissMidCheck,
    Finish,
    End,
    Cancel,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionAction::Start => "start",
            SessionAction::ToggleChecklist => "toggle checklist",
            SessionAction::DismissMidCheck => "dismiss mid-check",
            SessionAction::Finish => "finish",
            SessionAction::End => "end",
            SessionAction::Cancel => "cancel",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("duration must be greater than zero minutes")]
    InvalidDuration,

    #[error("cannot {action} while the session is in the {phase} phase")]
    InvalidTransition {
        action: SessionAction,
        phase: PhaseKind,
    },

    #[error("no active exercise session")]
    NoActiveSession,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
