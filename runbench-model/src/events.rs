use serde::{Deserialize, Serialize};

use crate::run::Run;

/// One frame on a run's live channel.
///
/// Subscribers see zero or more output frames followed by exactly one
/// `Complete` frame carrying the final record; nothing follows `Complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    Stdout { text: String },
    Stderr { text: String },
    Complete { run: Box<Run> },
}

impl RunEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::Stdout { .. } => "stdout",
            RunEvent::Stderr { .. } => "stderr",
            RunEvent::Complete { .. } => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Complete { .. })
    }
}
