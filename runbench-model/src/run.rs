use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ids::RunId;
use crate::request::RunRequest;

/// Exit code recorded when the executor could not spawn the process at all.
/// Real processes report their own code; signal deaths map to `128 + signo`.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Lifecycle status of a run. Completed and Failed are terminal; a terminal
/// record is never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTimestamps {
    pub queued: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

/// Snapshot of the executing host, captured when the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub runner_version: String,
}

/// Present only once a run is terminal. `timed_out` distinguishes "ran and
/// failed" from "never finished within the wall-clock budget".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<PathBuf>,
    /// Populated only when the request enabled `trace`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<PathBuf>,
    /// Populated only when the request enabled `profile`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<PathBuf>,
}

/// The unit of work and the unit of persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub request: RunRequest,
    pub status: RunStatus,
    pub timestamps: RunTimestamps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(default)]
    pub artifacts: RunArtifacts,
}

impl Run {
    /// Construct a freshly admitted run: status Queued, queued timestamp now.
    pub fn admitted(request: RunRequest) -> Self {
        Self {
            id: RunId::new(),
            request,
            status: RunStatus::Queued,
            timestamps: RunTimestamps {
                queued: Utc::now(),
                started: None,
                completed: None,
            },
            environment: None,
            result: None,
            artifacts: RunArtifacts::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Variant;

    #[test]
    fn admitted_run_starts_queued() {
        let run = Run::admitted(RunRequest::new("fib", Variant::Baseline));
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.timestamps.started.is_none());
        assert!(run.result.is_none());
        assert!(!run.is_terminal());
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut run = Run::admitted(RunRequest::new("sort", Variant::Debug));
        run.status = RunStatus::Completed;
        run.result = Some(RunResult {
            exit_code: 0,
            duration_ms: 1234,
            timed_out: false,
        });
        run.artifacts.stdout_path = Some(PathBuf::from("/tmp/out.log"));

        let json = serde_json::to_string(&run).unwrap();
        let back: Run = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
