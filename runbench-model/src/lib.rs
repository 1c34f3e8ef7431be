//! Data model shared by the runbench orchestration core and its HTTP surface.
//!
//! This crate is deliberately dependency-light: run records, submission
//! requests, live event frames, and the model error type. Everything here is
//! plain data; behavior lives in `runbench-core`.

pub mod error;
pub mod events;
pub mod ids;
pub mod request;
pub mod run;

pub use error::{ModelError, Result};
pub use events::RunEvent;
pub use ids::RunId;
pub use request::{RunOptions, RunRequest, Variant};
pub use run::{
    EnvironmentInfo, Run, RunArtifacts, RunResult, RunStatus, RunTimestamps,
    SPAWN_FAILURE_EXIT_CODE,
};
