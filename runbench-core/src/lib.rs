//! Orchestration core for runbench.
//!
//! Four pieces, leaves first: [`store::RunStore`] (file-per-run persistence),
//! [`executor::ProcessExecutor`] (one child process per run, hard wall-clock
//! ceiling), [`broadcaster::EventBroadcaster`] (per-run fan-out to live
//! subscribers), and [`coordinator::RunCoordinator`] (admission, the single
//! worker loop, and lifecycle transitions). The coordinator is the sole
//! writer of run status; everything else is safe under concurrent callers.

pub mod api;
pub mod broadcaster;
pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod store;

pub use broadcaster::EventBroadcaster;
pub use catalog::{ScriptCatalog, ScriptEntry, StaticScriptCatalog};
pub use coordinator::{CoordinatorConfig, RunCoordinator, RunSubscription};
pub use error::{Result, RunError};
pub use executor::{ExecEvent, ExecHandle, ProcessExecutor};
pub use store::RunStore;
