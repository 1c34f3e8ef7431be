//! HTTP boundary for the runbench orchestration core.
//!
//! The server owns nothing the core does not already guarantee: handlers are
//! thin adapters from axum extractors onto [`runbench_core::RunCoordinator`],
//! plus the SSE bridge for live run observation.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;
