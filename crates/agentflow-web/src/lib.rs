//! agentflow-web — HTTP front end for the SLR pipeline.
//! Provides:
//!   - Bibliographic export upload and record-set storage
//!   - Batch run, status, listing and cancellation
//!   - Feedback submission and agent configuration
//!   - Live batch progress over SSE

pub mod router;
pub mod handlers;
pub mod state;
pub mod sse;

pub use router::build_router;
pub use state::{AppState, SharedState};
