// Two-phase tailoring pipeline: state machine, review state, orchestration,
// in-memory sessions and the HTTP handlers that drive them.

pub mod handlers;
pub mod orchestrator;
pub mod review;
pub mod session;
pub mod state;
