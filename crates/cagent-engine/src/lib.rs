//! The single-agent iteration engine: drives the perceive-decide-act loop
//! against a workspace, enforcing stagnation and premature-final guards,
//! checkpointing periodically, and honoring cooperative cancellation.

pub mod digest;
pub mod engine;
pub mod events;
pub mod guards;
pub mod prompt;

pub use engine::{run_iteration_loop, RunOutcome};
pub use events::RunEventSink;
pub use guards::{check_premature_final, StagnationTracker};
