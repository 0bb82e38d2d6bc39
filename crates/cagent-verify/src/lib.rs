//! Runs the user-declared quality-gate commands and renders their
//! failures as feedback text for the iteration engine's auto-fix loop.

pub mod runner;

pub use runner::{all_passed, failure_feedback, run_checks};
