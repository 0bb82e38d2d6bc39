//! Context window budgeting and compaction: token estimation, tiered
//! budget selection, and the always-available fallback history compactor.

pub mod compactor;
pub mod tokens;
pub mod window;

pub use compactor::{compact, needs_compaction};
pub use tokens::{estimate_history_tokens, estimate_message_tokens, estimate_tokens};
pub use window::{budget_for_attempt, build_window};
