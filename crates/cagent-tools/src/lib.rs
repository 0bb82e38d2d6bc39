//! Tool executor: dispatches the ten non-terminal `Action` variants against
//! a sandboxed workspace, enforcing per-run mutation/command budgets and
//! recording every mutation into a rollback journal.

pub mod budgets;
pub mod executor;
pub mod read;
pub mod rollback;
pub mod search;
pub mod tree;
pub mod web_search;
pub mod write;

pub use budgets::Budgets;
pub use executor::{execute_action, ToolOutcome};
pub use rollback::RollbackJournal;
pub use web_search::{NoopWebSearchClient, WebSearchClient};
