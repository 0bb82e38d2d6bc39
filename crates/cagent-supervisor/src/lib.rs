pub mod contract;
pub mod multi;
pub mod recovery;
pub mod supervisor;

pub use contract::meets_completion_contract;
pub use multi::{build_single_fallback_request, should_fallback_to_single};
pub use recovery::{build_recovery_request, seed_recovery_checkpoint};
pub use supervisor::{run_from_checkpoint, run_with_recovery};
