pub mod asset_state;
pub mod batch;
pub mod reference;
pub mod retry;
pub mod storage;

pub use asset_state::AssetState;
pub use batch::{BatchFailure, BatchOutcome, best_effort};
