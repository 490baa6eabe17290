//! Guardian and recovery state, reconstructed from raw ledger storage.

mod interpret;
pub mod keys;
pub mod reconstructor;
pub mod types;

pub use reconstructor::{StateReconstructor, StateSource};
pub use types::{GuardianApproval, GuardianSet, RecoveryRequest};
