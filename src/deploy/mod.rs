//! Unsigned deploy construction.

pub mod builder;
pub mod types;

pub use builder::{parse_contract_hash, DeployBuilder, SessionTarget, GAS_PRICE};
pub use types::{
    Approval, Deploy, DeployHash, DeployHeader, Digest, ExecutableDeployItem, TimeDiff, Timestamp,
};
