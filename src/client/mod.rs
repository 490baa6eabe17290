//! Ledger gateway: the only place that talks to the node.
//!
//! Everything returned from here is already normalized; callers never see
//! node-version-specific envelope shapes.

pub mod memory;
pub mod normalize;
pub mod raw;
pub mod rpc_client;
pub mod types;

use crate::clvalue::CLValue;
use crate::deploy::{Deploy, DeployHash};
use crate::error::Result;
use async_trait::async_trait;

pub use memory::MemoryLedger;
pub use raw::{RawRpcClient, RawRpcFailure, SubmissionResult};
pub use rpc_client::RpcClient;
pub use types::{
    AccountInfo, ActionThresholds, AssociatedKey, DeployRecord, ExecutionOutcome, ExecutionStatus,
    NamedKey,
};

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn state_root_hash(&self) -> Result<String>;

    /// Reads the value at `key` (e.g. `account-hash-..`) following the
    /// named-key `path`. `Ok(None)` when nothing is stored there.
    async fn query_global_state(
        &self,
        state_root_hash: &str,
        key: &str,
        path: &[String],
    ) -> Result<Option<CLValue>>;

    /// `contract_hash` is in `hash-<hex>` form.
    async fn get_dictionary_item(
        &self,
        state_root_hash: &str,
        contract_hash: &str,
        dictionary_name: &str,
        item_key: &str,
    ) -> Result<Option<CLValue>>;

    /// `account_identifier` is a public key hex or `account-hash-<hex>`.
    async fn get_account(&self, account_identifier: &str) -> Result<Option<AccountInfo>>;

    async fn put_deploy(&self, deploy: &Deploy) -> Result<DeployHash>;

    /// Unknown deploys come back as pending, not as an error.
    async fn get_deploy(&self, deploy_hash: &DeployHash) -> Result<DeployRecord>;
}
