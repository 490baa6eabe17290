// RPC client for the ledger node's JSON-RPC surface
use super::normalize;
use super::raw::{RawRpcClient, RawRpcFailure, SubmissionResult};
use super::types::{AccountInfo, DeployRecord, PutDeployResult};
use super::LedgerGateway;
use crate::clvalue::CLValue;
use crate::config::NodeConfig;
use crate::deploy::{Deploy, DeployHash};
use crate::error::{RecoveryError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct RpcClient {
    raw: Arc<RawRpcClient>,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            raw: Arc::new(RawRpcClient::new(url, timeout)?),
        })
    }

    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        Self::with_timeout(&config.rpc_url, Duration::from_secs(config.request_timeout_secs))
    }

    pub fn url(&self) -> &str {
        self.raw.url()
    }

    /// The transport this client sends through, shared with the raw
    /// submission path.
    pub fn raw_client(&self) -> Arc<RawRpcClient> {
        self.raw.clone()
    }

    /// Secondary submission path; see [`RawRpcClient::submit_deploy`].
    pub async fn submit_deploy_raw(&self, deploy: &Deploy) -> SubmissionResult {
        self.raw.submit_deploy(deploy).await
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        self.raw
            .call(method, Some(params))
            .await
            .map_err(RecoveryError::from)
    }

    /// Like `send_request`, but a "value not found" answer is `None`.
    async fn send_read(&self, method: &str, params: Value) -> Result<Option<Value>> {
        match self.raw.call(method, Some(params)).await {
            Ok(v) => Ok(Some(v)),
            Err(RawRpcFailure::Rpc { code, message, .. })
                if normalize::is_missing_value(code, &message) =>
            {
                debug!("{}: no value ({})", method, message);
                Ok(None)
            }
            Err(failure) => Err(failure.into()),
        }
    }
}

#[async_trait]
impl LedgerGateway for RpcClient {
    async fn state_root_hash(&self) -> Result<String> {
        let result = self.send_request("chain_get_state_root_hash", json!({})).await?;
        normalize::state_root_hash(&result).ok_or_else(|| {
            RecoveryError::MalformedResponse(format!("no state root hash in {}", result))
        })
    }

    async fn query_global_state(
        &self,
        state_root_hash: &str,
        key: &str,
        path: &[String],
    ) -> Result<Option<CLValue>> {
        let params = json!({
            "state_identifier": { "StateRootHash": state_root_hash },
            "key": key,
            "path": path,
        });
        let result = self.send_read("query_global_state", params).await?;
        Ok(result.as_ref().and_then(normalize::stored_cl_value))
    }

    async fn get_dictionary_item(
        &self,
        state_root_hash: &str,
        contract_hash: &str,
        dictionary_name: &str,
        item_key: &str,
    ) -> Result<Option<CLValue>> {
        let params = json!({
            "state_root_hash": state_root_hash,
            "dictionary_identifier": {
                "ContractNamedKey": {
                    "key": contract_hash,
                    "dictionary_name": dictionary_name,
                    "dictionary_item_key": item_key,
                }
            },
        });
        let result = self.send_read("state_get_dictionary_item", params).await?;
        Ok(result.as_ref().and_then(normalize::stored_cl_value))
    }

    async fn get_account(&self, account_identifier: &str) -> Result<Option<AccountInfo>> {
        let params = json!({
            "account_identifier": account_identifier,
            "block_identifier": null,
        });
        let result = self.send_read("state_get_account_info", params).await?;
        Ok(result.as_ref().and_then(normalize::account_info))
    }

    async fn put_deploy(&self, deploy: &Deploy) -> Result<DeployHash> {
        let result = self
            .send_request("account_put_deploy", json!({ "deploy": deploy }))
            .await?;
        let typed: PutDeployResult = serde_json::from_value(result)
            .map_err(|e| RecoveryError::Deserialization(e.to_string()))?;
        if typed.deploy_hash != deploy.hash {
            return Err(RecoveryError::HashMismatch(
                deploy.hash.to_hex(),
                typed.deploy_hash.to_hex(),
            ));
        }
        info!("Deploy {} accepted (api {})", typed.deploy_hash, typed.api_version);
        Ok(typed.deploy_hash)
    }

    async fn get_deploy(&self, deploy_hash: &DeployHash) -> Result<DeployRecord> {
        let params = json!({
            "deploy_hash": deploy_hash.to_hex(),
            "finalized_approvals": false,
        });
        match self.raw.call("info_get_deploy", Some(params)).await {
            Ok(result) => Ok(normalize::deploy_record(*deploy_hash, &result)),
            Err(RawRpcFailure::Rpc { code, message, .. })
                if normalize::is_unknown_deploy(code, &message) =>
            {
                debug!("Deploy {} not known yet: {}", deploy_hash, message);
                Ok(DeployRecord::pending(*deploy_hash))
            }
            Err(failure) => Err(failure.into()),
        }
    }
}
