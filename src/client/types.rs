// JSON-RPC 2.0 envelope and the canonical types the gateway hands out.
use crate::crypto::AccountHash;
use crate::deploy::DeployHash;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Typed `account_put_deploy` result. Deliberately strict: this is the
/// path that rejects responses not matching the documented schema.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PutDeployResult {
    pub api_version: String,
    pub deploy_hash: DeployHash,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NamedKey {
    pub name: String,
    pub key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssociatedKey {
    pub account_hash: AccountHash,
    pub weight: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionThresholds {
    pub deployment: u8,
    pub key_management: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_hash: AccountHash,
    pub named_keys: Vec<NamedKey>,
    pub main_purse: Option<String>,
    pub associated_keys: Vec<AssociatedKey>,
    pub action_thresholds: ActionThresholds,
}

impl AccountInfo {
    pub fn named_key(&self, name: &str) -> Option<&str> {
        self.named_keys
            .iter()
            .find(|nk| nk.name == name)
            .map(|nk| nk.key.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
}

/// One shape for every execution-result envelope the node has used.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    pub fn pending() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            error_message: None,
        }
    }

    pub fn success() -> Self {
        Self {
            status: ExecutionStatus::Success,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            error_message: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != ExecutionStatus::Pending
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeployRecord {
    pub deploy_hash: DeployHash,
    pub outcome: ExecutionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

impl DeployRecord {
    pub fn pending(deploy_hash: DeployHash) -> Self {
        Self {
            deploy_hash,
            outcome: ExecutionOutcome::pending(),
            block_hash: None,
        }
    }
}
