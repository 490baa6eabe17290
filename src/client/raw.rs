// Raw JSON-RPC transport. Builds the envelope by hand and classifies every
// way a call can fail into data instead of an error.
use super::normalize;
use super::types::{RpcErrorObject, RpcRequest, RpcResponse};
use crate::deploy::{Deploy, DeployHash};
use crate::error::{RecoveryError, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawRpcFailure {
    /// No HTTP response at all: connection refused, DNS, timeout.
    Transport { message: String },
    /// Non-2xx status.
    Http { status: u16, body: String },
    EmptyBody { status: u16 },
    MalformedJson { status: u16, body: String },
    /// Well-formed envelope carrying an `error` object.
    Rpc {
        code: i64,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

impl RawRpcFailure {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RawRpcFailure::Transport { .. } | RawRpcFailure::Rpc { .. } => None,
            RawRpcFailure::Http { status, .. }
            | RawRpcFailure::EmptyBody { status }
            | RawRpcFailure::MalformedJson { status, .. } => Some(*status),
        }
    }
}

impl std::fmt::Display for RawRpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawRpcFailure::Transport { message } => write!(f, "transport: {}", message),
            RawRpcFailure::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            RawRpcFailure::EmptyBody { status } => write!(f, "HTTP {}: empty body", status),
            RawRpcFailure::MalformedJson { status, body } => {
                write!(f, "HTTP {}: malformed JSON: {}", status, body)
            }
            RawRpcFailure::Rpc { code, message, .. } => write!(f, "RPC error {}: {}", code, message),
        }
    }
}

impl From<RawRpcFailure> for RecoveryError {
    fn from(failure: RawRpcFailure) -> Self {
        match failure {
            RawRpcFailure::Transport { message } => RecoveryError::Transport(message),
            RawRpcFailure::Http { status, body } => RecoveryError::Http { status, body },
            RawRpcFailure::EmptyBody { status } => {
                RecoveryError::MalformedResponse(format!("empty body (HTTP {})", status))
            }
            RawRpcFailure::MalformedJson { body, .. } => RecoveryError::MalformedResponse(body),
            RawRpcFailure::Rpc { code, message, .. } => RecoveryError::Rpc { code, message },
        }
    }
}

/// Classifies one HTTP exchange. Pure so it can be tested without a server.
pub fn classify_response(status: u16, body: &str) -> std::result::Result<Value, RawRpcFailure> {
    if !(200..300).contains(&status) {
        return Err(RawRpcFailure::Http {
            status,
            body: body.to_string(),
        });
    }
    if body.trim().is_empty() {
        return Err(RawRpcFailure::EmptyBody { status });
    }
    let envelope: RpcResponse =
        serde_json::from_str(body).map_err(|_| RawRpcFailure::MalformedJson {
            status,
            body: body.to_string(),
        })?;
    if let Some(RpcErrorObject {
        code,
        message,
        data,
    }) = envelope.error
    {
        return Err(RawRpcFailure::Rpc {
            code,
            message,
            data,
        });
    }
    envelope.result.ok_or(RawRpcFailure::MalformedJson {
        status,
        body: body.to_string(),
    })
}

/// Result of the raw submission path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionResult {
    Accepted { deploy_hash: DeployHash },
    Rejected { failure: RawRpcFailure },
}

impl SubmissionResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionResult::Accepted { .. })
    }
}

pub struct RawRpcClient {
    url: String,
    client: Client,
    request_id: AtomicU64,
}

impl RawRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecoveryError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            client,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<Value, RawRpcFailure> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!("RPC -> {} (id {})", method, id);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RawRpcFailure::Transport {
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| RawRpcFailure::Transport {
            message: e.to_string(),
        })?;

        let result = classify_response(status, &body);
        if let Err(failure) = &result {
            debug!("RPC <- {} failed: {}", method, failure);
        }
        result
    }

    /// Submits without schema-checking the node's answer beyond finding a
    /// deploy hash in it.
    pub async fn submit_deploy(&self, deploy: &Deploy) -> SubmissionResult {
        let params = json!({ "deploy": deploy });
        match self.call("account_put_deploy", Some(params)).await {
            Ok(result) => match normalize::submitted_deploy_hash(&result) {
                Some(deploy_hash) => SubmissionResult::Accepted { deploy_hash },
                // Node accepted the call but did not echo a hash; ours is authoritative.
                None => {
                    warn!("Node accepted deploy without echoing its hash");
                    SubmissionResult::Accepted {
                        deploy_hash: deploy.hash,
                    }
                }
            },
            Err(failure) => {
                warn!("Raw submission of {} rejected: {}", deploy.hash, failure);
                SubmissionResult::Rejected { failure }
            }
        }
    }
}
