use crate::error::{RecoveryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecoveryConfig {
    pub node: NodeConfig,
    pub chain: ChainConfig,
    pub payments: PaymentConfig,
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    pub rpc_url: String,
    pub log_level: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    pub chain_name: String,
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

fn default_ttl_ms() -> u64 {
    30 * 60 * 1000
}

/// Default payment amounts in motes.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PaymentConfig {
    pub contract_call: u64,
    pub module_execution: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            contract_call: 3_000_000_000,
            module_execution: 15_000_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArtifactConfig {
    /// Session module sharing one entry point across all actions.
    pub session_wasm: String,
    /// Installed registry contract; when set, actions that have an entry
    /// point call it instead of running the session module.
    #[serde(default)]
    pub contract_hash: Option<String>,
    #[serde(default = "default_dictionary")]
    pub dictionary_name: String,
}

fn default_dictionary() -> String {
    "d".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageLayoutKind {
    #[default]
    ContractDictionary,
    AccountNamedKeys,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub layout: StorageLayoutKind,
    /// Account whose named keys hold `grp_*` entries (named-key layout only).
    #[serde(default)]
    pub registry_account: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct TrackerConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            timeout_secs: 300,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                rpc_url: "http://127.0.0.1:11101/rpc".to_string(),
                log_level: "info".to_string(),
                request_timeout_secs: default_request_timeout(),
            },
            chain: ChainConfig {
                chain_name: "casper-test".to_string(),
                ttl_ms: default_ttl_ms(),
            },
            payments: PaymentConfig::default(),
            artifacts: ArtifactConfig {
                session_wasm: "wasm/recovery_session.wasm".to_string(),
                contract_hash: None,
                dictionary_name: default_dictionary(),
            },
            storage: StorageConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl RecoveryConfig {
    /// Reads `path`, or writes the defaults there when the file is missing.
    /// An unreadable or unparsable file is an error rather than a silent
    /// fallback, as is failing to write the default file.
    pub fn load_or_default(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            let config = Self::default();
            config.write_to(path)?;
            return Ok(config);
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            RecoveryError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&text)
            .map_err(|e| RecoveryError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| RecoveryError::Serialization(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| {
            RecoveryError::Config(format!("cannot write default config to {}: {}", path.display(), e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.rpc_url.trim().is_empty() {
            return Err(RecoveryError::Config("node.rpc_url is empty".to_string()));
        }
        if self.chain.chain_name.trim().is_empty() {
            return Err(RecoveryError::Config("chain.chain_name is empty".to_string()));
        }
        if self.chain.ttl_ms == 0 {
            return Err(RecoveryError::Config("chain.ttl_ms must be positive".to_string()));
        }
        if self.tracker.poll_interval_ms == 0 {
            return Err(RecoveryError::Config(
                "tracker.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.storage.layout == StorageLayoutKind::AccountNamedKeys
            && self.storage.registry_account.is_none()
        {
            return Err(RecoveryError::Config(
                "storage.registry_account is required for the account_named_keys layout"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
