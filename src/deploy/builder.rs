use super::types::{Deploy, ExecutableDeployItem, TimeDiff, Timestamp};
use crate::clvalue::RuntimeArgs;
use crate::config::ChainConfig;
use crate::crypto::PublicKey;
use crate::error::{InvalidArgument, RecoveryError, Result};
use std::path::PathBuf;
use tracing::{debug, error};

/// Gas price is fixed; the ledger currently only accepts 1.
pub const GAS_PRICE: u64 = 1;

/// What a deploy's session executes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionTarget {
    /// Call an entry point on the installed registry contract.
    StoredContract {
        contract_hash: [u8; 32],
        entry_point: String,
    },
    /// Run the session module loaded from disk.
    ModuleBytes { path: PathBuf },
}

/// Accepts `hash-<hex>`, `contract-<hex>` or bare hex.
pub fn parse_contract_hash(input: &str) -> std::result::Result<[u8; 32], InvalidArgument> {
    let lower = input.trim().to_ascii_lowercase();
    let hex_part = lower
        .strip_prefix("hash-")
        .or_else(|| lower.strip_prefix("contract-"))
        .unwrap_or(&lower);
    hex::decode(hex_part)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
        .ok_or_else(|| InvalidArgument::InvalidContractHash(input.to_string()))
}

pub struct DeployBuilder {
    chain_name: String,
    ttl: TimeDiff,
}

impl DeployBuilder {
    pub fn new(chain_name: &str, ttl_ms: u64) -> Self {
        Self {
            chain_name: chain_name.to_string(),
            ttl: TimeDiff::from_millis(ttl_ms),
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(&config.chain_name, config.ttl_ms)
    }

    pub fn chain_name(&self) -> &str {
        &self.chain_name
    }

    /// Assemble an unsigned deploy. `timestamp` defaults to now; pass one to
    /// get a reproducible hash.
    pub fn build(
        &self,
        caller: &PublicKey,
        target: &SessionTarget,
        args: RuntimeArgs,
        payment: u64,
        timestamp: Option<Timestamp>,
    ) -> Result<Deploy> {
        let session = match target {
            SessionTarget::StoredContract {
                contract_hash,
                entry_point,
            } => ExecutableDeployItem::StoredContractByHash {
                hash: *contract_hash,
                entry_point: entry_point.clone(),
                args,
            },
            SessionTarget::ModuleBytes { path } => ExecutableDeployItem::ModuleBytes {
                module_bytes: load_module(path)?,
                args,
            },
        };

        let deploy = Deploy::new(
            caller.clone(),
            timestamp.unwrap_or_else(Timestamp::now),
            self.ttl,
            GAS_PRICE,
            self.chain_name.clone(),
            ExecutableDeployItem::standard_payment(payment),
            session,
        );
        debug!(
            "Built deploy {} for {} (payment {})",
            deploy.hash,
            caller.account_hash(),
            payment
        );
        Ok(deploy)
    }
}

/// A missing module is a deployment misconfiguration, not a transient
/// fault; it is never retried.
fn load_module(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        error!("Session module missing at {}: {}", path.display(), e);
        RecoveryError::FileNotFound {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clvalue::CLValue;
    use crate::crypto::KeyPair;
    use std::io::Write;

    fn args() -> RuntimeArgs {
        let mut args = RuntimeArgs::new();
        args.insert("id", CLValue::u256(1));
        args
    }

    #[test]
    fn test_stored_contract_deploy() {
        let kp = KeyPair::generate();
        let builder = DeployBuilder::new("casper-test", 1_800_000);
        let target = SessionTarget::StoredContract {
            contract_hash: [7; 32],
            entry_point: "approve".to_string(),
        };
        let deploy = builder
            .build(&kp.public_key(), &target, args(), 3_000_000_000, Some(Timestamp(1)))
            .unwrap();
        assert_eq!(deploy.header.gas_price, GAS_PRICE);
        assert_eq!(deploy.header.chain_name, "casper-test");
        assert_eq!(deploy.header.account, kp.public_key());
        match &deploy.session {
            ExecutableDeployItem::StoredContractByHash { entry_point, .. } => {
                assert_eq!(entry_point, "approve")
            }
            other => panic!("unexpected session {:?}", other),
        }
        deploy.validate().unwrap();
    }

    #[test]
    fn test_same_inputs_same_deploy() {
        let kp = KeyPair::generate();
        let builder = DeployBuilder::new("casper-test", 1_800_000);
        let target = SessionTarget::StoredContract {
            contract_hash: [7; 32],
            entry_point: "approve".to_string(),
        };
        let a = builder.build(&kp.public_key(), &target, args(), 1, Some(Timestamp(42))).unwrap();
        let b = builder.build(&kp.public_key(), &target, args(), 1, Some(Timestamp(42))).unwrap();
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[test]
    fn test_module_bytes_loaded_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x00, 0x61, 0x73, 0x6d]).unwrap();
        let kp = KeyPair::generate();
        let builder = DeployBuilder::new("casper-test", 1_800_000);
        let target = SessionTarget::ModuleBytes {
            path: file.path().to_path_buf(),
        };
        let deploy = builder.build(&kp.public_key(), &target, args(), 1, None).unwrap();
        match deploy.session {
            ExecutableDeployItem::ModuleBytes { module_bytes, .. } => {
                assert_eq!(module_bytes, vec![0x00, 0x61, 0x73, 0x6d])
            }
            other => panic!("unexpected session {:?}", other),
        }
    }

    #[test]
    fn test_missing_module_is_file_not_found() {
        let kp = KeyPair::generate();
        let builder = DeployBuilder::new("casper-test", 1_800_000);
        let target = SessionTarget::ModuleBytes {
            path: PathBuf::from("/nonexistent/recovery_session.wasm"),
        };
        let err = builder.build(&kp.public_key(), &target, args(), 1, None).unwrap_err();
        assert!(matches!(err, RecoveryError::FileNotFound { .. }));
    }

    #[test]
    fn test_parse_contract_hash_forms() {
        let hex = "ab".repeat(32);
        assert_eq!(parse_contract_hash(&hex).unwrap(), [0xab; 32]);
        assert_eq!(parse_contract_hash(&format!("hash-{}", hex)).unwrap(), [0xab; 32]);
        assert_eq!(parse_contract_hash(&format!("contract-{}", hex)).unwrap(), [0xab; 32]);
        assert!(parse_contract_hash("hash-1234").is_err());
    }
}
