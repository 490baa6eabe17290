// In-memory ledger. Stands in for a node in tests and offline dry runs:
// storage is seeded directly, submitted deploys are recorded and their
// outcomes set by hand.
use super::types::{AccountInfo, DeployRecord, ExecutionOutcome};
use super::LedgerGateway;
use crate::clvalue::CLValue;
use crate::deploy::{Deploy, DeployHash};
use crate::error::{RecoveryError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct LedgerState {
    /// (contract hash, dictionary name, item key) -> value
    dictionary: HashMap<(String, String, String), CLValue>,
    /// (base key, path joined by '/') -> value
    global: HashMap<(String, String), CLValue>,
    accounts: HashMap<String, AccountInfo>,
    deploys: HashMap<DeployHash, DeployRecord>,
    submitted: Vec<Deploy>,
    state_root: String,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    offline: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        let ledger = Self::default();
        ledger.set_state_root(&"00".repeat(32));
        ledger
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RecoveryError::Transport("ledger unreachable".to_string()));
        }
        Ok(())
    }

    /// Every call fails with a transport error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_state_root(&self, root: &str) {
        self.lock().state_root = root.to_string();
    }

    pub fn put_dictionary_item(
        &self,
        contract_hash: &str,
        dictionary_name: &str,
        item_key: &str,
        value: CLValue,
    ) {
        self.lock().dictionary.insert(
            (
                contract_hash.to_string(),
                dictionary_name.to_string(),
                item_key.to_string(),
            ),
            value,
        );
    }

    pub fn put_global(&self, key: &str, path: &[String], value: CLValue) {
        self.lock()
            .global
            .insert((key.to_string(), path.join("/")), value);
    }

    pub fn put_account(&self, identifier: &str, info: AccountInfo) {
        self.lock().accounts.insert(identifier.to_string(), info);
    }

    pub fn set_outcome(&self, deploy_hash: DeployHash, outcome: ExecutionOutcome) {
        let block_hash = outcome.is_terminal().then(|| "11".repeat(32));
        self.lock().deploys.insert(
            deploy_hash,
            DeployRecord {
                deploy_hash,
                outcome,
                block_hash,
            },
        );
    }

    pub fn submitted(&self) -> Vec<Deploy> {
        self.lock().submitted.clone()
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn state_root_hash(&self) -> Result<String> {
        self.check_online()?;
        Ok(self.lock().state_root.clone())
    }

    async fn query_global_state(
        &self,
        _state_root_hash: &str,
        key: &str,
        path: &[String],
    ) -> Result<Option<CLValue>> {
        self.check_online()?;
        Ok(self
            .lock()
            .global
            .get(&(key.to_string(), path.join("/")))
            .cloned())
    }

    async fn get_dictionary_item(
        &self,
        _state_root_hash: &str,
        contract_hash: &str,
        dictionary_name: &str,
        item_key: &str,
    ) -> Result<Option<CLValue>> {
        self.check_online()?;
        Ok(self
            .lock()
            .dictionary
            .get(&(
                contract_hash.to_string(),
                dictionary_name.to_string(),
                item_key.to_string(),
            ))
            .cloned())
    }

    async fn get_account(&self, account_identifier: &str) -> Result<Option<AccountInfo>> {
        self.check_online()?;
        Ok(self.lock().accounts.get(account_identifier).cloned())
    }

    async fn put_deploy(&self, deploy: &Deploy) -> Result<DeployHash> {
        self.check_online()?;
        deploy.validate()?;
        let mut state = self.lock();
        state.submitted.push(deploy.clone());
        state
            .deploys
            .entry(deploy.hash)
            .or_insert_with(|| DeployRecord::pending(deploy.hash));
        Ok(deploy.hash)
    }

    async fn get_deploy(&self, deploy_hash: &DeployHash) -> Result<DeployRecord> {
        self.check_online()?;
        Ok(self
            .lock()
            .deploys
            .get(deploy_hash)
            .cloned()
            .unwrap_or_else(|| DeployRecord::pending(*deploy_hash)))
    }
}
