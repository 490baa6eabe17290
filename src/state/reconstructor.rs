use super::interpret;
use super::keys::{self, RecoveryField};
use super::types::{GuardianApproval, GuardianSet, RecoveryRequest};
use crate::client::LedgerGateway;
use crate::clvalue::CLValue;
use crate::config::{RecoveryConfig, StorageLayoutKind};
use crate::crypto::{parse_account, AccountHash};
use crate::deploy::parse_contract_hash;
use crate::error::{RecoveryError, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where protocol state is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateSource {
    /// Dictionary owned by the registry contract.
    ContractDictionary {
        contract_hash: String,
        dictionary_name: String,
    },
    /// `grp_*` named keys on one account.
    AccountNamedKeys { registry_account: AccountHash },
}

/// Rebuilds guardian and recovery facts from raw ledger reads.
///
/// Nothing here returns an error to the caller once constructed: a read that
/// fails, is missing or cannot be interpreted yields the empty default and a
/// log line.
pub struct StateReconstructor {
    gateway: Arc<dyn LedgerGateway>,
    source: StateSource,
}

impl StateReconstructor {
    pub fn new(gateway: Arc<dyn LedgerGateway>, source: StateSource) -> Self {
        Self { gateway, source }
    }

    pub fn from_config(gateway: Arc<dyn LedgerGateway>, config: &RecoveryConfig) -> Result<Self> {
        let source = match config.storage.layout {
            StorageLayoutKind::ContractDictionary => {
                let raw = config.artifacts.contract_hash.as_deref().ok_or_else(|| {
                    RecoveryError::Config(
                        "artifacts.contract_hash is required to read the contract dictionary"
                            .to_string(),
                    )
                })?;
                StateSource::ContractDictionary {
                    contract_hash: format!("hash-{}", hex::encode(parse_contract_hash(raw)?)),
                    dictionary_name: config.artifacts.dictionary_name.clone(),
                }
            }
            StorageLayoutKind::AccountNamedKeys => {
                let raw = config.storage.registry_account.as_deref().ok_or_else(|| {
                    RecoveryError::Config("storage.registry_account is not set".to_string())
                })?;
                StateSource::AccountNamedKeys {
                    registry_account: parse_account(raw)?,
                }
            }
        };
        Ok(Self::new(gateway, source))
    }

    pub fn source(&self) -> &StateSource {
        &self.source
    }

    async fn state_root(&self) -> Option<String> {
        match self.gateway.state_root_hash().await {
            Ok(root) => Some(root),
            Err(e) => {
                warn!("Could not fetch state root: {}", e);
                None
            }
        }
    }

    /// Raw read of one entry; `key` is already layout-specific.
    async fn read(&self, root: &str, key: &str) -> Option<CLValue> {
        let result = match &self.source {
            StateSource::ContractDictionary {
                contract_hash,
                dictionary_name,
            } => {
                self.gateway
                    .get_dictionary_item(root, contract_hash, dictionary_name, key)
                    .await
            }
            StateSource::AccountNamedKeys { registry_account } => {
                self.gateway
                    .query_global_state(
                        root,
                        &registry_account.to_formatted_string(),
                        &[key.to_string()],
                    )
                    .await
            }
        };
        match result {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                debug!("No value stored under {}", key);
                None
            }
            Err(e) => {
                warn!("Read of {} failed: {}", key, e);
                None
            }
        }
    }

    async fn read_as<T>(
        &self,
        root: &str,
        key: &str,
        reading: impl Fn(&CLValue) -> Option<T>,
    ) -> Option<T> {
        let value = self.read(root, key).await?;
        let typed = reading(&value);
        if typed.is_none() {
            warn!("Value under {} has unexpected shape ({:?})", key, value.cl_type);
        }
        typed
    }

    fn initialized_key(&self, account: &AccountHash) -> String {
        match self.source {
            StateSource::ContractDictionary { .. } => keys::dictionary::initialized(account),
            StateSource::AccountNamedKeys { .. } => keys::named::initialized(account),
        }
    }

    fn guardians_key(&self, account: &AccountHash) -> String {
        match self.source {
            StateSource::ContractDictionary { .. } => keys::dictionary::guardians(account),
            StateSource::AccountNamedKeys { .. } => keys::named::guardians(account),
        }
    }

    fn threshold_key(&self, account: &AccountHash) -> String {
        match self.source {
            StateSource::ContractDictionary { .. } => keys::dictionary::threshold(account),
            StateSource::AccountNamedKeys { .. } => keys::named::threshold(account),
        }
    }

    fn active_key(&self, account: &AccountHash) -> String {
        match self.source {
            StateSource::ContractDictionary { .. } => keys::dictionary::active_recovery(account),
            StateSource::AccountNamedKeys { .. } => keys::named::active_recovery(account),
        }
    }

    fn recovery_key(&self, id: u64, field: RecoveryField) -> String {
        match self.source {
            StateSource::ContractDictionary { .. } => keys::dictionary::recovery(id, field),
            StateSource::AccountNamedKeys { .. } => keys::named::recovery(id, field),
        }
    }

    fn approval_key(&self, id: u64, guardian: &AccountHash) -> String {
        match self.source {
            StateSource::ContractDictionary { .. } => keys::dictionary::approval(id, guardian),
            StateSource::AccountNamedKeys { .. } => keys::named::approval(id, guardian),
        }
    }

    /// The named-key layout keeps no per-guardian index.
    fn guardian_index_key(&self, guardian: &AccountHash) -> Option<String> {
        match self.source {
            StateSource::ContractDictionary { .. } => {
                Some(keys::dictionary::guardian_index(guardian))
            }
            StateSource::AccountNamedKeys { .. } => None,
        }
    }

    async fn has_guardians_at(&self, root: &str, account: &AccountHash) -> bool {
        self.read_as(root, &self.initialized_key(account), interpret::as_bool)
            .await
            .unwrap_or(false)
    }

    async fn guardians_at(&self, root: &str, account: &AccountHash) -> Vec<AccountHash> {
        self.read_as(root, &self.guardians_key(account), interpret::as_account_hash_list)
            .await
            .unwrap_or_default()
    }

    async fn threshold_at(&self, root: &str, account: &AccountHash) -> u8 {
        self.read_as(root, &self.threshold_key(account), interpret::as_u8)
            .await
            .unwrap_or(0)
    }

    pub async fn has_guardians(&self, account: &AccountHash) -> bool {
        match self.state_root().await {
            Some(root) => self.has_guardians_at(&root, account).await,
            None => false,
        }
    }

    pub async fn get_guardians(&self, account: &AccountHash) -> Vec<AccountHash> {
        match self.state_root().await {
            Some(root) => self.guardians_at(&root, account).await,
            None => Vec::new(),
        }
    }

    pub async fn get_threshold(&self, account: &AccountHash) -> u8 {
        match self.state_root().await {
            Some(root) => self.threshold_at(&root, account).await,
            None => 0,
        }
    }

    /// Guardians and threshold read at one state root. `None` when the
    /// account has no registration or the stored pair violates
    /// `2 <= threshold <= guardians`.
    pub async fn get_guardian_set(&self, account: &AccountHash) -> Option<GuardianSet> {
        let root = self.state_root().await?;
        let (guardians, threshold) = tokio::join!(
            self.guardians_at(&root, account),
            self.threshold_at(&root, account)
        );
        if guardians.is_empty() {
            return None;
        }
        let count = guardians.len();
        let set = GuardianSet::new(*account, guardians, threshold);
        if set.is_none() {
            warn!(
                "Stored guardian set for {} is inconsistent: threshold {} with {} guardians",
                account, threshold, count
            );
        }
        set
    }

    /// Id of the account's open recovery, if the registry recorded one.
    pub async fn get_active_recovery(&self, account: &AccountHash) -> Option<u64> {
        let root = self.state_root().await?;
        self.read_as(&root, &self.active_key(account), interpret::as_u64)
            .await
    }

    pub async fn get_recovery_by_id(&self, id: u64) -> Option<RecoveryRequest> {
        let root = self.state_root().await?;
        self.recovery_at(&root, id).await
    }

    async fn recovery_at(&self, root: &str, id: u64) -> Option<RecoveryRequest> {
        let account_key = self.recovery_key(id, RecoveryField::Account);
        let new_key_key = self.recovery_key(id, RecoveryField::NewKey);
        let count_key = self.recovery_key(id, RecoveryField::ApprovalCount);
        let approved_key = self.recovery_key(id, RecoveryField::Approved);
        let finalized_key = self.recovery_key(id, RecoveryField::Finalized);
        let (account, new_key, count, approved, finalized) = tokio::join!(
            self.read_as(root, &account_key, interpret::as_account_hash),
            self.read_as(root, &new_key_key, interpret::as_public_key),
            self.read_as(root, &count_key, interpret::as_u8),
            self.read_as(root, &approved_key, interpret::as_bool),
            self.read_as(root, &finalized_key, interpret::as_bool),
        );
        // Without a target account there is no such recovery.
        let account = account?;

        let (guardians, threshold) = tokio::join!(
            self.guardians_at(root, &account),
            self.threshold_at(root, &account)
        );
        let flags = join_all(guardians.iter().map(|guardian| {
            let key = self.approval_key(id, guardian);
            async move { self.read_as(root, &key, interpret::as_bool).await.unwrap_or(false) }
        }))
        .await;
        let approvals: Vec<GuardianApproval> = guardians
            .iter()
            .zip(flags)
            .map(|(guardian, approved)| GuardianApproval {
                guardian: *guardian,
                approved,
            })
            .collect();

        let mut approval_count = count.unwrap_or(0);
        if approval_count as usize > guardians.len() {
            warn!(
                "Recovery {} reports {} approvals for {} guardians",
                id,
                approval_count,
                guardians.len()
            );
            approval_count = guardians.len() as u8;
        }

        Some(RecoveryRequest {
            id,
            account,
            new_key,
            approval_count,
            approvals,
            threshold,
            is_approved: approved.unwrap_or(false),
            is_finalized: finalized.unwrap_or(false),
        })
    }

    /// Unfinalized recoveries the guardian is asked to approve.
    pub async fn get_recoveries_for_guardian(&self, guardian: &AccountHash) -> Vec<RecoveryRequest> {
        let Some(index_key) = self.guardian_index_key(guardian) else {
            debug!("Storage layout has no guardian index");
            return Vec::new();
        };
        let Some(root) = self.state_root().await else {
            return Vec::new();
        };
        let ids = self
            .read_as(&root, &index_key, interpret::as_u64_list)
            .await
            .unwrap_or_default();
        let root = root.as_str();
        join_all(ids.into_iter().map(|id| self.recovery_at(root, id)))
            .await
            .into_iter()
            .flatten()
            .filter(|request| request.is_pending())
            .collect()
    }
}
