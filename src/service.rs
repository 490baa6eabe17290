//! Request boundary: one method per protocol action.
//!
//! Write actions return an unsigned deploy for the external signer plus,
//! for actions guardians care about, a notice an outside collaborator can
//! use to alert them. Read actions return reconstructed state.

use crate::actions::{ActionEncoder, ActionKind, EncodedAction, RecoveryAction, TargetKind};
use crate::client::{AccountInfo, DeployRecord, LedgerGateway, RawRpcClient, SubmissionResult};
use crate::config::RecoveryConfig;
use crate::crypto::{parse_account, AccountHash, PublicKey};
use crate::deploy::{parse_contract_hash, Deploy, DeployBuilder, DeployHash, SessionTarget, Timestamp};
use crate::error::{RecoveryError, Result};
use crate::state::{GuardianSet, RecoveryRequest, StateReconstructor};
use crate::tracker::{DeployTracker, TrackOutcome};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a guardian notifier needs; this crate never sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianNotice {
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_account: Option<AccountHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_key: Option<PublicKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_id: Option<u64>,
    pub guardians: Vec<AccountHash>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedDeploy {
    pub action: ActionKind,
    pub deploy: Deploy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<GuardianNotice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianStatus {
    pub account: AccountHash,
    pub has_guardians: bool,
    pub guardians: Vec<AccountHash>,
    pub threshold: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_recovery: Option<u64>,
}

pub struct RecoveryService {
    gateway: Arc<dyn LedgerGateway>,
    encoder: ActionEncoder,
    builder: DeployBuilder,
    reconstructor: Option<StateReconstructor>,
    tracker: DeployTracker,
    contract_hash: Option<[u8; 32]>,
    session_wasm: PathBuf,
    raw: Option<Arc<RawRpcClient>>,
}

impl RecoveryService {
    /// State reads are only available once a storage source is configured;
    /// deploy preparation works without one.
    pub fn from_config(config: &RecoveryConfig, gateway: Arc<dyn LedgerGateway>) -> Result<Self> {
        config.validate()?;
        let contract_hash = config
            .artifacts
            .contract_hash
            .as_deref()
            .map(parse_contract_hash)
            .transpose()?;
        let reconstructor = match StateReconstructor::from_config(gateway.clone(), config) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("State reads disabled: {}", e);
                None
            }
        };
        Ok(Self {
            encoder: ActionEncoder::new(config.payments),
            builder: DeployBuilder::from_config(&config.chain),
            reconstructor,
            tracker: DeployTracker::from_config(gateway.clone(), &config.tracker),
            contract_hash,
            session_wasm: PathBuf::from(&config.artifacts.session_wasm),
            raw: None,
            gateway,
        })
    }

    /// Enables [`RecoveryService::submit_raw`].
    pub fn with_raw_client(mut self, raw: Arc<RawRpcClient>) -> Self {
        self.raw = Some(raw);
        self
    }

    fn state(&self) -> Result<&StateReconstructor> {
        self.reconstructor.as_ref().ok_or_else(|| {
            RecoveryError::Config("no storage source configured for state reads".to_string())
        })
    }

    /// Stored contract when one is configured and exposes the action;
    /// the session module otherwise.
    fn session_for(&self, encoded: &EncodedAction) -> (SessionTarget, TargetKind) {
        match (self.contract_hash, encoded.kind.entry_point()) {
            (Some(contract_hash), Some(entry_point)) => (
                SessionTarget::StoredContract {
                    contract_hash,
                    entry_point: entry_point.to_string(),
                },
                TargetKind::ContractCall,
            ),
            _ => (
                SessionTarget::ModuleBytes {
                    path: self.session_wasm.clone(),
                },
                TargetKind::ModuleExecution,
            ),
        }
    }

    /// Encode and build any action. `caller` is the signer's public key hex.
    pub async fn prepare(
        &self,
        caller: &str,
        action: &RecoveryAction,
        timestamp: Option<Timestamp>,
    ) -> Result<PreparedDeploy> {
        let caller = PublicKey::from_hex(caller)?;
        let encoded = self.encoder.encode(&caller, action)?;
        let (target, target_kind) = self.session_for(&encoded);
        let args = match target_kind {
            TargetKind::ContractCall => encoded.contract_args(),
            TargetKind::ModuleExecution => encoded.module_args(),
        };
        let deploy = self.builder.build(
            &caller,
            &target,
            args,
            encoded.payment(target_kind),
            timestamp,
        )?;
        info!("Prepared {} deploy {}", encoded.kind, deploy.hash);

        let notice = if encoded.kind.notifies_guardians() {
            Some(self.notice_for(&encoded).await)
        } else {
            None
        };
        Ok(PreparedDeploy {
            action: encoded.kind,
            deploy,
            notice,
        })
    }

    /// Fills in what encoding alone does not know (the guardians of an
    /// existing recovery) from ledger state, best effort.
    async fn notice_for(&self, encoded: &EncodedAction) -> GuardianNotice {
        let mut notice = GuardianNotice {
            action: encoded.kind,
            target_account: encoded.target_account,
            new_key: encoded.new_key.clone(),
            recovery_id: encoded.recovery_id,
            guardians: encoded.guardians.clone(),
        };
        let Some(state) = self.reconstructor.as_ref() else {
            return notice;
        };
        if let Some(id) = encoded.recovery_id {
            if let Some(request) = state.get_recovery_by_id(id).await {
                notice.target_account = Some(request.account);
                notice.new_key = notice.new_key.or(request.new_key);
                notice.guardians = request.approvals.iter().map(|a| a.guardian).collect();
            }
        } else if notice.guardians.is_empty() {
            if let Some(account) = encoded.target_account {
                notice.guardians = state.get_guardians(&account).await;
            }
        }
        notice
    }

    pub async fn register_guardians(
        &self,
        caller: &str,
        guardians: Vec<String>,
        threshold: u8,
    ) -> Result<PreparedDeploy> {
        let action = RecoveryAction::RegisterGuardians {
            guardians,
            threshold,
        };
        self.prepare(caller, &action, None).await
    }

    pub async fn initiate_recovery(
        &self,
        caller: &str,
        account: &str,
        new_key: &str,
    ) -> Result<PreparedDeploy> {
        let action = RecoveryAction::InitiateRecovery {
            account: account.to_string(),
            new_key: new_key.to_string(),
        };
        self.prepare(caller, &action, None).await
    }

    pub async fn approve_recovery(&self, caller: &str, recovery_id: u64) -> Result<PreparedDeploy> {
        self.prepare(caller, &RecoveryAction::ApproveRecovery { recovery_id }, None)
            .await
    }

    pub async fn check_threshold(&self, caller: &str, recovery_id: u64) -> Result<PreparedDeploy> {
        self.prepare(caller, &RecoveryAction::CheckThreshold { recovery_id }, None)
            .await
    }

    pub async fn finalize_recovery(&self, caller: &str, recovery_id: u64) -> Result<PreparedDeploy> {
        self.prepare(caller, &RecoveryAction::FinalizeRecovery { recovery_id }, None)
            .await
    }

    pub async fn rotate_add_key(
        &self,
        caller: &str,
        new_key: &str,
        weight: u8,
    ) -> Result<PreparedDeploy> {
        let action = RecoveryAction::RotateAddKey {
            new_key: new_key.to_string(),
            weight,
        };
        self.prepare(caller, &action, None).await
    }

    pub async fn rotate_remove_key(&self, caller: &str, key: &str) -> Result<PreparedDeploy> {
        let action = RecoveryAction::RotateRemoveKey {
            key: key.to_string(),
        };
        self.prepare(caller, &action, None).await
    }

    pub async fn update_thresholds(
        &self,
        caller: &str,
        deployment: u8,
        key_management: u8,
    ) -> Result<PreparedDeploy> {
        let action = RecoveryAction::UpdateThresholds {
            deployment,
            key_management,
        };
        self.prepare(caller, &action, None).await
    }

    // Reads. Only a bad identifier or missing storage config is an error;
    // ledger trouble degrades to defaults inside the reconstructor.

    pub async fn has_guardians(&self, account: &str) -> Result<bool> {
        let account = parse_account(account)?;
        Ok(self.state()?.has_guardians(&account).await)
    }

    pub async fn get_guardians(&self, account: &str) -> Result<Vec<AccountHash>> {
        let account = parse_account(account)?;
        Ok(self.state()?.get_guardians(&account).await)
    }

    pub async fn get_threshold(&self, account: &str) -> Result<u8> {
        let account = parse_account(account)?;
        Ok(self.state()?.get_threshold(&account).await)
    }

    pub async fn get_guardian_set(&self, account: &str) -> Result<Option<GuardianSet>> {
        let account = parse_account(account)?;
        Ok(self.state()?.get_guardian_set(&account).await)
    }

    pub async fn guardian_status(&self, account: &str) -> Result<GuardianStatus> {
        let account = parse_account(account)?;
        let state = self.state()?;
        let (has_guardians, set, active_recovery) = tokio::join!(
            state.has_guardians(&account),
            state.get_guardian_set(&account),
            state.get_active_recovery(&account)
        );
        let (guardians, threshold) = set
            .map(|s| (s.guardians, s.threshold))
            .unwrap_or_default();
        Ok(GuardianStatus {
            account,
            has_guardians,
            guardians,
            threshold,
            active_recovery,
        })
    }

    pub async fn get_recovery(&self, recovery_id: u64) -> Result<Option<RecoveryRequest>> {
        Ok(self.state()?.get_recovery_by_id(recovery_id).await)
    }

    pub async fn get_recoveries_for_guardian(&self, guardian: &str) -> Result<Vec<RecoveryRequest>> {
        let guardian = parse_account(guardian)?;
        Ok(self.state()?.get_recoveries_for_guardian(&guardian).await)
    }

    /// Associated keys and action thresholds, as used by key rotation.
    pub async fn account_info(&self, account: &str) -> Result<Option<AccountInfo>> {
        let identifier = match PublicKey::from_hex(account) {
            Ok(key) => key.to_hex(),
            Err(_) => parse_account(account)?.to_formatted_string(),
        };
        self.gateway.get_account(&identifier).await
    }

    // Submission and tracking.

    /// Checks a signed deploy against the hash it was prepared with, then
    /// submits it through the typed client.
    pub async fn submit(&self, deploy: &Deploy, expected: Option<&DeployHash>) -> Result<DeployHash> {
        check_signed(deploy, expected)?;
        self.gateway.put_deploy(deploy).await
    }

    /// Same checks, but submits through the raw path and reports failures
    /// as data.
    pub async fn submit_raw(
        &self,
        deploy: &Deploy,
        expected: Option<&DeployHash>,
    ) -> Result<SubmissionResult> {
        check_signed(deploy, expected)?;
        let raw = self
            .raw
            .as_ref()
            .ok_or_else(|| RecoveryError::Config("raw RPC client not configured".to_string()))?;
        Ok(raw.submit_deploy(deploy).await)
    }

    pub async fn status(&self, deploy_hash: &DeployHash) -> Result<DeployRecord> {
        self.tracker.status(deploy_hash).await
    }

    pub async fn wait(&self, deploy_hash: &DeployHash) -> TrackOutcome {
        self.tracker.wait(deploy_hash).await
    }

    pub async fn wait_with_timeout(&self, deploy_hash: &DeployHash, timeout: Duration) -> TrackOutcome {
        self.tracker.wait_with_timeout(deploy_hash, timeout).await
    }
}

fn check_signed(deploy: &Deploy, expected: Option<&DeployHash>) -> Result<()> {
    match expected {
        Some(hash) => deploy.ensure_unchanged(hash)?,
        None => deploy.validate()?,
    }
    if !deploy.is_signed() {
        return Err(RecoveryError::InvalidApproval(
            "deploy carries no approvals".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryLedger;
    use crate::clvalue::CLValue;
    use crate::crypto::KeyPair;
    use crate::deploy::ExecutableDeployItem;
    use crate::state::keys;

    const CONTRACT: &str = "0202020202020202020202020202020202020202020202020202020202020202";

    fn service_with(ledger: Arc<MemoryLedger>, contract: bool) -> RecoveryService {
        let mut config = RecoveryConfig::default();
        if contract {
            config.artifacts.contract_hash = Some(format!("hash-{}", CONTRACT));
        }
        RecoveryService::from_config(&config, ledger).unwrap()
    }

    fn key_hex() -> String {
        KeyPair::generate().public_key().to_hex()
    }

    #[tokio::test]
    async fn test_register_targets_contract_with_notice() {
        let service = service_with(Arc::new(MemoryLedger::new()), true);
        let owner = key_hex();
        let guardians = vec![key_hex(), key_hex(), key_hex()];
        let prepared = service
            .register_guardians(&owner, guardians.clone(), 2)
            .await
            .unwrap();

        assert_eq!(prepared.action, ActionKind::RegisterGuardians);
        match &prepared.deploy.session {
            ExecutableDeployItem::StoredContractByHash {
                entry_point, args, ..
            } => {
                assert_eq!(entry_point, "init_guardians");
                assert!(args.get("action").is_none());
            }
            other => panic!("unexpected session {:?}", other),
        }
        assert_eq!(
            prepared.deploy.payment.args().get("amount"),
            Some(&CLValue::u512(3_000_000_000))
        );
        let notice = prepared.notice.unwrap();
        assert_eq!(notice.guardians.len(), 3);
        assert_eq!(
            notice.target_account,
            Some(PublicKey::from_hex(&owner).unwrap().account_hash())
        );
    }

    #[tokio::test]
    async fn test_key_rotation_uses_session_module() {
        let dir = tempfile::tempdir().unwrap();
        let wasm = dir.path().join("session.wasm");
        std::fs::write(&wasm, b"\0asm\x01\0\0\0").unwrap();
        let mut config = RecoveryConfig::default();
        config.artifacts.contract_hash = Some(CONTRACT.to_string());
        config.artifacts.session_wasm = wasm.display().to_string();
        let service = RecoveryService::from_config(&config, Arc::new(MemoryLedger::new())).unwrap();

        let prepared = service.rotate_add_key(&key_hex(), &key_hex(), 1).await.unwrap();
        assert!(prepared.notice.is_none());
        match &prepared.deploy.session {
            ExecutableDeployItem::ModuleBytes { module_bytes, args } => {
                assert_eq!(module_bytes.len(), 8);
                assert_eq!(args.get("action"), Some(&CLValue::u8(9)));
            }
            other => panic!("unexpected session {:?}", other),
        }
        assert_eq!(
            prepared.deploy.payment.args().get("amount"),
            Some(&CLValue::u512(15_000_000_000))
        );
    }

    #[tokio::test]
    async fn test_missing_module_is_file_not_found() {
        let service = service_with(Arc::new(MemoryLedger::new()), false);
        let err = service
            .update_thresholds(&key_hex(), 1, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_approve_notice_reads_recovery() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = AccountHash([0xaa; 32]);
        let guardians = vec![AccountHash([1; 32]), AccountHash([2; 32])];
        let contract = format!("hash-{}", CONTRACT);
        ledger.put_dictionary_item(&contract, "d", "ra3", CLValue::account_hash(&owner));
        ledger.put_dictionary_item(
            &contract,
            "d",
            &keys::dictionary::guardians(&owner),
            CLValue::account_hash_list(&guardians),
        );
        let service = service_with(ledger, true);

        let prepared = service.approve_recovery(&key_hex(), 3).await.unwrap();
        let notice = prepared.notice.unwrap();
        assert_eq!(notice.recovery_id, Some(3));
        assert_eq!(notice.target_account, Some(owner));
        assert_eq!(notice.guardians, guardians);
    }

    #[tokio::test]
    async fn test_reads_without_storage_source_are_config_errors() {
        let service = service_with(Arc::new(MemoryLedger::new()), false);
        let err = service.has_guardians(&"ab".repeat(32)).await.unwrap_err();
        assert!(matches!(err, RecoveryError::Config(_)));
    }

    #[tokio::test]
    async fn test_submit_rejects_unsigned_and_tampered() {
        let ledger = Arc::new(MemoryLedger::new());
        let service = service_with(ledger.clone(), true);
        let signer = KeyPair::generate();
        let prepared = service
            .check_threshold(&signer.public_key().to_hex(), 1)
            .await
            .unwrap();
        let original = prepared.deploy.hash;

        let unsigned = prepared.deploy.clone();
        assert!(matches!(
            service.submit(&unsigned, Some(&original)).await,
            Err(RecoveryError::InvalidApproval(_))
        ));

        let mut tampered = prepared.deploy.clone();
        tampered.header.chain_name = "other".to_string();
        tampered.sign(&signer);
        assert!(matches!(
            service.submit(&tampered, Some(&original)).await,
            Err(RecoveryError::HashMismatch(..))
        ));

        let mut signed = prepared.deploy;
        signed.sign(&signer);
        assert_eq!(service.submit(&signed, Some(&original)).await.unwrap(), original);
        assert_eq!(ledger.submitted().len(), 1);
        assert!(!service.status(&original).await.unwrap().outcome.is_terminal());
    }

    #[tokio::test]
    async fn test_raw_submit_needs_client() {
        let service = service_with(Arc::new(MemoryLedger::new()), true);
        let signer = KeyPair::generate();
        let mut deploy = service
            .check_threshold(&signer.public_key().to_hex(), 1)
            .await
            .unwrap()
            .deploy;
        deploy.sign(&signer);
        assert!(matches!(
            service.submit_raw(&deploy, None).await,
            Err(RecoveryError::Config(_))
        ));
    }
}
