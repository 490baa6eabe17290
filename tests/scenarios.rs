// End-to-end protocol flows against the in-memory ledger. Storage writes
// the registry contract would make are seeded by hand.
use guardian_recovery::actions::ActionKind;
use guardian_recovery::client::{ExecutionOutcome, MemoryLedger};
use guardian_recovery::clvalue::CLValue;
use guardian_recovery::config::RecoveryConfig;
use guardian_recovery::crypto::{AccountHash, KeyPair, PublicKey};
use guardian_recovery::deploy::{Deploy, ExecutableDeployItem};
use guardian_recovery::error::{InvalidArgument, RecoveryError};
use guardian_recovery::service::RecoveryService;
use guardian_recovery::state::keys;
use guardian_recovery::tracker::TrackOutcome;
use std::sync::Arc;

const CONTRACT: &str = "hash-0404040404040404040404040404040404040404040404040404040404040404";

struct Harness {
    ledger: Arc<MemoryLedger>,
    service: RecoveryService,
    _dir: tempfile::TempDir,
}

fn harness(with_contract: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let wasm = dir.path().join("recovery_session.wasm");
    std::fs::write(&wasm, b"\0asm\x01\0\0\0session").unwrap();

    let mut config = RecoveryConfig::default();
    config.artifacts.session_wasm = wasm.display().to_string();
    if with_contract {
        config.artifacts.contract_hash = Some(CONTRACT.to_string());
    }
    config.tracker.poll_interval_ms = 10;
    config.tracker.timeout_secs = 2;
    let ledger = Arc::new(MemoryLedger::new());
    let service = RecoveryService::from_config(&config, ledger.clone()).unwrap();
    Harness {
        ledger,
        service,
        _dir: dir,
    }
}

fn seed(ledger: &MemoryLedger, key: String, value: CLValue) {
    ledger.put_dictionary_item(CONTRACT, "d", &key, value);
}

fn keypairs(n: usize) -> Vec<KeyPair> {
    (0..n).map(|_| KeyPair::generate()).collect()
}

fn hashes(keys: &[KeyPair]) -> Vec<AccountHash> {
    keys.iter().map(|k| k.public_key().account_hash()).collect()
}

fn hexes(keys: &[KeyPair]) -> Vec<String> {
    keys.iter().map(|k| k.public_key().to_hex()).collect()
}

fn sign(deploy: &Deploy, signer: &KeyPair) -> Deploy {
    let mut signed = deploy.clone();
    signed.sign(signer);
    signed
}

// Scenario A
#[tokio::test]
async fn test_register_three_guardians_builds() {
    let h = harness(false);
    let owner = KeyPair::generate();
    let guardians = keypairs(3);

    let prepared = h
        .service
        .register_guardians(&owner.public_key().to_hex(), hexes(&guardians), 3)
        .await
        .unwrap();

    assert_eq!(prepared.action, ActionKind::RegisterGuardians);
    match &prepared.deploy.session {
        ExecutableDeployItem::ModuleBytes { args, .. } => {
            assert_eq!(args.get("action"), Some(&CLValue::u8(1)));
            assert_eq!(args.get("threshold"), Some(&CLValue::u8(3)));
            assert_eq!(
                args.get("guardians"),
                Some(&CLValue::account_hash_list(&hashes(&guardians)))
            );
        }
        other => panic!("unexpected session {:?}", other),
    }
    prepared.deploy.validate().unwrap();

    // The wallet round trip keeps the hash, and the ledger accepts it.
    let json = serde_json::to_string(&prepared.deploy).unwrap();
    let back: Deploy = serde_json::from_str(&json).unwrap();
    let signed = sign(&back, &owner);
    let hash = h
        .service
        .submit(&signed, Some(&prepared.deploy.hash))
        .await
        .unwrap();
    assert_eq!(hash, prepared.deploy.hash);

    h.ledger.set_outcome(hash, ExecutionOutcome::success());
    assert!(h.service.wait(&hash).await.is_success());
}

// Scenario B
#[tokio::test]
async fn test_owner_in_own_guardian_list_is_rejected() {
    let h = harness(true);
    let owner = KeyPair::generate();
    let g1 = KeyPair::generate();
    let err = h
        .service
        .register_guardians(
            &owner.public_key().to_hex(),
            vec![g1.public_key().to_hex(), owner.public_key().to_hex()],
            2,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecoveryError::InvalidArgument(InvalidArgument::SelfGuardian)
    ));
    assert_eq!(err.to_string(), "user cannot be a guardian");
    assert!(h.ledger.submitted().is_empty());
}

#[tokio::test]
async fn test_each_rejection_is_distinguishable() {
    let h = harness(true);
    let owner = KeyPair::generate().public_key().to_hex();
    let g = hexes(&keypairs(2));

    let dup = h
        .service
        .register_guardians(&owner, vec![g[0].clone(), g[0].to_uppercase()], 2)
        .await
        .unwrap_err();
    assert!(matches!(
        dup,
        RecoveryError::InvalidArgument(InvalidArgument::DuplicateGuardian(_))
    ));

    let few = h
        .service
        .register_guardians(&owner, vec![g[0].clone()], 2)
        .await
        .unwrap_err();
    assert!(matches!(
        few,
        RecoveryError::InvalidArgument(InvalidArgument::TooFewGuardians(1))
    ));

    let garbage = h
        .service
        .register_guardians(&owner, vec![g[0].clone(), "nothex".to_string()], 2)
        .await
        .unwrap_err();
    assert!(matches!(
        garbage,
        RecoveryError::InvalidArgument(InvalidArgument::InvalidKey(..))
    ));
}

// Scenario C
#[tokio::test]
async fn test_initiated_recovery_reads_back_unapproved() {
    let h = harness(true);
    let owner = KeyPair::generate();
    let guardians = keypairs(3);
    let new_key = KeyPair::generate().public_key();
    let account = owner.public_key().account_hash();

    seed(&h.ledger, keys::dictionary::initialized(&account), CLValue::bool(true));
    seed(
        &h.ledger,
        keys::dictionary::guardians(&account),
        CLValue::account_hash_list(&hashes(&guardians)),
    );
    seed(&h.ledger, keys::dictionary::threshold(&account), CLValue::u8(2));

    let initiator = &guardians[0];
    let prepared = h
        .service
        .initiate_recovery(
            &initiator.public_key().to_hex(),
            &account.to_formatted_string(),
            &new_key.to_hex(),
        )
        .await
        .unwrap();
    match &prepared.deploy.session {
        ExecutableDeployItem::StoredContractByHash {
            entry_point, args, ..
        } => {
            assert_eq!(entry_point, "start_recovery");
            assert_eq!(args.get("new_key"), Some(&CLValue::public_key(&new_key)));
        }
        other => panic!("unexpected session {:?}", other),
    }
    let notice = prepared.notice.unwrap();
    assert_eq!(notice.target_account, Some(account));
    assert_eq!(notice.new_key, Some(new_key.clone()));
    assert_eq!(notice.guardians, hashes(&guardians));

    // What start_recovery writes for the first request.
    seed(&h.ledger, "ra1".to_string(), CLValue::account_hash(&account));
    seed(&h.ledger, "rk1".to_string(), CLValue::public_key(&new_key));
    seed(&h.ledger, "rc1".to_string(), CLValue::u8(0));
    seed(&h.ledger, "ro1".to_string(), CLValue::bool(false));
    seed(&h.ledger, keys::dictionary::active_recovery(&account), CLValue::u256(1));

    let request = h.service.get_recovery(1).await.unwrap().unwrap();
    assert_eq!(request.account, account);
    assert_eq!(request.new_key, Some(new_key));
    assert_eq!(request.approval_count, 0);
    assert!(!request.is_approved);
    assert!(!request.is_finalized);
    assert!(request.approvals.iter().all(|a| !a.approved));

    let status = h.service.guardian_status(&account.to_hex()).await.unwrap();
    assert_eq!(status.active_recovery, Some(1));
}

// Scenario D
#[tokio::test]
async fn test_finalized_recovery_leaves_pending_lists() {
    let h = harness(true);
    let owner = KeyPair::generate();
    let guardians = keypairs(3);
    let guardian_hashes = hashes(&guardians);
    let account = owner.public_key().account_hash();
    let new_key: PublicKey = KeyPair::generate().public_key();

    seed(&h.ledger, keys::dictionary::initialized(&account), CLValue::bool(true));
    seed(
        &h.ledger,
        keys::dictionary::guardians(&account),
        CLValue::account_hash_list(&guardian_hashes),
    );
    seed(&h.ledger, keys::dictionary::threshold(&account), CLValue::u8(3));
    seed(&h.ledger, "ra1".to_string(), CLValue::account_hash(&account));
    seed(&h.ledger, "rk1".to_string(), CLValue::public_key(&new_key));
    seed(&h.ledger, "rc1".to_string(), CLValue::u8(0));
    seed(&h.ledger, "ro1".to_string(), CLValue::bool(false));
    for guardian in &guardian_hashes {
        seed(&h.ledger, keys::dictionary::guardian_index(guardian), CLValue::u256_list(&[1]));
    }

    for (i, guardian) in guardians.iter().enumerate() {
        let pending = h
            .service
            .get_recoveries_for_guardian(&guardian.public_key().to_hex())
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 1);

        let prepared = h
            .service
            .approve_recovery(&guardian.public_key().to_hex(), 1)
            .await
            .unwrap();
        let notice = prepared.notice.unwrap();
        assert_eq!(notice.recovery_id, Some(1));
        assert_eq!(notice.target_account, Some(account));
        let hash = h
            .service
            .submit(&sign(&prepared.deploy, guardian), Some(&prepared.deploy.hash))
            .await
            .unwrap();
        h.ledger.set_outcome(hash, ExecutionOutcome::success());
        assert!(matches!(h.service.wait(&hash).await, TrackOutcome::Success { .. }));

        // What approve writes.
        let count = (i + 1) as u8;
        seed(&h.ledger, keys::dictionary::approval(1, &guardian_hashes[i]), CLValue::bool(true));
        seed(&h.ledger, "rc1".to_string(), CLValue::u8(count));
        seed(&h.ledger, "ro1".to_string(), CLValue::bool(count >= 3));
    }

    let approved = h.service.get_recovery(1).await.unwrap().unwrap();
    assert_eq!(approved.approval_count, 3);
    assert!(approved.is_approved);
    assert!(guardian_hashes.iter().all(|g| approved.has_approved(g)));
    assert!(!approved.is_finalized);

    let finalize = h
        .service
        .finalize_recovery(&owner.public_key().to_hex(), 1)
        .await
        .unwrap();
    assert_eq!(finalize.action, ActionKind::FinalizeRecovery);
    seed(&h.ledger, "rf1".to_string(), CLValue::bool(true));

    for guardian in &guardians {
        let pending = h
            .service
            .get_recoveries_for_guardian(&guardian.public_key().to_hex())
            .await
            .unwrap();
        assert!(pending.is_empty());
    }
    assert_eq!(h.ledger.submitted().len(), 3);
}

#[tokio::test]
async fn test_reverted_execution_keeps_ledger_message() {
    let h = harness(true);
    let guardian = KeyPair::generate();
    let prepared = h
        .service
        .approve_recovery(&guardian.public_key().to_hex(), 9)
        .await
        .unwrap();
    let hash = h
        .service
        .submit(&sign(&prepared.deploy, &guardian), None)
        .await
        .unwrap();
    h.ledger
        .set_outcome(hash, ExecutionOutcome::failed("User error: 5"));
    match h.service.wait(&hash).await {
        TrackOutcome::Failed { error_message, .. } => assert_eq!(error_message, "User error: 5"),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nonexistent_account_reads_empty() {
    let h = harness(true);
    let nobody = AccountHash([0x42; 32]).to_formatted_string();
    assert!(h.service.get_guardians(&nobody).await.unwrap().is_empty());
    assert!(!h.service.has_guardians(&nobody).await.unwrap());
    assert!(h.service.get_guardian_set(&nobody).await.unwrap().is_none());
}
