//! Protocol actions and their on-chain argument encoding.
//!
//! Every action shares one session module; the first argument, `action`,
//! is a `U8` discriminator telling the module which branch to run. Actions
//! that also exist as registry contract entry points can be sent there
//! instead, in which case the discriminator is dropped.

use crate::clvalue::{CLValue, RuntimeArgs};
use crate::config::PaymentConfig;
use crate::crypto::{parse_account, AccountHash, PublicKey};
use crate::error::InvalidArgument;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const ACTION_ARG: &str = "action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ActionKind {
    RegisterGuardians = 1,
    InitiateRecovery = 2,
    ApproveRecovery = 3,
    CheckThreshold = 4,
    FinalizeRecovery = 5,
    GetGuardians = 6,
    GetThreshold = 7,
    HasGuardians = 8,
    RotateAddKey = 9,
    RotateRemoveKey = 10,
    UpdateThresholds = 11,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::RegisterGuardians,
        ActionKind::InitiateRecovery,
        ActionKind::ApproveRecovery,
        ActionKind::CheckThreshold,
        ActionKind::FinalizeRecovery,
        ActionKind::GetGuardians,
        ActionKind::GetThreshold,
        ActionKind::HasGuardians,
        ActionKind::RotateAddKey,
        ActionKind::RotateRemoveKey,
        ActionKind::UpdateThresholds,
    ];

    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Registry contract entry point, if the contract exposes this action.
    pub fn entry_point(&self) -> Option<&'static str> {
        match self {
            ActionKind::RegisterGuardians => Some("init_guardians"),
            ActionKind::InitiateRecovery => Some("start_recovery"),
            ActionKind::ApproveRecovery => Some("approve"),
            ActionKind::CheckThreshold => Some("is_approved"),
            ActionKind::FinalizeRecovery => Some("finalize"),
            ActionKind::GetGuardians => Some("get_guardians"),
            ActionKind::HasGuardians => Some("has_guardians"),
            ActionKind::GetThreshold
            | ActionKind::RotateAddKey
            | ActionKind::RotateRemoveKey
            | ActionKind::UpdateThresholds => None,
        }
    }

    /// Actions whose outcome guardians should hear about.
    pub fn notifies_guardians(&self) -> bool {
        matches!(
            self,
            ActionKind::RegisterGuardians
                | ActionKind::InitiateRecovery
                | ActionKind::ApproveRecovery
                | ActionKind::FinalizeRecovery
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::RegisterGuardians => "register-guardians",
            ActionKind::InitiateRecovery => "initiate-recovery",
            ActionKind::ApproveRecovery => "approve-recovery",
            ActionKind::CheckThreshold => "check-threshold",
            ActionKind::FinalizeRecovery => "finalize-recovery",
            ActionKind::GetGuardians => "get-guardians",
            ActionKind::GetThreshold => "get-threshold",
            ActionKind::HasGuardians => "has-guardians",
            ActionKind::RotateAddKey => "rotate-add-key",
            ActionKind::RotateRemoveKey => "rotate-remove-key",
            ActionKind::UpdateThresholds => "update-thresholds",
        };
        write!(f, "{}", name)
    }
}

/// A protocol action with its user-supplied parameters. Keys and accounts
/// are plain strings here; they are parsed during encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RecoveryAction {
    RegisterGuardians { guardians: Vec<String>, threshold: u8 },
    InitiateRecovery { account: String, new_key: String },
    ApproveRecovery { recovery_id: u64 },
    CheckThreshold { recovery_id: u64 },
    FinalizeRecovery { recovery_id: u64 },
    GetGuardians { account: String },
    GetThreshold { account: String },
    HasGuardians { account: String },
    RotateAddKey { new_key: String, weight: u8 },
    RotateRemoveKey { key: String },
    UpdateThresholds { deployment: u8, key_management: u8 },
}

impl RecoveryAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            RecoveryAction::RegisterGuardians { .. } => ActionKind::RegisterGuardians,
            RecoveryAction::InitiateRecovery { .. } => ActionKind::InitiateRecovery,
            RecoveryAction::ApproveRecovery { .. } => ActionKind::ApproveRecovery,
            RecoveryAction::CheckThreshold { .. } => ActionKind::CheckThreshold,
            RecoveryAction::FinalizeRecovery { .. } => ActionKind::FinalizeRecovery,
            RecoveryAction::GetGuardians { .. } => ActionKind::GetGuardians,
            RecoveryAction::GetThreshold { .. } => ActionKind::GetThreshold,
            RecoveryAction::HasGuardians { .. } => ActionKind::HasGuardians,
            RecoveryAction::RotateAddKey { .. } => ActionKind::RotateAddKey,
            RecoveryAction::RotateRemoveKey { .. } => ActionKind::RotateRemoveKey,
            RecoveryAction::UpdateThresholds { .. } => ActionKind::UpdateThresholds,
        }
    }
}

/// How the deploy will execute; decides which payment default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    ContractCall,
    ModuleExecution,
}

/// Output of encoding: arguments for both targets plus payment defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAction {
    pub kind: ActionKind,
    /// Session-module arguments; `action` comes first.
    pub args: RuntimeArgs,
    payments: PaymentConfig,
    /// Parsed account hashes of any guardians named by the action.
    pub guardians: Vec<AccountHash>,
    /// Account the action is about, when there is one.
    pub target_account: Option<AccountHash>,
    pub new_key: Option<PublicKey>,
    pub recovery_id: Option<u64>,
}

impl EncodedAction {
    pub fn module_args(&self) -> RuntimeArgs {
        self.args.clone()
    }

    /// Contract entry points take the same arguments minus the
    /// discriminator.
    pub fn contract_args(&self) -> RuntimeArgs {
        self.args.without(ACTION_ARG)
    }

    pub fn payment(&self, target: TargetKind) -> u64 {
        match target {
            TargetKind::ContractCall => self.payments.contract_call,
            TargetKind::ModuleExecution => self.payments.module_execution,
        }
    }
}

pub struct ActionEncoder {
    payments: PaymentConfig,
}

impl ActionEncoder {
    pub fn new(payments: PaymentConfig) -> Self {
        Self { payments }
    }

    /// Validate and encode `action` on behalf of `caller`. Pure.
    pub fn encode(
        &self,
        caller: &PublicKey,
        action: &RecoveryAction,
    ) -> Result<EncodedAction, InvalidArgument> {
        let kind = action.kind();
        let mut encoded = EncodedAction {
            kind,
            args: RuntimeArgs::new(),
            payments: self.payments,
            guardians: Vec::new(),
            target_account: None,
            new_key: None,
            recovery_id: None,
        };
        encoded.args.insert(ACTION_ARG, CLValue::u8(kind.id()));

        match action {
            RecoveryAction::RegisterGuardians {
                guardians,
                threshold,
            } => {
                let owner = caller.account_hash();
                let hashes = validate_guardians(&owner, guardians)?;
                if *threshold < 2 || *threshold as usize > hashes.len() {
                    return Err(InvalidArgument::InvalidThreshold {
                        threshold: *threshold,
                        guardians: hashes.len(),
                    });
                }
                encoded.args.insert("account", CLValue::account_hash(&owner));
                encoded.args.insert("guardians", CLValue::account_hash_list(&hashes));
                encoded.args.insert("threshold", CLValue::u8(*threshold));
                encoded.target_account = Some(owner);
                encoded.guardians = hashes;
            }
            RecoveryAction::InitiateRecovery { account, new_key } => {
                let account = parse_account(account)?;
                let new_key = PublicKey::from_hex(new_key)?;
                encoded.args.insert("account", CLValue::account_hash(&account));
                encoded.args.insert("new_key", CLValue::public_key(&new_key));
                encoded.target_account = Some(account);
                encoded.new_key = Some(new_key);
            }
            RecoveryAction::ApproveRecovery { recovery_id }
            | RecoveryAction::CheckThreshold { recovery_id }
            | RecoveryAction::FinalizeRecovery { recovery_id } => {
                encoded.args.insert("id", CLValue::u256(*recovery_id));
                encoded.recovery_id = Some(*recovery_id);
            }
            RecoveryAction::GetGuardians { account }
            | RecoveryAction::GetThreshold { account }
            | RecoveryAction::HasGuardians { account } => {
                let account = parse_account(account)?;
                encoded.args.insert("account", CLValue::account_hash(&account));
                encoded.target_account = Some(account);
            }
            RecoveryAction::RotateAddKey { new_key, weight } => {
                if *weight == 0 {
                    return Err(InvalidArgument::ZeroWeight);
                }
                let key = PublicKey::from_hex(new_key)?;
                encoded.args.insert("new_account", CLValue::account_hash(&key.account_hash()));
                encoded.args.insert("weight", CLValue::u8(*weight));
                encoded.target_account = Some(caller.account_hash());
                encoded.new_key = Some(key);
            }
            RecoveryAction::RotateRemoveKey { key } => {
                let account = parse_account(key)?;
                encoded.args.insert("account", CLValue::account_hash(&account));
                encoded.target_account = Some(caller.account_hash());
            }
            RecoveryAction::UpdateThresholds {
                deployment,
                key_management,
            } => {
                if *deployment == 0 || *key_management == 0 {
                    return Err(InvalidArgument::ZeroActionThreshold);
                }
                encoded.args.insert("deployment_threshold", CLValue::u8(*deployment));
                encoded
                    .args
                    .insert("key_management_threshold", CLValue::u8(*key_management));
                encoded.target_account = Some(caller.account_hash());
            }
        }
        Ok(encoded)
    }
}

/// Parses guardians and enforces: no unparseable entries, no duplicates
/// (compared as lowercase hex of the account hash), owner not included,
/// at least two left.
pub fn validate_guardians(
    owner: &AccountHash,
    guardians: &[String],
) -> Result<Vec<AccountHash>, InvalidArgument> {
    let mut seen = HashSet::new();
    let mut hashes = Vec::with_capacity(guardians.len());
    for raw in guardians {
        let hash = parse_account(raw)?;
        if &hash == owner {
            return Err(InvalidArgument::SelfGuardian);
        }
        if !seen.insert(hash.to_hex()) {
            return Err(InvalidArgument::DuplicateGuardian(raw.trim().to_string()));
        }
        hashes.push(hash);
    }
    if hashes.len() < 2 {
        return Err(InvalidArgument::TooFewGuardians(hashes.len()));
    }
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn encoder() -> ActionEncoder {
        ActionEncoder::new(PaymentConfig {
            contract_call: 3,
            module_execution: 15,
        })
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|_| KeyPair::generate().public_key().to_hex()).collect()
    }

    #[test]
    fn test_discriminators_are_stable() {
        let ids: Vec<u8> = ActionKind::ALL.iter().map(|k| k.id()).collect();
        assert_eq!(ids, (1..=11).collect::<Vec<u8>>());
    }

    #[test]
    fn test_register_three_guardians() {
        let owner = KeyPair::generate().public_key();
        let action = RecoveryAction::RegisterGuardians {
            guardians: keys(3),
            threshold: 3,
        };
        let encoded = encoder().encode(&owner, &action).unwrap();
        assert_eq!(encoded.kind, ActionKind::RegisterGuardians);
        assert_eq!(encoded.args.names(), vec!["action", "account", "guardians", "threshold"]);
        assert_eq!(encoded.args.get("action").unwrap().bytes, vec![1]);
        assert_eq!(encoded.guardians.len(), 3);
        assert_eq!(encoded.target_account, Some(owner.account_hash()));
        assert_eq!(encoded.contract_args().names(), vec!["account", "guardians", "threshold"]);
        assert_eq!(encoded.payment(TargetKind::ContractCall), 3);
        assert_eq!(encoded.payment(TargetKind::ModuleExecution), 15);
    }

    #[test]
    fn test_owner_cannot_guard_itself() {
        let owner = KeyPair::generate().public_key();
        let action = RecoveryAction::RegisterGuardians {
            guardians: vec![keys(1).remove(0), owner.to_hex()],
            threshold: 2,
        };
        let err = encoder().encode(&owner, &action).unwrap_err();
        assert_eq!(err, InvalidArgument::SelfGuardian);
        assert_eq!(err.to_string(), "user cannot be a guardian");
    }

    #[test]
    fn test_owner_account_hash_also_rejected() {
        let owner = KeyPair::generate().public_key();
        let action = RecoveryAction::RegisterGuardians {
            guardians: vec![keys(1).remove(0), owner.account_hash().to_formatted_string()],
            threshold: 2,
        };
        assert_eq!(
            encoder().encode(&owner, &action).unwrap_err(),
            InvalidArgument::SelfGuardian
        );
    }

    #[test]
    fn test_duplicates_compare_case_insensitively() {
        let owner = KeyPair::generate().public_key();
        let g = keys(1).remove(0);
        let action = RecoveryAction::RegisterGuardians {
            guardians: vec![g.clone(), g.to_uppercase()],
            threshold: 2,
        };
        assert!(matches!(
            encoder().encode(&owner, &action),
            Err(InvalidArgument::DuplicateGuardian(_))
        ));
    }

    #[test]
    fn test_too_few_guardians() {
        let owner = KeyPair::generate().public_key();
        let action = RecoveryAction::RegisterGuardians {
            guardians: keys(1),
            threshold: 1,
        };
        assert_eq!(
            encoder().encode(&owner, &action).unwrap_err(),
            InvalidArgument::TooFewGuardians(1)
        );
    }

    #[test]
    fn test_unparseable_guardian() {
        let owner = KeyPair::generate().public_key();
        let action = RecoveryAction::RegisterGuardians {
            guardians: vec![keys(1).remove(0), "not-a-key".to_string()],
            threshold: 2,
        };
        assert!(matches!(
            encoder().encode(&owner, &action),
            Err(InvalidArgument::InvalidKey(_, _))
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        let owner = KeyPair::generate().public_key();
        for threshold in [0u8, 1, 4] {
            let action = RecoveryAction::RegisterGuardians {
                guardians: keys(3),
                threshold,
            };
            assert!(matches!(
                encoder().encode(&owner, &action),
                Err(InvalidArgument::InvalidThreshold { .. })
            ));
        }
    }

    #[test]
    fn test_initiate_recovery_args() {
        let caller = KeyPair::generate().public_key();
        let target = KeyPair::generate().public_key();
        let new_key = KeyPair::generate().public_key();
        let action = RecoveryAction::InitiateRecovery {
            account: target.to_hex(),
            new_key: new_key.to_hex(),
        };
        let encoded = encoder().encode(&caller, &action).unwrap();
        assert_eq!(encoded.args.get("action").unwrap().bytes, vec![2]);
        assert_eq!(encoded.target_account, Some(target.account_hash()));
        assert_eq!(encoded.new_key, Some(new_key.clone()));
        let arg = encoded.args.get("new_key").unwrap();
        assert_eq!(arg.to_value().unwrap().as_public_key(), Some(new_key));
    }

    #[test]
    fn test_initiate_rejects_bad_new_key() {
        let caller = KeyPair::generate().public_key();
        let action = RecoveryAction::InitiateRecovery {
            account: caller.to_hex(),
            new_key: "01xyz".to_string(),
        };
        assert!(encoder().encode(&caller, &action).is_err());
    }

    #[test]
    fn test_recovery_id_is_u256() {
        let caller = KeyPair::generate().public_key();
        let encoded = encoder()
            .encode(&caller, &RecoveryAction::ApproveRecovery { recovery_id: 5 })
            .unwrap();
        let id = encoded.args.get("id").unwrap();
        assert_eq!(id.bytes, vec![1, 5]);
        assert_eq!(encoded.recovery_id, Some(5));
    }

    #[test]
    fn test_key_management_actions() {
        let caller = KeyPair::generate().public_key();
        let other = KeyPair::generate().public_key();
        let add = encoder()
            .encode(
                &caller,
                &RecoveryAction::RotateAddKey {
                    new_key: other.to_hex(),
                    weight: 1,
                },
            )
            .unwrap();
        assert_eq!(add.kind.entry_point(), None);
        assert_eq!(add.args.names(), vec!["action", "new_account", "weight"]);

        let remove = encoder()
            .encode(&caller, &RecoveryAction::RotateRemoveKey { key: other.to_hex() })
            .unwrap();
        assert_eq!(remove.args.get("action").unwrap().bytes, vec![10]);

        assert_eq!(
            encoder()
                .encode(
                    &caller,
                    &RecoveryAction::UpdateThresholds {
                        deployment: 0,
                        key_management: 1
                    }
                )
                .unwrap_err(),
            InvalidArgument::ZeroActionThreshold
        );
        assert_eq!(
            encoder()
                .encode(
                    &caller,
                    &RecoveryAction::RotateAddKey {
                        new_key: other.to_hex(),
                        weight: 0
                    }
                )
                .unwrap_err(),
            InvalidArgument::ZeroWeight
        );
    }

    #[test]
    fn test_action_json_is_tagged() {
        let action: RecoveryAction =
            serde_json::from_str(r#"{"action":"approve-recovery","recovery_id":4}"#).unwrap();
        assert_eq!(action, RecoveryAction::ApproveRecovery { recovery_id: 4 });
    }
}
