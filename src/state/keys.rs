//! Storage-key derivation.
//!
//! These strings are the wire contract with the deployed registry: the
//! contract builds its dictionary keys with `format!("g{:?}", account)`,
//! so the `Debug` form of [`AccountHash`] is embedded verbatim. A key that
//! differs by one character silently reads as "not found".

use crate::crypto::AccountHash;

/// Per-recovery fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryField {
    Account,
    NewKey,
    ApprovalCount,
    Approved,
    Finalized,
}

impl RecoveryField {
    fn dictionary_prefix(&self) -> &'static str {
        match self {
            RecoveryField::Account => "ra",
            RecoveryField::NewKey => "rk",
            RecoveryField::ApprovalCount => "rc",
            RecoveryField::Approved => "ro",
            RecoveryField::Finalized => "rf",
        }
    }

    fn named_key_suffix(&self) -> &'static str {
        match self {
            RecoveryField::Account => "account",
            RecoveryField::NewKey => "new_key",
            RecoveryField::ApprovalCount => "count",
            RecoveryField::Approved => "approved",
            RecoveryField::Finalized => "finalized",
        }
    }
}

/// Keys inside the registry contract's dictionary.
pub mod dictionary {
    use super::*;

    pub fn initialized(account: &AccountHash) -> String {
        format!("i{:?}", account)
    }

    pub fn guardians(account: &AccountHash) -> String {
        format!("g{:?}", account)
    }

    pub fn threshold(account: &AccountHash) -> String {
        format!("t{:?}", account)
    }

    pub fn active_recovery(account: &AccountHash) -> String {
        format!("a{:?}", account)
    }

    pub fn recovery(id: u64, field: RecoveryField) -> String {
        format!("{}{}", field.dictionary_prefix(), id)
    }

    pub fn approval(id: u64, guardian: &AccountHash) -> String {
        format!("rp{}_{:?}", id, guardian)
    }

    pub fn guardian_index(guardian: &AccountHash) -> String {
        format!("gr{:?}", guardian)
    }
}

/// Named keys on the registry account.
pub mod named {
    use super::*;

    pub fn initialized(account: &AccountHash) -> String {
        format!("grp_init_{}", account)
    }

    pub fn guardians(account: &AccountHash) -> String {
        format!("grp_guardians_{}", account)
    }

    pub fn threshold(account: &AccountHash) -> String {
        format!("grp_threshold_{}", account)
    }

    pub fn active_recovery(account: &AccountHash) -> String {
        format!("grp_active_{}", account)
    }

    pub fn recovery(id: u64, field: RecoveryField) -> String {
        format!("grp_rec_{}_{}", id, field.named_key_suffix())
    }

    pub fn approval(id: u64, guardian: &AccountHash) -> String {
        format!("grp_rec_{}_approval_{}", id, guardian)
    }
}
