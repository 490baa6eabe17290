use crate::crypto::{AccountHash, PublicKey};
use serde::{Deserialize, Serialize};

/// An account's guardians and approval threshold as read from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianSet {
    pub account: AccountHash,
    pub guardians: Vec<AccountHash>,
    pub threshold: u8,
}

impl GuardianSet {
    /// `None` unless `2 <= threshold <= guardians.len()`.
    pub fn new(account: AccountHash, guardians: Vec<AccountHash>, threshold: u8) -> Option<Self> {
        let set = GuardianSet {
            account,
            guardians,
            threshold,
        };
        set.is_consistent().then_some(set)
    }

    pub fn is_consistent(&self) -> bool {
        self.guardians.len() >= 2
            && self.threshold >= 2
            && self.threshold as usize <= self.guardians.len()
    }

    pub fn contains(&self, account: &AccountHash) -> bool {
        self.guardians.contains(account)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianApproval {
    pub guardian: AccountHash,
    pub approved: bool,
}

/// A recovery request reassembled from its individual storage entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    pub id: u64,
    pub account: AccountHash,
    pub new_key: Option<PublicKey>,
    pub approval_count: u8,
    pub approvals: Vec<GuardianApproval>,
    pub threshold: u8,
    pub is_approved: bool,
    pub is_finalized: bool,
}

impl RecoveryRequest {
    pub fn has_approved(&self, guardian: &AccountHash) -> bool {
        self.approvals
            .iter()
            .any(|a| &a.guardian == guardian && a.approved)
    }

    pub fn is_pending(&self) -> bool {
        !self.is_finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(n: u8) -> Vec<AccountHash> {
        (1..=n).map(|i| AccountHash([i; 32])).collect()
    }

    #[test]
    fn test_guardian_set_bounds() {
        let owner = AccountHash([0; 32]);
        assert!(GuardianSet::new(owner, hashes(3), 2).is_some());
        assert!(GuardianSet::new(owner, hashes(3), 3).is_some());
        assert!(GuardianSet::new(owner, hashes(3), 4).is_none());
        assert!(GuardianSet::new(owner, hashes(3), 1).is_none());
        assert!(GuardianSet::new(owner, hashes(1), 1).is_none());
        assert!(GuardianSet::new(owner, Vec::new(), 0).is_none());
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = RecoveryRequest {
            id: 1,
            account: AccountHash([9; 32]),
            new_key: None,
            approval_count: 0,
            approvals: Vec::new(),
            threshold: 2,
            is_approved: false,
            is_finalized: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["approvalCount"], 0);
        assert_eq!(value["isApproved"], false);
        assert!(request.is_pending());
    }
}
