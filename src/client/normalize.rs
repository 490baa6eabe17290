//! Response normalization.
//!
//! Node versions disagree on envelope shape: snake_case vs camelCase
//! fields, values wrapped one level deeper, execution results as a
//! per-block array or a single versioned object. Each function here maps
//! every known variant of one response type onto a canonical type, so
//! nothing past the gateway has to care.

use super::types::{
    AccountInfo, ActionThresholds, AssociatedKey, DeployRecord, ExecutionOutcome, NamedKey,
};
use crate::clvalue::{CLType, CLValue};
use crate::crypto::AccountHash;
use crate::deploy::DeployHash;
use serde_json::Value;
use tracing::debug;

/// First present, non-null field among `names`.
fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| value.get(*name))
        .find(|v| !v.is_null())
}

fn str_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    field(value, names).and_then(|v| v.as_str())
}

pub fn state_root_hash(result: &Value) -> Option<String> {
    str_field(result, &["state_root_hash", "stateRootHash"])
        .map(|s| s.to_string())
        .or_else(|| result.as_str().map(|s| s.to_string()))
}

fn cl_value_from(raw: &Value) -> Option<CLValue> {
    let cl_type = CLType::from_json(field(raw, &["cl_type", "clType"])?).ok()?;
    let bytes = match str_field(raw, &["bytes"]) {
        Some(hex_str) => hex::decode(hex_str).ok()?,
        None => Vec::new(),
    };
    let parsed = field(raw, &["parsed"]).cloned().unwrap_or(Value::Null);
    Some(CLValue {
        cl_type,
        bytes,
        parsed,
    })
}

/// Extracts a CLValue from a `query_global_state` / `state_get_item` /
/// `state_get_dictionary_item` result.
///
/// Accepted shapes:
/// - `{stored_value: {CLValue: {...}}}` (and camelCase `storedValue`)
/// - `{stored_value: {cl_type, bytes, parsed}}`
/// - `{CLValue: {...}}` or the bare `{cl_type, bytes, parsed}`
pub fn stored_cl_value(result: &Value) -> Option<CLValue> {
    let stored = field(result, &["stored_value", "storedValue", "StoredValue"]).unwrap_or(result);
    let inner = field(stored, &["CLValue", "ClValue", "cl_value", "clValue"]).unwrap_or(stored);
    cl_value_from(inner)
}

fn named_keys(raw: &Value) -> Vec<NamedKey> {
    let Some(list) = field(raw, &["named_keys", "namedKeys"]) else {
        return Vec::new();
    };
    match list {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                Some(NamedKey {
                    name: str_field(item, &["name"])?.to_string(),
                    key: str_field(item, &["key"])?.to_string(),
                })
            })
            .collect(),
        // Some tooling renders named keys as a name -> key map.
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, key)| {
                Some(NamedKey {
                    name: name.clone(),
                    key: key.as_str()?.to_string(),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn associated_keys(raw: &Value) -> Vec<AssociatedKey> {
    field(raw, &["associated_keys", "associatedKeys"])
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let hash = AccountHash::from_hex(str_field(item, &["account_hash", "accountHash"])?).ok()?;
                    let weight = field(item, &["weight"])?.as_u64()?;
                    Some(AssociatedKey {
                        account_hash: hash,
                        weight: u8::try_from(weight).ok()?,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn action_thresholds(raw: &Value) -> ActionThresholds {
    let Some(t) = field(raw, &["action_thresholds", "actionThresholds"]) else {
        return ActionThresholds::default();
    };
    let get = |names: &[&str]| {
        field(t, names)
            .and_then(|v| v.as_u64())
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(0)
    };
    ActionThresholds {
        deployment: get(&["deployment"]),
        key_management: get(&["key_management", "keyManagement"]),
    }
}

/// `state_get_account_info` result, or a stored `Account` value.
pub fn account_info(result: &Value) -> Option<AccountInfo> {
    let stored = field(result, &["stored_value", "storedValue"]).unwrap_or(result);
    let account = field(stored, &["account", "Account"]).unwrap_or(stored);
    let account_hash =
        AccountHash::from_hex(str_field(account, &["account_hash", "accountHash"])?).ok()?;
    Some(AccountInfo {
        account_hash,
        named_keys: named_keys(account),
        main_purse: str_field(account, &["main_purse", "mainPurse"]).map(|s| s.to_string()),
        associated_keys: associated_keys(account),
        action_thresholds: action_thresholds(account),
    })
}

fn error_message(raw: &Value) -> Option<String> {
    str_field(raw, &["error_message", "errorMessage"]).map(|s| s.to_string())
}

/// Legacy per-block result: `{Success: {...}}` or `{Failure: {error_message}}`.
fn outcome_from_v1(raw: &Value) -> Option<ExecutionOutcome> {
    if field(raw, &["Success", "success"]).is_some() {
        return Some(ExecutionOutcome::success());
    }
    let failure = field(raw, &["Failure", "failure"])?;
    Some(ExecutionOutcome::failed(
        error_message(failure).unwrap_or_else(|| "execution failed".to_string()),
    ))
}

/// Newer flat result. `error_message` is always present once executed:
/// null on success, the ledger's text on failure. Without it the shape is
/// not one we know.
fn outcome_from_v2(raw: &Value) -> Option<ExecutionOutcome> {
    let message = ["error_message", "errorMessage"]
        .iter()
        .find_map(|name| raw.get(*name))?;
    Some(match message {
        Value::Null => ExecutionOutcome::success(),
        Value::String(text) => ExecutionOutcome::failed(text.clone()),
        other => ExecutionOutcome::failed(other.to_string()),
    })
}

fn outcome_from_versioned(raw: &Value) -> ExecutionOutcome {
    if raw.is_null() {
        return ExecutionOutcome::pending();
    }
    let outcome = if let Some(v1) = field(raw, &["Version1"]) {
        outcome_from_v1(v1)
    } else if let Some(v2) = field(raw, &["Version2"]) {
        outcome_from_v2(v2)
    } else {
        outcome_from_v1(raw).or_else(|| outcome_from_v2(raw))
    };
    outcome.unwrap_or_else(|| {
        debug!("Unrecognized execution result {}, treating as pending", raw);
        ExecutionOutcome::pending()
    })
}

/// Normalizes the execution part of an `info_get_deploy` result.
///
/// - legacy: `execution_results: [{block_hash, result: <v1>}]`, empty while
///   pending
/// - newer: `execution_info: {block_hash, execution_result: {Version1|Version2}}`,
///   null while pending
pub fn execution_outcome(result: &Value) -> (ExecutionOutcome, Option<String>) {
    if let Some(info) = field(result, &["execution_info", "executionInfo"]) {
        let block_hash = str_field(info, &["block_hash", "blockHash"]).map(|s| s.to_string());
        let outcome = field(info, &["execution_result", "executionResult"])
            .map(outcome_from_versioned)
            .unwrap_or_else(ExecutionOutcome::pending);
        return (outcome, block_hash);
    }
    if let Some(results) = field(result, &["execution_results", "executionResults"])
        .and_then(|v| v.as_array())
    {
        if let Some(first) = results.first() {
            let block_hash = str_field(first, &["block_hash", "blockHash"]).map(|s| s.to_string());
            let outcome = field(first, &["result", "execution_result"])
                .map(outcome_from_versioned)
                .unwrap_or_else(ExecutionOutcome::pending);
            return (outcome, block_hash);
        }
    }
    (ExecutionOutcome::pending(), None)
}

pub fn deploy_record(deploy_hash: DeployHash, result: &Value) -> DeployRecord {
    let (outcome, block_hash) = execution_outcome(result);
    DeployRecord {
        deploy_hash,
        outcome,
        block_hash,
    }
}

/// Deploy hash from a put-deploy result, whichever name the node used.
pub fn submitted_deploy_hash(result: &Value) -> Option<DeployHash> {
    let raw = str_field(result, &["deploy_hash", "deployHash"]).or_else(|| {
        field(result, &["transaction_hash", "transactionHash"])
            .and_then(|t| str_field(t, &["Deploy", "deploy"]))
    })?;
    DeployHash::from_hex(raw).ok()
}

/// The node has not seen this deploy yet (or has pruned it).
pub fn is_unknown_deploy(code: i64, message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    code == -32000
        || lower.contains("no such deploy")
        || lower.contains("not known")
        || lower.contains("deploy not found")
}

/// The queried key holds no value; not a failure for read paths.
pub fn is_missing_value(code: i64, message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    code == -32003
        || lower.contains("valuenotfound")
        || lower.contains("value not found")
        || lower.contains("failed to find")
        || lower.contains("missing key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::ExecutionStatus;
    use serde_json::json;

    #[test]
    fn test_stored_value_shapes_agree() {
        let inner = json!({ "cl_type": "Bool", "bytes": "01", "parsed": true });
        let shapes = vec![
            json!({ "api_version": "1.5.6", "stored_value": { "CLValue": inner.clone() }, "merkle_proof": "" }),
            json!({ "storedValue": { "CLValue": inner.clone() } }),
            json!({ "stored_value": inner.clone() }),
            json!({ "CLValue": inner.clone() }),
            inner.clone(),
            json!({ "stored_value": { "CLValue": { "clType": "Bool", "bytes": "01", "parsed": true } } }),
        ];
        for shape in shapes {
            let v = stored_cl_value(&shape).unwrap();
            assert_eq!(v.to_value().unwrap().as_bool(), Some(true), "shape {}", shape);
        }
    }

    #[test]
    fn test_unknown_shape_is_none() {
        assert!(stored_cl_value(&json!({ "stored_value": { "Account": {} } })).is_none());
        assert!(stored_cl_value(&json!(null)).is_none());
    }

    #[test]
    fn test_legacy_and_new_envelopes_agree() {
        let legacy_ok = json!({
            "deploy": {},
            "execution_results": [{
                "block_hash": "aa",
                "result": { "Success": { "cost": "123", "effect": {}, "transfers": [] } }
            }]
        });
        let new_ok = json!({
            "deploy": {},
            "execution_info": {
                "block_hash": "aa",
                "block_height": 10,
                "execution_result": { "Version2": { "error_message": null, "cost": "123" } }
            }
        });
        assert_eq!(execution_outcome(&legacy_ok), execution_outcome(&new_ok));
        assert_eq!(execution_outcome(&legacy_ok).0.status, ExecutionStatus::Success);

        let legacy_fail = json!({
            "execution_results": [{
                "block_hash": "bb",
                "result": { "Failure": { "error_message": "User error: 5", "cost": "1" } }
            }]
        });
        let new_fail = json!({
            "execution_info": {
                "block_hash": "bb",
                "execution_result": { "Version2": { "error_message": "User error: 5" } }
            }
        });
        let v1_in_info = json!({
            "execution_info": {
                "block_hash": "bb",
                "execution_result": { "Version1": { "Failure": { "error_message": "User error: 5" } } }
            }
        });
        let expected = (ExecutionOutcome::failed("User error: 5"), Some("bb".to_string()));
        assert_eq!(execution_outcome(&legacy_fail), expected);
        assert_eq!(execution_outcome(&new_fail), expected);
        assert_eq!(execution_outcome(&v1_in_info), expected);
    }

    #[test]
    fn test_pending_envelopes() {
        assert_eq!(execution_outcome(&json!({ "execution_results": [] })).0, ExecutionOutcome::pending());
        assert_eq!(execution_outcome(&json!({ "execution_info": null })).0, ExecutionOutcome::pending());
        assert_eq!(
            execution_outcome(&json!({ "execution_info": { "block_hash": null, "execution_result": null } })).0,
            ExecutionOutcome::pending()
        );
    }

    #[test]
    fn test_unrecognized_results_stay_pending() {
        for result in [
            json!({}),
            json!({ "Version2": {} }),
            json!({ "Version2": { "cost": "10" } }),
            json!({ "Version1": { "cost": "10" } }),
            json!({ "Version3": { "error_message": null } }),
            json!("Success"),
        ] {
            let envelope = json!({ "execution_info": { "block_hash": "cc", "execution_result": result } });
            assert_eq!(execution_outcome(&envelope).0, ExecutionOutcome::pending(), "{}", result);
        }
        let legacy = json!({ "execution_results": [{ "block_hash": "cc", "result": {} }] });
        assert_eq!(execution_outcome(&legacy).0, ExecutionOutcome::pending());

        let flat_failure = json!({ "execution_info": { "execution_result": { "error_message": "Out of gas" } } });
        assert_eq!(execution_outcome(&flat_failure).0, ExecutionOutcome::failed("Out of gas"));
    }

    #[test]
    fn test_outcome_json_shape() {
        let failed = serde_json::to_value(ExecutionOutcome::failed("boom")).unwrap();
        assert_eq!(failed, json!({ "status": "failed", "errorMessage": "boom" }));
        let ok = serde_json::to_value(ExecutionOutcome::success()).unwrap();
        assert_eq!(ok, json!({ "status": "success" }));
    }

    #[test]
    fn test_account_info_normalization() {
        let hash = "11".repeat(32);
        let result = json!({
            "api_version": "1.5.6",
            "account": {
                "account_hash": format!("account-hash-{}", hash),
                "named_keys": [{ "name": "grp_init_x", "key": "uref-00-007" }],
                "main_purse": "uref-01-007",
                "associated_keys": [{ "account_hash": format!("account-hash-{}", hash), "weight": 1 }],
                "action_thresholds": { "deployment": 1, "key_management": 2 }
            }
        });
        let info = account_info(&result).unwrap();
        assert_eq!(info.named_key("grp_init_x"), Some("uref-00-007"));
        assert_eq!(info.associated_keys.len(), 1);
        assert_eq!(info.action_thresholds.key_management, 2);

        let camel = json!({
            "storedValue": { "Account": {
                "accountHash": format!("account-hash-{}", hash),
                "namedKeys": { "grp_init_x": "uref-00-007" },
                "actionThresholds": { "deployment": 1, "keyManagement": 2 }
            } }
        });
        let info = account_info(&camel).unwrap();
        assert_eq!(info.named_key("grp_init_x"), Some("uref-00-007"));
        assert_eq!(info.action_thresholds.key_management, 2);
    }

    #[test]
    fn test_submitted_hash_variants() {
        let hash = "ab".repeat(32);
        assert!(submitted_deploy_hash(&json!({ "deploy_hash": hash })).is_some());
        assert!(submitted_deploy_hash(&json!({ "deployHash": hash })).is_some());
        assert!(submitted_deploy_hash(&json!({ "transaction_hash": { "Deploy": hash } })).is_some());
        assert!(submitted_deploy_hash(&json!({})).is_none());
    }

    #[test]
    fn test_error_classification() {
        assert!(is_unknown_deploy(-32000, "No such deploy"));
        assert!(is_unknown_deploy(-32602, "deploy not known"));
        assert!(!is_unknown_deploy(-32602, "invalid params"));
        assert!(is_missing_value(-32003, "Query failed"));
        assert!(is_missing_value(-1, "state query failed: ValueNotFound(\"...\")"));
    }
}
