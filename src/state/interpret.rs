// Typed readings of stored values. The serialized bytes are authoritative;
// `parsed` is only consulted when the bytes are absent or undecodable.
use crate::clvalue::{CLValue, Value};
use crate::crypto::{AccountHash, PublicKey};
use serde_json::Value as Json;

fn decoded(value: &CLValue) -> Option<Value> {
    if value.bytes.is_empty() {
        return None;
    }
    value.to_value().ok()
}

fn json_u64(json: &Json) -> Option<u64> {
    json.as_u64()
        .or_else(|| json.as_str().and_then(|s| s.trim().parse().ok()))
}

pub fn as_bool(value: &CLValue) -> Option<bool> {
    decoded(value)
        .and_then(|v| v.as_bool())
        .or_else(|| value.parsed.as_bool())
}

pub fn as_u64(value: &CLValue) -> Option<u64> {
    decoded(value)
        .and_then(|v| v.as_u64())
        .or_else(|| json_u64(&value.parsed))
}

pub fn as_u8(value: &CLValue) -> Option<u8> {
    as_u64(value).and_then(|v| u8::try_from(v).ok())
}

pub fn as_account_hash(value: &CLValue) -> Option<AccountHash> {
    decoded(value)
        .and_then(|v| v.as_account_hash())
        .or_else(|| {
            value
                .parsed
                .as_str()
                .and_then(|s| AccountHash::from_hex(s).ok())
        })
}

pub fn as_public_key(value: &CLValue) -> Option<PublicKey> {
    decoded(value)
        .and_then(|v| v.as_public_key())
        .or_else(|| {
            value
                .parsed
                .as_str()
                .and_then(|s| PublicKey::from_hex(s).ok())
        })
}

/// All-or-nothing: one bad element rejects the list.
pub fn as_account_hash_list(value: &CLValue) -> Option<Vec<AccountHash>> {
    if let Some(v) = decoded(value) {
        if let Some(items) = v.as_list() {
            return items.iter().map(|item| item.as_account_hash()).collect();
        }
    }
    value.parsed.as_array().and_then(|items| {
        items
            .iter()
            .map(|item| item.as_str().and_then(|s| AccountHash::from_hex(s).ok()))
            .collect()
    })
}

pub fn as_u64_list(value: &CLValue) -> Option<Vec<u64>> {
    if let Some(v) = decoded(value) {
        if let Some(items) = v.as_list() {
            return items.iter().map(|item| item.as_u64()).collect();
        }
    }
    value
        .parsed
        .as_array()
        .and_then(|items| items.iter().map(json_u64).collect())
}
