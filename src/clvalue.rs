//! Self-describing ledger values (`CLType` + serialized bytes).
//!
//! Deploy arguments are built from these, and every raw storage read comes
//! back as one, so the same codec runs in both directions.

use crate::crypto::{AccountHash, PublicKey, ED25519_TAG, SECP256K1_TAG};
use crate::encoding::{write_big_uint, write_byte_slice, BytesReader, ToBytes};
use crate::error::{RecoveryError, Result};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::json;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CLType {
    Bool,
    I32,
    I64,
    U8,
    U32,
    U64,
    U128,
    U256,
    U512,
    Unit,
    String,
    Key,
    URef,
    Option(Box<CLType>),
    List(Box<CLType>),
    ByteArray(u32),
    Result { ok: Box<CLType>, err: Box<CLType> },
    Map { key: Box<CLType>, value: Box<CLType> },
    Tuple1([Box<CLType>; 1]),
    Tuple2([Box<CLType>; 2]),
    Tuple3([Box<CLType>; 3]),
    Any,
    PublicKey,
}

impl CLType {
    fn tag(&self) -> u8 {
        match self {
            CLType::Bool => 0,
            CLType::I32 => 1,
            CLType::I64 => 2,
            CLType::U8 => 3,
            CLType::U32 => 4,
            CLType::U64 => 5,
            CLType::U128 => 6,
            CLType::U256 => 7,
            CLType::U512 => 8,
            CLType::Unit => 9,
            CLType::String => 10,
            CLType::Key => 11,
            CLType::URef => 12,
            CLType::Option(_) => 13,
            CLType::List(_) => 14,
            CLType::ByteArray(_) => 15,
            CLType::Result { .. } => 16,
            CLType::Map { .. } => 17,
            CLType::Tuple1(_) => 18,
            CLType::Tuple2(_) => 19,
            CLType::Tuple3(_) => 20,
            CLType::Any => 21,
            CLType::PublicKey => 22,
        }
    }

    pub fn list(inner: CLType) -> Self {
        CLType::List(Box::new(inner))
    }

    /// Fewest bytes one value of this type can occupy.
    fn min_encoded_len(&self) -> usize {
        match self {
            CLType::Unit | CLType::Any => 0,
            CLType::Bool | CLType::U8 => 1,
            CLType::U128 | CLType::U256 | CLType::U512 => 1,
            CLType::Option(_) | CLType::Result { .. } => 1,
            CLType::I32 | CLType::U32 | CLType::String => 4,
            CLType::List(_) | CLType::Map { .. } => 4,
            CLType::I64 | CLType::U64 => 8,
            CLType::URef => 33,
            CLType::Key | CLType::PublicKey => 33,
            CLType::ByteArray(len) => *len as usize,
            CLType::Tuple1([a]) => a.min_encoded_len(),
            CLType::Tuple2([a, b]) => a.min_encoded_len() + b.min_encoded_len(),
            CLType::Tuple3([a, b, c]) => {
                a.min_encoded_len() + b.min_encoded_len() + c.min_encoded_len()
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CLType::Option(inner) => json!({ "Option": inner.to_json() }),
            CLType::List(inner) => json!({ "List": inner.to_json() }),
            CLType::ByteArray(len) => json!({ "ByteArray": len }),
            CLType::Result { ok, err } => {
                json!({ "Result": { "ok": ok.to_json(), "err": err.to_json() } })
            }
            CLType::Map { key, value } => {
                json!({ "Map": { "key": key.to_json(), "value": value.to_json() } })
            }
            CLType::Tuple1(t) => json!({ "Tuple1": t.iter().map(|c| c.to_json()).collect::<Vec<_>>() }),
            CLType::Tuple2(t) => json!({ "Tuple2": t.iter().map(|c| c.to_json()).collect::<Vec<_>>() }),
            CLType::Tuple3(t) => json!({ "Tuple3": t.iter().map(|c| c.to_json()).collect::<Vec<_>>() }),
            simple => json!(simple.simple_name()),
        }
    }

    fn simple_name(&self) -> &'static str {
        match self {
            CLType::Bool => "Bool",
            CLType::I32 => "I32",
            CLType::I64 => "I64",
            CLType::U8 => "U8",
            CLType::U32 => "U32",
            CLType::U64 => "U64",
            CLType::U128 => "U128",
            CLType::U256 => "U256",
            CLType::U512 => "U512",
            CLType::Unit => "Unit",
            CLType::String => "String",
            CLType::Key => "Key",
            CLType::URef => "URef",
            CLType::Any => "Any",
            CLType::PublicKey => "PublicKey",
            _ => "",
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let bad = || RecoveryError::Deserialization(format!("unknown cl_type {}", value));
        if let Some(name) = value.as_str() {
            return Ok(match name {
                "Bool" => CLType::Bool,
                "I32" => CLType::I32,
                "I64" => CLType::I64,
                "U8" => CLType::U8,
                "U32" => CLType::U32,
                "U64" => CLType::U64,
                "U128" => CLType::U128,
                "U256" => CLType::U256,
                "U512" => CLType::U512,
                "Unit" => CLType::Unit,
                "String" => CLType::String,
                "Key" => CLType::Key,
                "URef" => CLType::URef,
                "Any" => CLType::Any,
                "PublicKey" => CLType::PublicKey,
                _ => return Err(bad()),
            });
        }
        let obj = value.as_object().ok_or_else(bad)?;
        let (name, inner) = obj.iter().next().ok_or_else(bad)?;
        let boxed = |v: &serde_json::Value| CLType::from_json(v).map(Box::new);
        let tuple = |v: &serde_json::Value, n: usize| -> Result<Vec<Box<CLType>>> {
            let items = v.as_array().filter(|a| a.len() == n).ok_or_else(bad)?;
            items.iter().map(boxed).collect()
        };
        match name.as_str() {
            "Option" => Ok(CLType::Option(boxed(inner)?)),
            "List" => Ok(CLType::List(boxed(inner)?)),
            "ByteArray" => Ok(CLType::ByteArray(
                inner.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(bad)?,
            )),
            "Result" => Ok(CLType::Result {
                ok: boxed(&inner["ok"])?,
                err: boxed(&inner["err"])?,
            }),
            "Map" => Ok(CLType::Map {
                key: boxed(&inner["key"])?,
                value: boxed(&inner["value"])?,
            }),
            "Tuple1" => {
                let mut t = tuple(inner, 1)?.into_iter();
                Ok(CLType::Tuple1([t.next().ok_or_else(bad)?]))
            }
            "Tuple2" => {
                let mut t = tuple(inner, 2)?.into_iter();
                Ok(CLType::Tuple2([t.next().ok_or_else(bad)?, t.next().ok_or_else(bad)?]))
            }
            "Tuple3" => {
                let mut t = tuple(inner, 3)?.into_iter();
                Ok(CLType::Tuple3([
                    t.next().ok_or_else(bad)?,
                    t.next().ok_or_else(bad)?,
                    t.next().ok_or_else(bad)?,
                ]))
            }
            _ => Err(bad()),
        }
    }
}

impl ToBytes for CLType {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.push(self.tag());
        match self {
            CLType::Option(inner) | CLType::List(inner) => inner.write_bytes(writer),
            CLType::ByteArray(len) => len.write_bytes(writer),
            CLType::Result { ok, err } => {
                ok.write_bytes(writer);
                err.write_bytes(writer);
            }
            CLType::Map { key, value } => {
                key.write_bytes(writer);
                value.write_bytes(writer);
            }
            CLType::Tuple1(t) => t.iter().for_each(|c| c.write_bytes(writer)),
            CLType::Tuple2(t) => t.iter().for_each(|c| c.write_bytes(writer)),
            CLType::Tuple3(t) => t.iter().for_each(|c| c.write_bytes(writer)),
            _ => {}
        }
    }
}

impl Serialize for CLType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CLType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        CLType::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

/// Global-state key variants that appear inside stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerKey {
    Account(AccountHash),
    Hash([u8; 32]),
    URef([u8; 32], u8),
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKey::Account(hash) => write!(f, "{}", hash.to_formatted_string()),
            LedgerKey::Hash(addr) => write!(f, "hash-{}", hex::encode(addr)),
            LedgerKey::URef(addr, access) => write!(f, "uref-{}-{:03o}", hex::encode(addr), access),
        }
    }
}

/// A decoded ledger value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U8(u8),
    U32(u32),
    U64(u64),
    U128(BigUint),
    U256(BigUint),
    U512(BigUint),
    Unit,
    String(String),
    Key(LedgerKey),
    URef([u8; 32], u8),
    Option(Option<Box<Value>>),
    List(Vec<Value>),
    ByteArray(Vec<u8>),
    Map(Vec<(Value, Value)>),
    PublicKey(PublicKey),
}

impl Value {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        match self {
            Value::Bool(b) => b.write_bytes(writer),
            Value::I32(v) => writer.extend_from_slice(&v.to_le_bytes()),
            Value::I64(v) => writer.extend_from_slice(&v.to_le_bytes()),
            Value::U8(v) => v.write_bytes(writer),
            Value::U32(v) => v.write_bytes(writer),
            Value::U64(v) => v.write_bytes(writer),
            Value::U128(v) | Value::U256(v) | Value::U512(v) => write_big_uint(v, writer),
            Value::Unit => {}
            Value::String(s) => s.write_bytes(writer),
            Value::Key(key) => match key {
                LedgerKey::Account(hash) => {
                    writer.push(0);
                    hash.write_bytes(writer);
                }
                LedgerKey::Hash(addr) => {
                    writer.push(1);
                    addr.write_bytes(writer);
                }
                LedgerKey::URef(addr, access) => {
                    writer.push(2);
                    addr.write_bytes(writer);
                    writer.push(*access);
                }
            },
            Value::URef(addr, access) => {
                addr.write_bytes(writer);
                writer.push(*access);
            }
            Value::Option(None) => writer.push(0),
            Value::Option(Some(inner)) => {
                writer.push(1);
                inner.write_bytes(writer);
            }
            Value::List(items) => {
                (items.len() as u32).write_bytes(writer);
                items.iter().for_each(|v| v.write_bytes(writer));
            }
            Value::ByteArray(bytes) => writer.extend_from_slice(bytes),
            Value::Map(entries) => {
                (entries.len() as u32).write_bytes(writer);
                for (k, v) in entries {
                    k.write_bytes(writer);
                    v.write_bytes(writer);
                }
            }
            Value::PublicKey(pk) => pk.write_bytes(writer),
        }
    }

    fn decode(cl_type: &CLType, reader: &mut BytesReader<'_>) -> Result<Value> {
        Ok(match cl_type {
            CLType::Bool => Value::Bool(reader.bool()?),
            CLType::I32 => Value::I32(reader.i32()?),
            CLType::I64 => Value::I64(reader.i64()?),
            CLType::U8 => Value::U8(reader.u8()?),
            CLType::U32 => Value::U32(reader.u32()?),
            CLType::U64 => Value::U64(reader.u64()?),
            CLType::U128 => Value::U128(reader.big_uint(16)?),
            CLType::U256 => Value::U256(reader.big_uint(32)?),
            CLType::U512 => Value::U512(reader.big_uint(64)?),
            CLType::Unit => Value::Unit,
            CLType::String => Value::String(reader.string()?),
            CLType::Key => Value::Key(match reader.u8()? {
                0 => LedgerKey::Account(AccountHash(reader.fixed()?)),
                1 => LedgerKey::Hash(reader.fixed()?),
                2 => LedgerKey::URef(reader.fixed()?, reader.u8()?),
                other => {
                    return Err(RecoveryError::Deserialization(format!(
                        "unsupported key tag {}",
                        other
                    )))
                }
            }),
            CLType::URef => Value::URef(reader.fixed()?, reader.u8()?),
            CLType::Option(inner) => match reader.u8()? {
                0 => Value::Option(None),
                1 => Value::Option(Some(Box::new(Value::decode(inner, reader)?))),
                other => {
                    return Err(RecoveryError::Deserialization(format!(
                        "invalid option tag {}",
                        other
                    )))
                }
            },
            CLType::List(inner) => {
                let len = collection_len(reader, inner.min_encoded_len())?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(Value::decode(inner, reader)?);
                }
                Value::List(items)
            }
            CLType::ByteArray(len) => Value::ByteArray(reader.take(*len as usize)?.to_vec()),
            CLType::Map { key, value } => {
                let len = collection_len(reader, key.min_encoded_len() + value.min_encoded_len())?;
                let mut entries = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    let k = Value::decode(key, reader)?;
                    let v = Value::decode(value, reader)?;
                    entries.push((k, v));
                }
                Value::Map(entries)
            }
            CLType::PublicKey => {
                let tag = reader.u8()?;
                Value::PublicKey(match tag {
                    ED25519_TAG => PublicKey::Ed25519(reader.fixed()?),
                    SECP256K1_TAG => PublicKey::Secp256k1(reader.fixed()?),
                    other => {
                        return Err(RecoveryError::Deserialization(format!(
                            "unsupported public key tag {}",
                            other
                        )))
                    }
                })
            }
            other => {
                return Err(RecoveryError::Deserialization(format!(
                    "decoding {} values is not supported",
                    other.to_json()
                )))
            }
        })
    }

    /// The `parsed` JSON rendering the node attaches to stored values.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => json!(b),
            Value::I32(v) => json!(v),
            Value::I64(v) => json!(v),
            Value::U8(v) => json!(v),
            Value::U32(v) => json!(v),
            Value::U64(v) => json!(v),
            Value::U128(v) | Value::U256(v) | Value::U512(v) => json!(v.to_string()),
            Value::Unit => serde_json::Value::Null,
            Value::String(s) => json!(s),
            Value::Key(key) => json!(key.to_string()),
            Value::URef(addr, access) => json!(LedgerKey::URef(*addr, *access).to_string()),
            Value::Option(None) => serde_json::Value::Null,
            Value::Option(Some(inner)) => inner.to_json(),
            Value::List(items) => json!(items.iter().map(|v| v.to_json()).collect::<Vec<_>>()),
            Value::ByteArray(bytes) => json!(hex::encode(bytes)),
            Value::Map(entries) => json!(entries
                .iter()
                .map(|(k, v)| json!({ "key": k.to_json(), "value": v.to_json() }))
                .collect::<Vec<_>>()),
            Value::PublicKey(pk) => json!(pk.to_hex()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Option(Some(inner)) => inner.as_bool(),
            _ => None,
        }
    }

    /// Any unsigned integer that fits in a u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(*v as u64),
            Value::U32(v) => Some(*v as u64),
            Value::U64(v) => Some(*v),
            Value::U128(v) | Value::U256(v) | Value::U512(v) => v.to_u64(),
            Value::I32(v) => u64::try_from(*v).ok(),
            Value::I64(v) => u64::try_from(*v).ok(),
            Value::Option(Some(inner)) => inner.as_u64(),
            _ => None,
        }
    }

    pub fn as_account_hash(&self) -> Option<AccountHash> {
        match self {
            Value::ByteArray(bytes) => <[u8; 32]>::try_from(bytes.as_slice()).ok().map(AccountHash),
            Value::Key(LedgerKey::Account(hash)) => Some(*hash),
            Value::Option(Some(inner)) => inner.as_account_hash(),
            _ => None,
        }
    }

    pub fn as_public_key(&self) -> Option<PublicKey> {
        match self {
            Value::PublicKey(pk) => Some(pk.clone()),
            Value::Option(Some(inner)) => inner.as_public_key(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            Value::Option(Some(inner)) => inner.as_list(),
            _ => None,
        }
    }
}

/// A typed value together with its serialized bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CLValue {
    pub cl_type: CLType,
    pub bytes: Vec<u8>,
    pub parsed: serde_json::Value,
}

impl CLValue {
    fn from_parts(cl_type: CLType, value: Value) -> Self {
        let mut bytes = Vec::new();
        value.write_bytes(&mut bytes);
        CLValue {
            cl_type,
            bytes,
            parsed: value.to_json(),
        }
    }

    pub fn bool(v: bool) -> Self {
        Self::from_parts(CLType::Bool, Value::Bool(v))
    }

    pub fn u8(v: u8) -> Self {
        Self::from_parts(CLType::U8, Value::U8(v))
    }

    pub fn u64(v: u64) -> Self {
        Self::from_parts(CLType::U64, Value::U64(v))
    }

    pub fn u256(v: u64) -> Self {
        Self::from_parts(CLType::U256, Value::U256(BigUint::from(v)))
    }

    pub fn u512(v: u64) -> Self {
        Self::from_parts(CLType::U512, Value::U512(BigUint::from(v)))
    }

    pub fn string(v: &str) -> Self {
        Self::from_parts(CLType::String, Value::String(v.to_string()))
    }

    pub fn account_hash(hash: &AccountHash) -> Self {
        Self::from_parts(CLType::ByteArray(32), Value::ByteArray(hash.0.to_vec()))
    }

    pub fn account_hash_list(hashes: &[AccountHash]) -> Self {
        Self::from_parts(
            CLType::list(CLType::ByteArray(32)),
            Value::List(hashes.iter().map(|h| Value::ByteArray(h.0.to_vec())).collect()),
        )
    }

    pub fn u256_list(values: &[u64]) -> Self {
        Self::from_parts(
            CLType::list(CLType::U256),
            Value::List(values.iter().map(|v| Value::U256(BigUint::from(*v))).collect()),
        )
    }

    pub fn public_key(pk: &PublicKey) -> Self {
        Self::from_parts(CLType::PublicKey, Value::PublicKey(pk.clone()))
    }

    /// Decode the serialized bytes according to `cl_type`.
    pub fn to_value(&self) -> Result<Value> {
        let mut reader = BytesReader::new(&self.bytes);
        let value = Value::decode(&self.cl_type, &mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

impl ToBytes for CLValue {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        write_byte_slice(&self.bytes, writer);
        self.cl_type.write_bytes(writer);
    }
}

#[derive(Serialize, Deserialize)]
struct CLValueJson {
    cl_type: CLType,
    bytes: String,
    #[serde(default)]
    parsed: serde_json::Value,
}

impl Serialize for CLValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        CLValueJson {
            cl_type: self.cl_type.clone(),
            bytes: hex::encode(&self.bytes),
            parsed: self.parsed.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CLValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = CLValueJson::deserialize(deserializer)?;
        Ok(CLValue {
            cl_type: raw.cl_type,
            bytes: hex::decode(&raw.bytes).map_err(serde::de::Error::custom)?,
            parsed: raw.parsed,
        })
    }
}

/// `(name, value)` pair; serializes as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArg(pub String, pub CLValue);

/// Ordered deploy arguments. Order is part of the hashed body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeArgs(Vec<NamedArg>);

impl RuntimeArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: CLValue) {
        self.0.push(NamedArg(name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&CLValue> {
        self.0.iter().find(|arg| arg.0 == name).map(|arg| &arg.1)
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|arg| arg.0.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of these args without `name`.
    pub fn without(&self, name: &str) -> Self {
        RuntimeArgs(self.0.iter().filter(|arg| arg.0 != name).cloned().collect())
    }
}

impl ToBytes for RuntimeArgs {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        (self.0.len() as u32).write_bytes(writer);
        for NamedArg(name, value) in &self.0 {
            name.write_bytes(writer);
            value.write_bytes(writer);
        }
    }
}

/// Upper bound on elements of a zero-width type in one list or map.
const MAX_ZERO_WIDTH_ITEMS: usize = 1024;

/// Reads a u32 element count and rejects counts the remaining bytes
/// cannot hold.
fn collection_len(reader: &mut BytesReader<'_>, element_len: usize) -> Result<usize> {
    let len = reader.u32()? as usize;
    let fits = if element_len == 0 {
        len <= MAX_ZERO_WIDTH_ITEMS
    } else {
        len.checked_mul(element_len)
            .map_or(false, |needed| needed <= reader.remaining())
    };
    if !fits {
        return Err(RecoveryError::Deserialization(format!(
            "collection length {} exceeds {} remaining bytes",
            len,
            reader.remaining()
        )));
    }
    Ok(len)
}
