//! Deploy data model and its JSON interchange format.
//!
//! The JSON produced here is what the wallet signs: it appends to
//! `approvals` and must hand every other field back untouched.

use crate::clvalue::{CLValue, RuntimeArgs};
use crate::crypto::{blake2b256, KeyPair, PublicKey};
use crate::encoding::{write_byte_slice, ToBytes};
use crate::error::{InvalidArgument, RecoveryError, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

mod hex_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// blake2b-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "hex_32")] pub [u8; 32]);

impl Digest {
    pub fn hash(data: &[u8]) -> Self {
        Digest(blake2b256(data))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(self.0))
    }
}

impl ToBytes for Digest {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.0);
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployHash(pub Digest);

impl DeployHash {
    pub fn from_hex(input: &str) -> std::result::Result<Self, InvalidArgument> {
        let bytes = hex::decode(input.trim())
            .map_err(|_| InvalidArgument::InvalidDeployHash(input.to_string()))?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidArgument::InvalidDeployHash(input.to_string()))?;
        Ok(DeployHash(Digest(raw)))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for DeployHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for DeployHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeployHash({})", self.0)
    }
}

impl FromStr for DeployHash {
    type Err = InvalidArgument;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DeployHash::from_hex(s)
    }
}

impl ToBytes for DeployHash {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        self.0.write_bytes(writer);
    }
}

/// Milliseconds since the unix epoch; RFC 3339 in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis().max(0) as u64)
    }

    pub fn millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Utc.timestamp_millis_opt(self.0 as i64).single() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "invalid timestamp {}", self.0),
        }
    }
}

impl FromStr for Timestamp {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| format!("invalid timestamp '{}': {}", s, e))?;
        u64::try_from(dt.timestamp_millis())
            .map(Timestamp)
            .map_err(|_| format!("timestamp before epoch: {}", s))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A duration in milliseconds, rendered like `30m` or `1h 30m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeDiff(pub u64);

const UNITS: [(u64, &str); 5] = [
    (86_400_000, "day"),
    (3_600_000, "h"),
    (60_000, "m"),
    (1_000, "s"),
    (1, "ms"),
];

impl TimeDiff {
    pub fn from_millis(ms: u64) -> Self {
        TimeDiff(ms)
    }

    pub fn millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0s");
        }
        let mut rest = self.0;
        let mut parts = Vec::new();
        for (size, unit) in UNITS {
            let count = rest / size;
            if count > 0 {
                let suffix = if unit == "day" && count > 1 { "days" } else { unit };
                parts.push(format!("{}{}", count, suffix));
                rest %= size;
            }
        }
        write!(f, "{}", parts.join(" "))
    }
}

impl FromStr for TimeDiff {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total = 0u64;
        let mut tokens = 0;
        for token in s.split_whitespace() {
            tokens += 1;
            let split = token
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| format!("missing unit in '{}'", token))?;
            let (num, unit) = token.split_at(split);
            let count: u64 = num.parse().map_err(|_| format!("invalid number in '{}'", token))?;
            let size = match unit {
                "ms" => 1,
                "s" | "sec" | "secs" => 1_000,
                "m" | "min" | "mins" => 60_000,
                "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000,
                "d" | "day" | "days" => 86_400_000,
                other => return Err(format!("unknown unit '{}'", other)),
            };
            total = count
                .checked_mul(size)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| format!("duration overflow in '{}'", s))?;
        }
        if tokens == 0 {
            return Err(format!("invalid duration '{}'", s));
        }
        Ok(TimeDiff(total))
    }
}

impl Serialize for TimeDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeDiff {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployHeader {
    pub account: PublicKey,
    pub timestamp: Timestamp,
    pub ttl: TimeDiff,
    pub gas_price: u64,
    pub body_hash: Digest,
    pub dependencies: Vec<DeployHash>,
    pub chain_name: String,
}

impl ToBytes for DeployHeader {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        self.account.write_bytes(writer);
        self.timestamp.0.write_bytes(writer);
        self.ttl.0.write_bytes(writer);
        self.gas_price.write_bytes(writer);
        self.body_hash.write_bytes(writer);
        (self.dependencies.len() as u32).write_bytes(writer);
        for dep in &self.dependencies {
            dep.write_bytes(writer);
        }
        self.chain_name.write_bytes(writer);
    }
}

/// Session or payment code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutableDeployItem {
    ModuleBytes {
        #[serde(with = "hex_bytes")]
        module_bytes: Vec<u8>,
        args: RuntimeArgs,
    },
    StoredContractByHash {
        #[serde(with = "hex_32")]
        hash: [u8; 32],
        entry_point: String,
        args: RuntimeArgs,
    },
}

impl ExecutableDeployItem {
    /// Empty module bytes with an `amount` argument: the ledger's standard
    /// payment.
    pub fn standard_payment(amount: u64) -> Self {
        let mut args = RuntimeArgs::new();
        args.insert("amount", CLValue::u512(amount));
        ExecutableDeployItem::ModuleBytes {
            module_bytes: Vec::new(),
            args,
        }
    }

    pub fn args(&self) -> &RuntimeArgs {
        match self {
            ExecutableDeployItem::ModuleBytes { args, .. } => args,
            ExecutableDeployItem::StoredContractByHash { args, .. } => args,
        }
    }
}

impl ToBytes for ExecutableDeployItem {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        match self {
            ExecutableDeployItem::ModuleBytes { module_bytes, args } => {
                writer.push(0);
                write_byte_slice(module_bytes, writer);
                args.write_bytes(writer);
            }
            ExecutableDeployItem::StoredContractByHash {
                hash,
                entry_point,
                args,
            } => {
                writer.push(1);
                hash.write_bytes(writer);
                entry_point.write_bytes(writer);
                args.write_bytes(writer);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Approval {
    pub signer: PublicKey,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub hash: DeployHash,
    pub header: DeployHeader,
    pub payment: ExecutableDeployItem,
    pub session: ExecutableDeployItem,
    #[serde(default)]
    pub approvals: Vec<Approval>,
}

pub fn body_hash(payment: &ExecutableDeployItem, session: &ExecutableDeployItem) -> Digest {
    let mut bytes = payment.to_bytes();
    session.write_bytes(&mut bytes);
    Digest::hash(&bytes)
}

impl Deploy {
    pub fn new(
        account: PublicKey,
        timestamp: Timestamp,
        ttl: TimeDiff,
        gas_price: u64,
        chain_name: String,
        payment: ExecutableDeployItem,
        session: ExecutableDeployItem,
    ) -> Self {
        let header = DeployHeader {
            account,
            timestamp,
            ttl,
            gas_price,
            body_hash: body_hash(&payment, &session),
            dependencies: Vec::new(),
            chain_name,
        };
        let hash = DeployHash(Digest::hash(&header.to_bytes()));
        Deploy {
            hash,
            header,
            payment,
            session,
            approvals: Vec::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.approvals.is_empty()
    }

    /// Adds an approval, keeping the set sorted and free of duplicates.
    /// The hash is not touched.
    pub fn add_approval(&mut self, approval: Approval) {
        if let Err(pos) = self.approvals.binary_search(&approval) {
            self.approvals.insert(pos, approval);
        }
    }

    pub fn sign(&mut self, keypair: &KeyPair) {
        let signature = keypair.sign_hex(&self.hash.0 .0);
        self.add_approval(Approval {
            signer: keypair.public_key(),
            signature,
        });
    }

    /// Recomputes both hashes and checks every approval signature.
    pub fn validate(&self) -> Result<()> {
        let expected_body = body_hash(&self.payment, &self.session);
        if expected_body != self.header.body_hash {
            return Err(RecoveryError::HashMismatch(
                expected_body.to_string(),
                self.header.body_hash.to_string(),
            ));
        }
        let expected_hash = DeployHash(Digest::hash(&self.header.to_bytes()));
        if expected_hash != self.hash {
            return Err(RecoveryError::HashMismatch(
                expected_hash.to_hex(),
                self.hash.to_hex(),
            ));
        }
        for approval in &self.approvals {
            if !approval.signer.verify(&self.hash.0 .0, &approval.signature) {
                return Err(RecoveryError::InvalidApproval(approval.signer.to_hex()));
            }
        }
        Ok(())
    }

    /// Checks that a deploy handed back by an external signer is the one
    /// that was sent out: same hash, valid hashes and signatures.
    pub fn ensure_unchanged(&self, original: &DeployHash) -> Result<()> {
        if &self.hash != original {
            return Err(RecoveryError::HashMismatch(original.to_hex(), self.hash.to_hex()));
        }
        self.validate()
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| RecoveryError::Deserialization(e.to_string()))
    }
}
