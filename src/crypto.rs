use crate::encoding::ToBytes;
use crate::error::InvalidArgument;
use bip39::{Language, Mnemonic};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const ED25519_TAG: u8 = 1;
pub const SECP256K1_TAG: u8 = 2;
const ACCOUNT_HASH_PREFIX: &str = "account-hash-";

type Blake2b256 = Blake2b<U32>;

/// The ledger's digest: blake2b with a 32-byte output.
pub fn blake2b256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A ledger public key, hex encoded with a one-byte algorithm tag.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PublicKey {
    Ed25519([u8; 32]),
    Secp256k1([u8; 33]),
}

impl PublicKey {
    pub fn from_hex(input: &str) -> Result<Self, InvalidArgument> {
        let invalid = |reason: &str| InvalidArgument::InvalidKey(input.to_string(), reason.to_string());
        let bytes = hex::decode(input.trim()).map_err(|e| invalid(&e.to_string()))?;
        let (tag, raw) = bytes.split_first().ok_or_else(|| invalid("empty key"))?;
        match *tag {
            ED25519_TAG => {
                let raw: [u8; 32] = raw
                    .try_into()
                    .map_err(|_| invalid("ed25519 keys are 32 bytes"))?;
                VerifyingKey::from_bytes(&raw).map_err(|e| invalid(&e.to_string()))?;
                Ok(PublicKey::Ed25519(raw))
            }
            SECP256K1_TAG => {
                let raw: [u8; 33] = raw
                    .try_into()
                    .map_err(|_| invalid("secp256k1 keys are 33 bytes (compressed)"))?;
                k256::PublicKey::from_sec1_bytes(&raw).map_err(|e| invalid(&e.to_string()))?;
                Ok(PublicKey::Secp256k1(raw))
            }
            other => Err(invalid(&format!("unknown algorithm tag {:#04x}", other))),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            PublicKey::Ed25519(_) => ED25519_TAG,
            PublicKey::Secp256k1(_) => SECP256K1_TAG,
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            PublicKey::Ed25519(_) => "ed25519",
            PublicKey::Secp256k1(_) => "secp256k1",
        }
    }

    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(raw) => raw,
            PublicKey::Secp256k1(raw) => raw,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("{:02x}{}", self.tag(), hex::encode(self.raw_bytes()))
    }

    /// blake2b256(algorithm name || 0x00 || raw key bytes)
    pub fn account_hash(&self) -> AccountHash {
        let name = self.algorithm_name().as_bytes();
        let mut preimage = Vec::with_capacity(name.len() + 1 + self.raw_bytes().len());
        preimage.extend_from_slice(name);
        preimage.push(0);
        preimage.extend_from_slice(self.raw_bytes());
        AccountHash(blake2b256(&preimage))
    }

    /// Checks a tagged hex signature over `message`.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Some((tag, raw)) = bytes.split_first() else {
            return false;
        };
        if *tag != self.tag() {
            return false;
        }
        match self {
            PublicKey::Ed25519(pk) => {
                let (Ok(key), Ok(sig)) = (
                    VerifyingKey::from_bytes(pk),
                    <[u8; 64]>::try_from(raw),
                ) else {
                    return false;
                };
                key.verify(message, &ed25519_dalek::Signature::from_bytes(&sig))
                    .is_ok()
            }
            PublicKey::Secp256k1(pk) => {
                use k256::ecdsa::signature::Verifier as _;
                let (Ok(key), Ok(sig)) = (
                    k256::ecdsa::VerifyingKey::from_sec1_bytes(pk),
                    k256::ecdsa::Signature::from_slice(raw),
                ) else {
                    return false;
                };
                key.verify(message, &sig).is_ok()
            }
        }
    }
}

impl ToBytes for PublicKey {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.push(self.tag());
        writer.extend_from_slice(self.raw_bytes());
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = InvalidArgument;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicKey::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The ledger's canonical account identifier.
///
/// `Display` is bare lowercase hex and `Debug` is `AccountHash(<hex>)`;
/// both forms are embedded verbatim in storage keys written by the
/// deployed contract, so neither may change.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountHash(pub [u8; 32]);

impl AccountHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_formatted_string(&self) -> String {
        format!("{}{}", ACCOUNT_HASH_PREFIX, self.to_hex())
    }

    /// Accepts `account-hash-<hex>` or bare hex, in any letter case.
    pub fn from_hex(input: &str) -> Result<Self, InvalidArgument> {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        let hex_part = lower.strip_prefix(ACCOUNT_HASH_PREFIX).unwrap_or(&lower);
        let bytes = hex::decode(hex_part)
            .map_err(|_| InvalidArgument::InvalidAccountHash(input.to_string()))?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidArgument::InvalidAccountHash(input.to_string()))?;
        Ok(AccountHash(raw))
    }
}

impl ToBytes for AccountHash {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.0);
    }
}

impl fmt::Display for AccountHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for AccountHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountHash({})", self.to_hex())
    }
}

impl FromStr for AccountHash {
    type Err = InvalidArgument;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountHash::from_hex(s)
    }
}

impl Serialize for AccountHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_formatted_string())
    }
}

impl<'de> Deserialize<'de> for AccountHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AccountHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Resolves a user-supplied identity (public key hex or account hash) to an
/// account hash. Public keys are tried first since their hex is longer.
pub fn parse_account(input: &str) -> Result<AccountHash, InvalidArgument> {
    let trimmed = input.trim();
    if trimmed.to_ascii_lowercase().starts_with(ACCOUNT_HASH_PREFIX) || trimmed.len() == 64 {
        return AccountHash::from_hex(trimmed);
    }
    Ok(PublicKey::from_hex(trimmed)?.account_hash())
}

/// Local ed25519 signer, used by the CLI and tests. Production signing
/// happens in the wallet.
pub struct KeyPair {
    pub signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        KeyPair {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Generate a new 12-word mnemonic
    pub fn generate_mnemonic() -> String {
        let mut entropy = [0u8; 16];
        OsRng.fill_bytes(&mut entropy);
        match Mnemonic::from_entropy(&entropy) {
            Ok(m) => m.to_string(),
            Err(_) => unreachable!("16 bytes is valid BIP39 entropy"),
        }
    }

    /// Restore keypair from mnemonic
    pub fn from_mnemonic(phrase: &str) -> Result<Self, InvalidArgument> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| InvalidArgument::InvalidKey("<mnemonic>".to_string(), e.to_string()))?;
        let seed = mnemonic.to_seed("");
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&seed[0..32]);
        Ok(KeyPair {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, InvalidArgument> {
        let invalid = |reason: &str| InvalidArgument::InvalidKey("<secret>".to_string(), reason.to_string());
        let bytes = hex::decode(secret_hex.trim()).map_err(|e| invalid(&e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| invalid("ed25519 secret keys are 32 bytes"))?;
        Ok(KeyPair {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::Ed25519(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign and return tagged hex, the ledger's signature format
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        format!("{:02x}{}", ED25519_TAG, hex::encode(signature.to_bytes()))
    }
}
