use super::print_json;
use crate::crypto::KeyPair;
use crate::error::{InvalidArgument, Result};
use serde_json::json;

/// Loads a signing key from exactly one of the two sources.
pub fn load_keypair(secret_key: Option<&str>, mnemonic: Option<&str>) -> Result<KeyPair> {
    match (secret_key, mnemonic) {
        (Some(hex), _) => Ok(KeyPair::from_secret_hex(hex)?),
        (None, Some(phrase)) => Ok(KeyPair::from_mnemonic(phrase)?),
        (None, None) => Err(InvalidArgument::InvalidKey(
            String::new(),
            "pass --secret-key or --mnemonic".to_string(),
        )
        .into()),
    }
}

pub fn handle_keygen() -> Result<()> {
    let mnemonic = KeyPair::generate_mnemonic();
    let keypair = KeyPair::from_mnemonic(&mnemonic)?;
    let public_key = keypair.public_key();
    print_json(&json!({
        "public_key": public_key.to_hex(),
        "account_hash": public_key.account_hash().to_formatted_string(),
        "mnemonic": mnemonic,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_keypair_sources() {
        assert!(load_keypair(None, None).is_err());
        let phrase = KeyPair::generate_mnemonic();
        let a = load_keypair(None, Some(&phrase)).unwrap();
        let b = load_keypair(None, Some(&phrase)).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }
}
