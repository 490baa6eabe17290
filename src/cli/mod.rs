pub mod actions;
pub mod keys;
pub mod query;
pub mod tx;

use crate::error::{RecoveryError, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "guardian-recovery")]
#[command(about = "Guardian social recovery: build deploys and read recovery state", long_about = None)]
pub struct Cli {
    /// Config file; created with defaults when missing
    #[arg(long, default_value = "recovery.toml")]
    pub config: String,

    /// Override node.rpc_url
    #[arg(long)]
    pub node_url: Option<String>,

    /// Override chain.chain_name
    #[arg(long)]
    pub chain_name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register guardians and an approval threshold for the caller's account
    Register {
        /// Owner public key (hex)
        #[arg(long)]
        caller: String,
        /// Guardian public key or account hash; repeat for each guardian
        #[arg(long = "guardian", required = true)]
        guardians: Vec<String>,
        #[arg(long)]
        threshold: u8,
        /// Also write the deploy JSON here for the signer
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Start recovering an account onto a new key
    Initiate {
        #[arg(long)]
        caller: String,
        /// Account to recover (public key or account hash)
        #[arg(long)]
        account: String,
        #[arg(long)]
        new_key: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Approve a recovery as a guardian
    Approve {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Ask the registry whether a recovery met its threshold
    Check {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Finalize {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Add an associated key to the caller's account
    AddKey {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        new_key: String,
        #[arg(long, default_value_t = 1)]
        weight: u8,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    RemoveKey {
        #[arg(long)]
        caller: String,
        /// Associated key to remove (public key or account hash)
        #[arg(long)]
        key: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Set the caller's deployment and key-management thresholds
    Thresholds {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        deployment: u8,
        #[arg(long)]
        key_management: u8,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show an account's guardians and threshold
    Guardians { account: String },
    /// Show a recovery request
    Recovery { id: u64 },
    /// List unfinalized recoveries a guardian is asked to approve
    Pending { guardian: String },
    /// Show associated keys and action thresholds
    Account { account: String },
    /// Sign a deploy file with a local key
    Sign {
        #[arg(long)]
        deploy: PathBuf,
        #[arg(long, conflicts_with = "mnemonic")]
        secret_key: Option<String>,
        #[arg(long)]
        mnemonic: Option<String>,
        /// Defaults to overwriting the input file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Submit a signed deploy
    Submit {
        #[arg(long)]
        deploy: PathBuf,
        /// Hash the deploy was prepared with; rejects anything else
        #[arg(long)]
        expected_hash: Option<String>,
        /// Bypass response schema checks and report failures as data
        #[arg(long)]
        raw: bool,
    },
    /// One-shot execution status
    Status { hash: String },
    /// Poll until the deploy executes or the timeout passes
    Wait {
        hash: String,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Generate a local ed25519 key
    Keygen,
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{}", text);
    Ok(())
}

pub fn write_json<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).map_err(|e| RecoveryError::FileNotFound {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub fn read_json(path: &PathBuf) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path).map_err(|e| RecoveryError::FileNotFound {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| RecoveryError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_guardian_flags() {
        let cli = Cli::try_parse_from([
            "guardian-recovery",
            "register",
            "--caller",
            "01aa",
            "--guardian",
            "g1",
            "--guardian",
            "g2",
            "--threshold",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Register {
                guardians,
                threshold,
                ..
            } => {
                assert_eq!(guardians, vec!["g1", "g2"]);
                assert_eq!(threshold, 2);
            }
            _ => panic!("wrong command"),
        }
        assert_eq!(cli.config, "recovery.toml");
    }

    #[test]
    fn test_subcommand_set() {
        use clap::CommandFactory;
        let mut names: Vec<String> = Cli::command()
            .get_subcommands()
            .map(|c| c.get_name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "account", "add-key", "approve", "check", "finalize", "guardians", "initiate",
                "keygen", "pending", "recovery", "register", "remove-key", "sign", "status",
                "submit", "thresholds", "wait",
            ]
        );
    }

    #[test]
    fn test_offline_commands_parse_without_node_flags() {
        let cli = Cli::try_parse_from(["guardian-recovery", "keygen"]).unwrap();
        assert!(matches!(cli.command, Commands::Keygen));
        assert!(cli.node_url.is_none());
    }

    #[test]
    fn test_sign_key_sources_conflict() {
        let parsed = Cli::try_parse_from([
            "guardian-recovery",
            "sign",
            "--deploy",
            "d.json",
            "--secret-key",
            "00",
            "--mnemonic",
            "words",
        ]);
        assert!(parsed.is_err());
    }
}
