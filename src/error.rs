use thiserror::Error;

/// Input rejected before any network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidArgument {
    #[error("Invalid public key '{0}': {1}")]
    InvalidKey(String, String),
    #[error("Invalid account hash '{0}'")]
    InvalidAccountHash(String),
    #[error("At least 2 unique guardians are required, got {0}")]
    TooFewGuardians(usize),
    #[error("Duplicate guardian: {0}")]
    DuplicateGuardian(String),
    #[error("user cannot be a guardian")]
    SelfGuardian,
    #[error("Threshold {threshold} must be between 2 and {guardians}")]
    InvalidThreshold { threshold: u8, guardians: usize },
    #[error("Weight must be greater than zero")]
    ZeroWeight,
    #[error("Action thresholds must be greater than zero")]
    ZeroActionThreshold,
    #[error("Invalid deploy hash '{0}'")]
    InvalidDeployHash(String),
    #[error("Invalid contract hash '{0}'")]
    InvalidContractHash(String),
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error("Executable not found at '{path}': {reason}")]
    FileNotFound { path: String, reason: String },
    #[error("RPC request failed: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Hash mismatch: expected {0}, got {1}")]
    HashMismatch(String, String),
    #[error("Invalid approval from {0}")]
    InvalidApproval(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for RecoveryError {
    fn from(e: serde_json::Error) -> Self {
        RecoveryError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for RecoveryError {
    fn from(e: reqwest::Error) -> Self {
        RecoveryError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
