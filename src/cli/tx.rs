use super::keys::load_keypair;
use super::{print_json, read_json, write_json};
use crate::deploy::{Deploy, DeployHash};
use crate::error::Result;
use crate::service::RecoveryService;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Accepts a bare deploy or a prepared payload (`{action, deploy, notice}`).
pub fn load_deploy(path: &PathBuf) -> Result<Deploy> {
    let mut value = read_json(path)?;
    if value.get("hash").is_none() {
        if let Some(inner) = value.get_mut("deploy") {
            value = inner.take();
        }
    }
    Deploy::from_json(value)
}

pub fn handle_sign(
    deploy_path: PathBuf,
    secret_key: Option<String>,
    mnemonic: Option<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let keypair = load_keypair(secret_key.as_deref(), mnemonic.as_deref())?;
    let mut deploy = load_deploy(&deploy_path)?;
    deploy.validate()?;
    deploy.sign(&keypair);
    let target = out.unwrap_or(deploy_path);
    write_json(&target, &deploy)?;
    info!("Signed deploy {} as {}", deploy.hash, keypair.public_key());
    print_json(&deploy)
}

pub async fn handle_submit(
    service: &RecoveryService,
    deploy_path: PathBuf,
    expected_hash: Option<String>,
    raw: bool,
) -> Result<()> {
    let deploy = load_deploy(&deploy_path)?;
    let expected = expected_hash
        .as_deref()
        .map(DeployHash::from_hex)
        .transpose()?;
    if raw {
        let result = service.submit_raw(&deploy, expected.as_ref()).await?;
        return print_json(&result);
    }
    let hash = service.submit(&deploy, expected.as_ref()).await?;
    print_json(&serde_json::json!({ "deploy_hash": hash }))
}

pub async fn handle_status(service: &RecoveryService, hash: &str) -> Result<()> {
    let hash = DeployHash::from_hex(hash)?;
    let record = service.status(&hash).await?;
    print_json(&record)
}

pub async fn handle_wait(
    service: &RecoveryService,
    hash: &str,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let hash = DeployHash::from_hex(hash)?;
    let outcome = match timeout_secs {
        Some(secs) => service.wait_with_timeout(&hash, Duration::from_secs(secs)).await,
        None => service.wait(&hash).await,
    };
    print_json(&outcome)
}
