use super::{print_json, write_json};
use crate::actions::RecoveryAction;
use crate::error::Result;
use crate::service::RecoveryService;
use std::path::PathBuf;
use tracing::info;

/// Builds the unsigned deploy for `action`, prints the prepared payload
/// and optionally writes the bare deploy for the signer.
pub async fn handle_prepare(
    service: &RecoveryService,
    caller: &str,
    action: RecoveryAction,
    out: Option<PathBuf>,
) -> Result<()> {
    let prepared = service.prepare(caller, &action, None).await?;
    if let Some(path) = out {
        write_json(&path, &prepared.deploy)?;
        info!("Deploy {} written to {}", prepared.deploy.hash, path.display());
    }
    print_json(&prepared)
}
