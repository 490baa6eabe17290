use super::print_json;
use crate::error::Result;
use crate::service::RecoveryService;
use serde_json::json;

pub async fn handle_guardians(service: &RecoveryService, account: &str) -> Result<()> {
    let status = service.guardian_status(account).await?;
    print_json(&status)
}

pub async fn handle_recovery(service: &RecoveryService, id: u64) -> Result<()> {
    match service.get_recovery(id).await? {
        Some(request) => print_json(&request),
        None => print_json(&json!({ "id": id, "found": false })),
    }
}

pub async fn handle_pending(service: &RecoveryService, guardian: &str) -> Result<()> {
    let pending = service.get_recoveries_for_guardian(guardian).await?;
    print_json(&pending)
}

pub async fn handle_account(service: &RecoveryService, account: &str) -> Result<()> {
    match service.account_info(account).await? {
        Some(info) => print_json(&info),
        None => print_json(&json!({ "account": account, "found": false })),
    }
}
