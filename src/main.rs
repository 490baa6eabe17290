use clap::Parser;
use guardian_recovery::actions::RecoveryAction;
use guardian_recovery::cli::{self, Cli, Commands};
use guardian_recovery::client::RpcClient;
use guardian_recovery::config::RecoveryConfig;
use guardian_recovery::error::Result;
use guardian_recovery::service::RecoveryService;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging is not up yet, so a config failure goes straight to stderr.
    let mut config = match RecoveryConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(url) = &cli.node_url {
        config.node.rpc_url = url.clone();
    }
    if let Some(chain) = &cli.chain_name {
        config.chain.chain_name = chain.clone();
    }

    // RUST_LOG wins over the configured level. Logs go to stderr; stdout
    // carries JSON output only.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    debug!("Config loaded from {}", cli.config);

    if let Err(e) = run(cli.command, &config).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_service(config: &RecoveryConfig) -> Result<RecoveryService> {
    let client = RpcClient::from_config(&config.node)?;
    let raw = client.raw_client();
    debug!("Using node {} on {}", client.url(), config.chain.chain_name);
    Ok(RecoveryService::from_config(config, Arc::new(client))?.with_raw_client(raw))
}

/// Dispatches one command. Keygen and Sign never touch the node, so the
/// service is only built by the arms that need it.
async fn run(command: Commands, config: &RecoveryConfig) -> Result<()> {
    let service = || build_service(config);
    match command {
        Commands::Keygen => cli::keys::handle_keygen(),
        Commands::Sign {
            deploy,
            secret_key,
            mnemonic,
            out,
        } => cli::tx::handle_sign(deploy, secret_key, mnemonic, out),
        Commands::Register {
            caller,
            guardians,
            threshold,
            out,
        } => {
            let action = RecoveryAction::RegisterGuardians {
                guardians,
                threshold,
            };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::Initiate {
            caller,
            account,
            new_key,
            out,
        } => {
            let action = RecoveryAction::InitiateRecovery { account, new_key };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::Approve { caller, id, out } => {
            let action = RecoveryAction::ApproveRecovery { recovery_id: id };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::Check { caller, id, out } => {
            let action = RecoveryAction::CheckThreshold { recovery_id: id };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::Finalize { caller, id, out } => {
            let action = RecoveryAction::FinalizeRecovery { recovery_id: id };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::AddKey {
            caller,
            new_key,
            weight,
            out,
        } => {
            let action = RecoveryAction::RotateAddKey { new_key, weight };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::RemoveKey { caller, key, out } => {
            let action = RecoveryAction::RotateRemoveKey { key };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::Thresholds {
            caller,
            deployment,
            key_management,
            out,
        } => {
            let action = RecoveryAction::UpdateThresholds {
                deployment,
                key_management,
            };
            cli::actions::handle_prepare(&service()?, &caller, action, out).await
        }
        Commands::Guardians { account } => cli::query::handle_guardians(&service()?, &account).await,
        Commands::Recovery { id } => cli::query::handle_recovery(&service()?, id).await,
        Commands::Pending { guardian } => cli::query::handle_pending(&service()?, &guardian).await,
        Commands::Account { account } => cli::query::handle_account(&service()?, &account).await,
        Commands::Submit {
            deploy,
            expected_hash,
            raw,
        } => cli::tx::handle_submit(&service()?, deploy, expected_hash, raw).await,
        Commands::Status { hash } => cli::tx::handle_status(&service()?, &hash).await,
        Commands::Wait { hash, timeout_secs } => {
            cli::tx::handle_wait(&service()?, &hash, timeout_secs).await
        }
    }
}
