//! Deploy lifecycle tracking.
//!
//! The ledger pushes nothing, so completion is detected by polling
//! `info_get_deploy` on a fixed interval until an execution result shows
//! up or the timeout passes. Dropping the returned future cancels it.

use crate::client::{DeployRecord, ExecutionOutcome, ExecutionStatus, LedgerGateway};
use crate::config::TrackerConfig;
use crate::deploy::DeployHash;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// State of one deploy as seen by the tracker: `Pending` until the first
/// terminal outcome, then frozen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDeploy {
    deploy_hash: DeployHash,
    outcome: ExecutionOutcome,
    block_hash: Option<String>,
    polls: u32,
    last_error: Option<String>,
}

impl TrackedDeploy {
    pub fn new(deploy_hash: DeployHash) -> Self {
        Self {
            deploy_hash,
            outcome: ExecutionOutcome::pending(),
            block_hash: None,
            polls: 0,
            last_error: None,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.outcome.status
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Applies one poll result. Returns true only on the transition into a
    /// terminal state; records seen after that are ignored.
    pub fn observe(&mut self, record: DeployRecord) -> bool {
        self.polls += 1;
        if self.is_terminal() || !record.outcome.is_terminal() {
            return false;
        }
        self.outcome = record.outcome;
        self.block_hash = record.block_hash;
        true
    }

    fn poll_failed(&mut self, error: String) {
        self.polls += 1;
        self.last_error = Some(error);
    }

    fn into_outcome(self, waited: Duration) -> TrackOutcome {
        match self.outcome.status {
            ExecutionStatus::Success => TrackOutcome::Success {
                deploy_hash: self.deploy_hash,
                block_hash: self.block_hash,
            },
            ExecutionStatus::Failed => TrackOutcome::Failed {
                deploy_hash: self.deploy_hash,
                error_message: self.outcome.error_message.unwrap_or_default(),
                block_hash: self.block_hash,
            },
            ExecutionStatus::Pending => TrackOutcome::TimedOut {
                deploy_hash: self.deploy_hash,
                waited_ms: waited.as_millis() as u64,
                last_error: self.last_error,
            },
        }
    }
}

/// How waiting on a deploy ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackOutcome {
    Success {
        deploy_hash: DeployHash,
        #[serde(skip_serializing_if = "Option::is_none")]
        block_hash: Option<String>,
    },
    /// Executed and reverted; `error_message` is the ledger's own text.
    Failed {
        deploy_hash: DeployHash,
        error_message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        block_hash: Option<String>,
    },
    /// No result before the deadline. The deploy may still execute.
    TimedOut {
        deploy_hash: DeployHash,
        waited_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_error: Option<String>,
    },
}

impl TrackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TrackOutcome::Success { .. })
    }

    /// Same three-state view the gateway reports; a timeout is still pending.
    pub fn execution_outcome(&self) -> ExecutionOutcome {
        match self {
            TrackOutcome::Success { .. } => ExecutionOutcome::success(),
            TrackOutcome::Failed { error_message, .. } => {
                ExecutionOutcome::failed(error_message.clone())
            }
            TrackOutcome::TimedOut { .. } => ExecutionOutcome::pending(),
        }
    }
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct DeployTracker {
    gateway: Arc<dyn LedgerGateway>,
    interval: Duration,
    timeout: Duration,
}

impl DeployTracker {
    /// `interval` is raised to at least one millisecond.
    pub fn new(gateway: Arc<dyn LedgerGateway>, interval: Duration, timeout: Duration) -> Self {
        Self {
            gateway,
            interval: interval.max(MIN_POLL_INTERVAL),
            timeout,
        }
    }

    pub fn from_config(gateway: Arc<dyn LedgerGateway>, config: &TrackerConfig) -> Self {
        Self::new(
            gateway,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// One poll, no waiting.
    pub async fn status(&self, deploy_hash: &DeployHash) -> Result<DeployRecord> {
        self.gateway.get_deploy(deploy_hash).await
    }

    pub async fn wait(&self, deploy_hash: &DeployHash) -> TrackOutcome {
        self.wait_with_timeout(deploy_hash, self.timeout).await
    }

    /// Polls until a terminal outcome or `timeout`. Transport and RPC errors
    /// during polling are logged and retried on the next tick.
    pub async fn wait_with_timeout(&self, deploy_hash: &DeployHash, timeout: Duration) -> TrackOutcome {
        let mut tracked = TrackedDeploy::new(*deploy_hash);
        let started = tokio::time::Instant::now();

        let poll = async {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.gateway.get_deploy(deploy_hash).await {
                    Ok(record) => {
                        if tracked.observe(record) {
                            return;
                        }
                        debug!("Deploy {} still pending (poll {})", deploy_hash, tracked.polls());
                    }
                    Err(e) => {
                        warn!("Polling deploy {} failed: {}", deploy_hash, e);
                        tracked.poll_failed(e.to_string());
                    }
                }
            }
        };
        let finished = tokio::time::timeout(timeout, poll).await.is_ok();

        let outcome = tracked.into_outcome(started.elapsed());
        if finished {
            info!("Deploy {} finished: {:?}", deploy_hash, outcome.execution_outcome().status);
        } else {
            warn!("Gave up waiting for deploy {} after {:?}", deploy_hash, timeout);
        }
        outcome
    }
}
