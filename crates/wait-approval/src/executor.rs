//! Wait-approval stage executor.
//!
//! Lifecycle:
//!
//! ```text
//! Starting --decode ok--> Polling --tick--> Tallying --quorum--> Success
//!    |                       ^                 |
//!    | decode error          +---- not yet ----+
//!    v
//! Failure <------------- cancellation (any state)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stage_client::{ClientResult, CommandKind, StageClient};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, instrument, warn};

use crate::approvers::ApproverSet;
use crate::error::ConfigResult;
use crate::options::StageOptions;
use crate::signal::StopSignal;
use crate::tally::{tally, TallyEvent, TallyOutcome};

/// Metadata key holding the serialized approver set.
pub const APPROVED_USERS_KEY: &str = "approved-users";

/// Metadata key holding the human-readable approval summary.
pub const STAGE_DISPLAY_KEY: &str = "stage-display";

/// Default time between two tally passes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Status of a stage as seen by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Still waiting for approvals.
    Running,
    /// Quorum met.
    Success,
    /// Cancelled, or the stage could not start.
    Failure,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StageStatus::Running)
    }
}

/// Executor tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Time between tally passes. The first pass happens one interval after
    /// start, not immediately.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ExecutorConfig {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

/// One running instance of the wait-approval stage.
pub struct WaitApprovalExecutor {
    client: Arc<dyn StageClient>,
    options: StageOptions,
    approvers: ApproverSet,
    config: ExecutorConfig,
    // Set when a persist attempt failed; the next pass writes again.
    unpersisted: bool,
}

impl std::fmt::Debug for WaitApprovalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitApprovalExecutor")
            .field("stage_id", &self.client.stage_id())
            .field("options", &self.options)
            .field("approvers", &self.approvers)
            .field("config", &self.config)
            .finish()
    }
}

impl WaitApprovalExecutor {
    /// Starting state: decode the raw config and load prior progress.
    ///
    /// A decode failure is logged to the stage log and returned.
    pub async fn start(
        client: Arc<dyn StageClient>,
        raw_config: &[u8],
        config: ExecutorConfig,
    ) -> ConfigResult<Self> {
        let options = match StageOptions::decode(raw_config) {
            Ok(options) => options,
            Err(e) => {
                warn!(stage_id = %client.stage_id(), error = %e, "invalid wait-approval config");
                client.log_error(&format!("Failed to decode stage config: {e}"));
                return Err(e);
            }
        };
        Ok(Self::with_options(client, options, config).await)
    }

    /// Starting state for options that were already decoded.
    pub async fn with_options(
        client: Arc<dyn StageClient>,
        options: StageOptions,
        config: ExecutorConfig,
    ) -> Self {
        let approvers = load_approvers(client.as_ref()).await;
        Self {
            client,
            options,
            approvers,
            config,
            unpersisted: false,
        }
    }

    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    /// Approvers recorded so far.
    pub fn approvers(&self) -> &ApproverSet {
        &self.approvers
    }

    /// Run until quorum or cancellation.
    ///
    /// A cancellation seen at any point returns `Failure`, even when the
    /// last pass met the quorum and recorded it in `approved-users`. A
    /// restarted stage then reaches `Success` on its first pass.
    #[instrument(
        skip_all,
        fields(
            stage_id = %self.client.stage_id(),
            required = self.options.min_approver_num()
        )
    )]
    pub async fn run(mut self, mut stop: StopSignal) -> StageStatus {
        let required = self.options.min_approver_num();
        info!(event = "approval.waiting", approved = self.approvers.len(), "waiting for approvals");
        self.client.log_info(&format!(
            "Waiting for approval from at least {required} user(s)..."
        ));

        let period = if self.config.poll_interval.is_zero() {
            warn!("poll interval of zero, using the default");
            DEFAULT_POLL_INTERVAL
        } else {
            self.config.poll_interval
        };
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => return self.cancelled(),
                _ = ticker.tick() => {}
            }

            let pass = tokio::select! {
                biased;
                _ = stop.stopped() => return self.cancelled(),
                pass = self.tally_pass() => pass,
            };
            let status = self.settle(pass, &stop).await;
            if stop.is_stopped() {
                return self.cancelled();
            }
            if status.is_terminal() {
                return status;
            }
        }
    }

    /// One Tallying pass outside the cadence loop.
    pub async fn poll_once(&mut self) -> StageStatus {
        let pass = self.tally_pass().await;
        self.settle(pass, &StopSignal::never()).await
    }

    async fn tally_pass(&self) -> ClientResult<TallyOutcome> {
        let commands = self
            .client
            .list_stage_commands(&[CommandKind::ApproveStage])
            .await;
        tally(self.options.min_approver_num(), commands, &self.approvers).await
    }

    /// Apply one tally pass: log, persist, acknowledge, decide.
    ///
    /// The completion line lists the approvers in parentheses without the
    /// `Approved by:` prefix that `stage-display` carries. Once `stop` has
    /// fired nothing else is written and `Running` is returned for the caller
    /// to turn into a cancellation.
    async fn settle(&mut self, pass: ClientResult<TallyOutcome>, stop: &StopSignal) -> StageStatus {
        let outcome = match pass {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(event = "approval.stream_error", error = %e, "tally pass aborted");
                self.client
                    .log_error(&format!("Failed to list approval commands: {e}"));
                return StageStatus::Running;
            }
        };

        for event in &outcome.events {
            match event {
                TallyEvent::Accepted(user) => {
                    info!(event = "approval.accepted", approver = %user);
                    self.client.log_info(&format!("Got approval from {user}"));
                }
                TallyEvent::Duplicate(user) => {
                    info!(event = "approval.duplicate", approver = %user);
                    self.client.log_info(&format!(
                        "Approval from the same user ({user}) will not be counted"
                    ));
                }
            }
        }

        let grew = outcome.approvers.len() > self.approvers.len();
        self.approvers = outcome.approvers.clone();
        if (grew || self.unpersisted) && !stop.is_stopped() {
            self.persist(&outcome.display, stop).await;
        }
        if stop.is_stopped() {
            return StageStatus::Running;
        }
        // Unacknowledged commands are listed again; the tally absorbs them.
        if !self.unpersisted {
            self.acknowledge(&outcome.handled).await;
        }

        let required = self.options.min_approver_num();
        if outcome.quorum_met {
            info!(
                event = "approval.completed",
                approved = self.approvers.len(),
                required,
                "received all needed approvals"
            );
            self.client.log_info(&format!(
                "This stage has been approved by {} user(s) ({})",
                self.approvers.len(),
                self.approvers
            ));
            return StageStatus::Success;
        }

        if grew {
            self.client.log_info(&format!(
                "Waiting for {} more approver(s)...",
                outcome.remaining(required)
            ));
        }
        StageStatus::Running
    }

    /// Write `approved-users` then `stage-display`. Failures are logged and
    /// retried on the next pass.
    async fn persist(&mut self, display: &str, stop: &StopSignal) {
        let value = self.approvers.to_metadata_value();
        let mut ok = true;

        if let Err(e) = self.client.put_metadata(APPROVED_USERS_KEY, &value).await {
            warn!(event = "approval.persist_error", key = APPROVED_USERS_KEY, error = %e);
            self.client
                .log_error(&format!("Unable to save approved users: {e}"));
            ok = false;
        }
        if stop.is_stopped() {
            self.unpersisted = true;
            return;
        }
        if let Err(e) = self.client.put_metadata(STAGE_DISPLAY_KEY, display).await {
            warn!(event = "approval.persist_error", key = STAGE_DISPLAY_KEY, error = %e);
            self.client
                .log_error(&format!("Unable to save stage display: {e}"));
            ok = false;
        }
        self.unpersisted = !ok;
    }

    async fn acknowledge(&self, handled: &[String]) {
        if handled.is_empty() {
            return;
        }
        if let Err(e) = self.client.acknowledge_commands(handled).await {
            warn!(
                event = "approval.ack_error",
                commands = handled.len(),
                error = %e,
                "commands will be listed again"
            );
        }
    }

    fn cancelled(&self) -> StageStatus {
        info!(event = "approval.cancelled", approved = self.approvers.len());
        self.client.log_info("Wait approval cancelled");
        StageStatus::Failure
    }
}

/// Decode, start and run a stage to completion.
pub async fn execute(
    client: Arc<dyn StageClient>,
    raw_config: &[u8],
    config: ExecutorConfig,
    stop: StopSignal,
) -> StageStatus {
    match WaitApprovalExecutor::start(client, raw_config, config).await {
        Ok(executor) => executor.run(stop).await,
        Err(_) => StageStatus::Failure,
    }
}

async fn load_approvers(client: &dyn StageClient) -> ApproverSet {
    match client.get_metadata(APPROVED_USERS_KEY).await {
        Ok(Some(value)) => ApproverSet::parse(&value),
        Ok(None) => ApproverSet::new(),
        Err(e) => {
            warn!(stage_id = %client.stage_id(), error = %e, "failed to load approved users");
            client.log_error(&format!(
                "Unable to load approved users, starting from none: {e}"
            ));
            ApproverSet::new()
        }
    }
}
