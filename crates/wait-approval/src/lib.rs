//! Wait-approval stage
//!
//! A pipeline stage that suspends a deployment until a configurable quorum
//! of authorized users has explicitly approved it:
//! - Decodes and validates the stage options (`approvers`, `minApproverNum`)
//! - Polls the stage's command stream for approvals on a fixed cadence
//! - Persists partial progress as stage metadata so restarts converge
//! - Reports the stage's identity and "Approve" operation to the planner

pub mod approvers;
pub mod definition;
pub mod error;
pub mod executor;
pub mod options;
pub mod signal;
pub mod tally;
pub mod telemetry;

// Re-export key types
pub use approvers::ApproverSet;
pub use definition::{build_definition, ManualOperation, StageDescriptor, STAGE_NAME};
pub use error::{ConfigError, ConfigResult};
pub use executor::{
    execute, ExecutorConfig, StageStatus, WaitApprovalExecutor, APPROVED_USERS_KEY,
    DEFAULT_POLL_INTERVAL, STAGE_DISPLAY_KEY,
};
pub use options::{StageOptions, DEFAULT_MIN_APPROVER_NUM};
pub use signal::{stop_signal, StopHandle, StopSignal};
pub use tally::{tally, TallyEvent, TallyOutcome};
pub use telemetry::init_tracing;
