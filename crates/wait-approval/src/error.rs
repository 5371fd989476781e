//! Error types for the wait-approval stage.

/// Reasons a stage configuration is rejected.
///
/// Rules are checked in declaration order and the first failure wins.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to unmarshal the config: {0}")]
    Unmarshal(#[source] serde_json::Error),

    #[error("approvers must be set")]
    MissingApprovers,

    #[error("minApproverNum must be greater than 0")]
    NonPositiveMinApproverNum { min_approver_num: i64 },

    #[error("minApproverNum must be less than or equal to the number of approvers")]
    MinApproverNumExceedsApprovers {
        min_approver_num: usize,
        approvers: usize,
    },
}

/// Result type for configuration decoding.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
