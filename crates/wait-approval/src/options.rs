//! Stage options and their decoder.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Quorum used when `minApproverNum` is omitted from the config.
pub const DEFAULT_MIN_APPROVER_NUM: usize = 1;

/// Shape of the config blob before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStageOptions {
    #[serde(default)]
    approvers: Option<Vec<String>>,
    #[serde(default = "default_min_approver_num")]
    min_approver_num: i64,
}

fn default_min_approver_num() -> i64 {
    DEFAULT_MIN_APPROVER_NUM as i64
}

/// Validated options of one wait-approval stage instance.
///
/// Only obtainable through [`StageOptions::decode`] (or serde deserialization,
/// which runs the same rules), so every value satisfies:
/// - `approvers` is non-empty
/// - `1 <= min_approver_num <= approvers.len()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawStageOptions")]
pub struct StageOptions {
    approvers: Vec<String>,
    min_approver_num: usize,
}

impl StageOptions {
    /// Decode and validate a JSON config payload.
    pub fn decode(raw: &[u8]) -> ConfigResult<Self> {
        let raw: RawStageOptions = serde_json::from_slice(raw).map_err(ConfigError::Unmarshal)?;
        Self::try_from(raw)
    }

    /// Decode and validate an already-parsed JSON value.
    pub fn decode_value(value: serde_json::Value) -> ConfigResult<Self> {
        let raw: RawStageOptions = serde_json::from_value(value).map_err(ConfigError::Unmarshal)?;
        Self::try_from(raw)
    }

    /// Encode back into the config schema.
    pub fn encode(&self) -> serde_json::Value {
        serde_json::json!({
            "approvers": self.approvers,
            "minApproverNum": self.min_approver_num,
        })
    }

    /// Authorized approvers, in configured order.
    pub fn approvers(&self) -> &[String] {
        &self.approvers
    }

    /// Number of distinct approvals needed.
    pub fn min_approver_num(&self) -> usize {
        self.min_approver_num
    }
}

impl TryFrom<RawStageOptions> for StageOptions {
    type Error = ConfigError;

    fn try_from(raw: RawStageOptions) -> ConfigResult<Self> {
        let approvers = match raw.approvers {
            Some(approvers) if !approvers.is_empty() => approvers,
            _ => return Err(ConfigError::MissingApprovers),
        };
        if raw.min_approver_num < 1 {
            return Err(ConfigError::NonPositiveMinApproverNum {
                min_approver_num: raw.min_approver_num,
            });
        }
        // Checked above: positive and fits in usize on every supported target.
        let min_approver_num = raw.min_approver_num as usize;
        if min_approver_num > approvers.len() {
            return Err(ConfigError::MinApproverNumExceedsApprovers {
                min_approver_num,
                approvers: approvers.len(),
            });
        }
        Ok(Self {
            approvers,
            min_approver_num,
        })
    }
}
