//! Static stage identity reported to the pipeline planner.

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::options::StageOptions;

/// Stage name under which the planner knows this stage.
pub const STAGE_NAME: &str = "WAIT_APPROVAL";

/// Manual operations a stage can expose to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManualOperation {
    /// Users may approve the stage.
    Approve,
}

impl ManualOperation {
    pub fn name(&self) -> &'static str {
        match self {
            ManualOperation::Approve => "Approve",
        }
    }
}

/// What the planner needs to know about a wait-approval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Fixed stage name.
    pub name: String,
    /// Manual operations offered in the UI.
    pub manual_operations: Vec<ManualOperation>,
    /// Users allowed to perform those operations.
    pub authorized_operators: Vec<String>,
}

impl StageDescriptor {
    /// Whether the stage offers `op`.
    pub fn exposes(&self, op: ManualOperation) -> bool {
        self.manual_operations.contains(&op)
    }
}

impl From<&StageOptions> for StageDescriptor {
    fn from(options: &StageOptions) -> Self {
        Self {
            name: STAGE_NAME.to_string(),
            manual_operations: vec![ManualOperation::Approve],
            authorized_operators: options.approvers().to_vec(),
        }
    }
}

/// Build the descriptor for a raw stage config.
///
/// Fails with the same errors as [`StageOptions::decode`].
pub fn build_definition(raw_config: &[u8]) -> ConfigResult<StageDescriptor> {
    let options = StageOptions::decode(raw_config)?;
    Ok(StageDescriptor::from(&options))
}
