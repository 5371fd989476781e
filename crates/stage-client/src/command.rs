//! Commands issued by users against a running stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a stage command, serialized in kebab-case (`"approve-stage"`).
///
/// Kinds this crate does not know about are preserved verbatim in
/// [`CommandKind::Other`] so a newer host never breaks an older executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommandKind {
    /// A user consents to the stage proceeding.
    ApproveStage,
    /// A user asks the pipeline to cancel the stage.
    CancelStage,
    /// A user asks the pipeline to skip the stage.
    SkipStage,
    /// Any other command kind.
    Other(String),
}

impl CommandKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            CommandKind::ApproveStage => "approve-stage",
            CommandKind::CancelStage => "cancel-stage",
            CommandKind::SkipStage => "skip-stage",
            CommandKind::Other(s) => s,
        }
    }
}

impl From<String> for CommandKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "approve-stage" => CommandKind::ApproveStage,
            "cancel-stage" => CommandKind::CancelStage,
            "skip-stage" => CommandKind::SkipStage,
            _ => CommandKind::Other(s),
        }
    }
}

impl From<CommandKind> for String {
    fn from(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for CommandKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommandKind::from(s.to_string()))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command delivered on a stage's command stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCommand {
    /// Unique command identifier.
    pub id: String,
    /// Stage instance the command targets.
    pub stage_id: String,
    /// User who issued the command.
    pub commander: String,
    /// What the command asks for.
    pub kind: CommandKind,
    /// When the command was issued.
    pub created_at: DateTime<Utc>,
}

impl StageCommand {
    /// Create a new command with a random id, stamped now.
    pub fn new(
        stage_id: impl Into<String>,
        commander: impl Into<String>,
        kind: CommandKind,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            stage_id: stage_id.into(),
            commander: commander.into(),
            kind,
            created_at: Utc::now(),
        }
    }

    /// Shorthand for an approve-stage command.
    pub fn approve(stage_id: impl Into<String>, commander: impl Into<String>) -> Self {
        Self::new(stage_id, commander, CommandKind::ApproveStage)
    }

    /// Whether this command is an approval.
    pub fn is_approval(&self) -> bool {
        self.kind == CommandKind::ApproveStage
    }
}
