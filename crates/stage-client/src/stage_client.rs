//! The `StageClient` capability trait.
//!
//! Implementations are owned by the host and may be shared by many stage
//! tasks at once; each call must be safe to make concurrently.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::command::{CommandKind, StageCommand};
use crate::error::ClientResult;

/// A finite, pull-based stream of commands. Each element carries its own
/// delivery error, so one bad element does not poison the whole listing.
pub type CommandStream = BoxStream<'static, ClientResult<StageCommand>>;

/// Everything a stage executor may ask of its host.
///
/// Guarantees:
/// - `get_metadata` returns `Ok(None)` for an absent key.
/// - `put_metadata` overwrites any previous value for the key.
/// - `list_stage_commands` yields every command not yet acknowledged, in
///   delivery order. The listing may be empty. A command is listed again on
///   every call until [`acknowledge_commands`](StageClient::acknowledge_commands)
///   names it, so callers must tolerate replays.
/// - Logging is fire-and-forget and never fails the caller.
#[async_trait]
pub trait StageClient: Send + Sync {
    /// Identifier of the stage instance this client is bound to.
    fn stage_id(&self) -> &str;

    /// Read a metadata value.
    async fn get_metadata(&self, key: &str) -> ClientResult<Option<String>>;

    /// Write a metadata value.
    async fn put_metadata(&self, key: &str, value: &str) -> ClientResult<()>;

    /// List commands issued against this stage and not yet acknowledged.
    ///
    /// Implementations should honour `kinds` but callers must not rely on it.
    async fn list_stage_commands(&self, kinds: &[CommandKind]) -> CommandStream;

    /// Mark commands as handled so later listings no longer yield them.
    ///
    /// Unknown ids are ignored.
    async fn acknowledge_commands(&self, ids: &[String]) -> ClientResult<()>;

    /// Append an info line to the user-facing stage log.
    fn log_info(&self, message: &str);

    /// Append an error line to the user-facing stage log.
    fn log_error(&self, message: &str);
}
