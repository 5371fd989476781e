//! Stage Client: the host-provided capability a stage executor runs against.
//!
//! A stage executor never talks to the control plane directly. Everything it
//! needs from the host goes through [`StageClient`]:
//!
//! - per-stage metadata (small durable key/value state that survives restarts)
//! - the user-facing stage log
//! - the stream of commands (e.g. "approve-stage") issued against the stage
//!
//! ## Key Components
//!
//! - `StageClient`: the capability trait
//! - `StageCommand` / `CommandKind`: the command model
//! - `MemoryStageClient`: in-memory fake for tests
//! - `FileStageClient`: stage state persisted as a JSON document on disk

mod command;
mod error;
pub mod fakes;
pub mod file;
pub mod stage_client;

pub use command::{CommandKind, StageCommand};
pub use error::{ClientError, ClientResult};
pub use fakes::{LogLevel, LogLine, MemoryStageClient};
pub use file::{FileStageClient, StageState};
pub use stage_client::{CommandStream, StageClient};
