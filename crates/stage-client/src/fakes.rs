//! In-memory fake for the stage client (testing only)
//!
//! `MemoryStageClient` satisfies the `StageClient` contract without any
//! backend. It additionally records every metadata write and log line, and
//! lets a test inject failures into reads, writes, and the command stream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::command::{CommandKind, StageCommand};
use crate::error::{ClientError, ClientResult};
use crate::stage_client::{CommandStream, StageClient};

/// Severity of a captured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

/// A line written to the stage log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// One delivery slot of a queued batch: either a command or a stream error.
type Delivery = Result<StageCommand, String>;

/// In-memory stage client.
///
/// Commands are queued in batches. Every `list_stage_commands` call releases
/// exactly one batch, which makes "tick 1 delivers X, tick 2 delivers Y"
/// scenarios easy to express. Released commands are listed again on every
/// later call until acknowledged; injected stream errors fire once.
#[derive(Debug, Default)]
pub struct MemoryStageClient {
    stage_id: String,
    metadata: Mutex<HashMap<String, String>>,
    batches: Mutex<VecDeque<Vec<Delivery>>>,
    outstanding: Mutex<Vec<StageCommand>>,
    acknowledged: Mutex<Vec<String>>,
    logs: Mutex<Vec<LogLine>>,
    writes: Mutex<Vec<(String, String)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_acks: AtomicBool,
    ignore_filter: AtomicBool,
    list_calls: AtomicUsize,
}

impl MemoryStageClient {
    pub fn new(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            ..Self::default()
        }
    }

    /// Seed a metadata value without recording it as a write.
    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.lock().unwrap().insert(key.into(), value.into());
        self
    }

    /// Queue a batch of commands for the next listing.
    pub fn push_commands(&self, commands: impl IntoIterator<Item = StageCommand>) {
        let batch = commands.into_iter().map(Ok).collect();
        self.batches.lock().unwrap().push_back(batch);
    }

    /// Queue a batch that may contain stream errors (`Err(reason)`).
    pub fn push_batch(&self, batch: Vec<Result<StageCommand, String>>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    /// Make every subsequent `get_metadata` fail.
    pub fn fail_metadata_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `put_metadata` fail.
    pub fn fail_metadata_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `acknowledge_commands` fail.
    pub fn fail_acknowledgements(&self, fail: bool) {
        self.fail_acks.store(fail, Ordering::SeqCst);
    }

    /// Deliver every queued command regardless of the requested kinds.
    pub fn ignore_kind_filter(&self, ignore: bool) {
        self.ignore_filter.store(ignore, Ordering::SeqCst);
    }

    /// Current metadata value.
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.metadata.lock().unwrap().get(key).cloned()
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    /// Every log line, in order.
    pub fn logs(&self) -> Vec<LogLine> {
        self.logs.lock().unwrap().clone()
    }

    /// Whether any log line contains `needle`.
    pub fn has_log(&self, needle: &str) -> bool {
        self.logs.lock().unwrap().iter().any(|l| l.message.contains(needle))
    }

    /// Messages of error-level log lines.
    pub fn error_lines(&self) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.level == LogLevel::Error)
            .map(|l| l.message.clone())
            .collect()
    }

    /// Number of `list_stage_commands` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Ids acknowledged so far, in order.
    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap().clone()
    }

    /// Released commands that have not been acknowledged yet.
    pub fn outstanding(&self) -> Vec<StageCommand> {
        self.outstanding.lock().unwrap().clone()
    }

    /// Number of batches still waiting to be listed.
    pub fn pending_batches(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn push_log(&self, level: LogLevel, message: &str) {
        self.logs.lock().unwrap().push(LogLine {
            level,
            message: message.to_string(),
        });
    }
}

#[async_trait]
impl StageClient for MemoryStageClient {
    fn stage_id(&self) -> &str {
        &self.stage_id
    }

    async fn get_metadata(&self, key: &str) -> ClientResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ClientError::MetadataRead {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.metadata.lock().unwrap().get(key).cloned())
    }

    async fn put_metadata(&self, key: &str, value: &str) -> ClientResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ClientError::MetadataWrite {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.metadata
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn list_stage_commands(&self, kinds: &[CommandKind]) -> CommandStream {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let batch = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        let ignore_filter = self.ignore_filter.load(Ordering::SeqCst);
        let wanted =
            |cmd: &StageCommand| ignore_filter || kinds.is_empty() || kinds.contains(&cmd.kind);

        let mut outstanding = self.outstanding.lock().unwrap();
        let mut items: Vec<ClientResult<StageCommand>> = outstanding
            .iter()
            .filter(|cmd| wanted(cmd))
            .cloned()
            .map(Ok)
            .collect();
        for delivery in batch {
            match delivery {
                Ok(cmd) => {
                    if wanted(&cmd) {
                        items.push(Ok(cmd.clone()));
                    }
                    outstanding.push(cmd);
                }
                Err(reason) => items.push(Err(ClientError::CommandStream(reason))),
            }
        }
        stream::iter(items).boxed()
    }

    async fn acknowledge_commands(&self, ids: &[String]) -> ClientResult<()> {
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(ClientError::Acknowledge(
                "injected acknowledge failure".to_string(),
            ));
        }
        self.outstanding
            .lock()
            .unwrap()
            .retain(|cmd| !ids.contains(&cmd.id));
        self.acknowledged
            .lock()
            .unwrap()
            .extend(ids.iter().cloned());
        Ok(())
    }

    fn log_info(&self, message: &str) {
        self.push_log(LogLevel::Info, message);
    }

    fn log_error(&self, message: &str) {
        self.push_log(LogLevel::Error, message);
    }
}
