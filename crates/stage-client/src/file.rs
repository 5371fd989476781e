//! File-backed stage client.
//!
//! The whole state of one stage instance (metadata plus commands not yet
//! acknowledged) lives in a single JSON document. Writes go to a sibling
//! temporary file and are renamed into place, so a crash never leaves a
//! half-written document behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::command::{CommandKind, StageCommand};
use crate::error::{ClientError, ClientResult};
use crate::stage_client::{CommandStream, StageClient};

/// On-disk document for one stage instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    /// Durable per-stage metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Commands issued but not yet acknowledged by the executor.
    #[serde(default)]
    pub pending_commands: Vec<StageCommand>,
}

/// Stage client persisting its state at `path`.
#[derive(Debug)]
pub struct FileStageClient {
    stage_id: String,
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStageClient {
    pub fn new(stage_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            stage_id: stage_id.into(),
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current state. A missing file is an empty state.
    pub async fn load(&self) -> ClientResult<StageState> {
        let _guard = self.lock.lock().await;
        self.read_state().await
    }

    /// Queue a command; it is listed until acknowledged.
    pub async fn enqueue_command(&self, command: StageCommand) -> ClientResult<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.read_state().await?;
        debug!(
            stage_id = %self.stage_id,
            command_id = %command.id,
            kind = %command.kind,
            "enqueue command"
        );
        state.pending_commands.push(command);
        self.write_state(&state).await
    }

    async fn read_state(&self) -> ClientResult<StageState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StageState::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StageState::default()),
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    async fn write_state(&self, state: &StageState) -> ClientResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StageClient for FileStageClient {
    fn stage_id(&self) -> &str {
        &self.stage_id
    }

    async fn get_metadata(&self, key: &str) -> ClientResult<Option<String>> {
        let state = self.load().await.map_err(|e| ClientError::MetadataRead {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(state.metadata.get(key).cloned())
    }

    async fn put_metadata(&self, key: &str, value: &str) -> ClientResult<()> {
        let _guard = self.lock.lock().await;
        let result = async {
            let mut state = self.read_state().await?;
            state.metadata.insert(key.to_string(), value.to_string());
            self.write_state(&state).await
        }
        .await;
        result.map_err(|e| ClientError::MetadataWrite {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn list_stage_commands(&self, kinds: &[CommandKind]) -> CommandStream {
        let state = match self.load().await {
            Ok(state) => state,
            Err(e) => {
                return stream::iter([Err(ClientError::CommandStream(e.to_string()))]).boxed()
            }
        };

        let listed: Vec<_> = state
            .pending_commands
            .into_iter()
            .filter(|c| {
                c.stage_id == self.stage_id && (kinds.is_empty() || kinds.contains(&c.kind))
            })
            .map(Ok)
            .collect();
        stream::iter(listed).boxed()
    }

    async fn acknowledge_commands(&self, ids: &[String]) -> ClientResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let result = async {
            let mut state = self.read_state().await?;
            let before = state.pending_commands.len();
            state.pending_commands.retain(|c| !ids.contains(&c.id));
            if state.pending_commands.len() == before {
                return Ok(());
            }
            debug!(
                stage_id = %self.stage_id,
                acknowledged = before - state.pending_commands.len(),
                "commands acknowledged"
            );
            self.write_state(&state).await
        }
        .await;
        result.map_err(|e| ClientError::Acknowledge(e.to_string()))
    }

    fn log_info(&self, message: &str) {
        info!(stage_id = %self.stage_id, "{message}");
        println!("[{}] {}", self.stage_id, message);
    }

    fn log_error(&self, message: &str) {
        error!(stage_id = %self.stage_id, "{message}");
        eprintln!("[{}] ERROR {}", self.stage_id, message);
    }
}
