//! End-to-end scenarios for the wait-approval executor with MemoryStageClient.
//!
//! Time is paused, so the 5 s poll cadence elapses virtually.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use stage_client::{
    ClientResult, CommandKind, CommandStream, FileStageClient, MemoryStageClient, StageClient,
    StageCommand,
};
use wait_approval::{
    execute, stop_signal, ApproverSet, ExecutorConfig, StageStatus, StopHandle, StopSignal,
    WaitApprovalExecutor, APPROVED_USERS_KEY, STAGE_DISPLAY_KEY,
};

const ALICE_BOB_ONE: &[u8] = br#"{"approvers":["alice","bob"],"minApproverNum":1}"#;
const ALICE_BOB_TWO: &[u8] = br#"{"approvers":["alice","bob"],"minApproverNum":2}"#;
const THREE_NEED_TWO: &[u8] = br#"{"approvers":["alice","bob","carol"],"minApproverNum":2}"#;

fn approve(user: &str) -> StageCommand {
    StageCommand::approve("stage-1", user)
}

fn approved_users(client: &MemoryStageClient) -> ApproverSet {
    ApproverSet::parse(&client.metadata(APPROVED_USERS_KEY).unwrap_or_default())
}

fn set(users: &[&str]) -> ApproverSet {
    users.iter().copied().collect()
}

/// Test: single approval meets a quorum of one
#[tokio::test(start_paused = true)]
async fn test_single_approval_meets_threshold() {
    let client = Arc::new(MemoryStageClient::new("stage-1"));
    client.push_commands([approve("alice")]);

    let status = execute(
        client.clone(),
        ALICE_BOB_ONE,
        ExecutorConfig::default(),
        StopSignal::never(),
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert_eq!(client.metadata(APPROVED_USERS_KEY).as_deref(), Some("alice"));
    assert!(client
        .metadata(STAGE_DISPLAY_KEY)
        .unwrap()
        .contains("alice"));
    assert!(client.has_log("Waiting for approval from at least 1 user(s)"));
    assert!(client.has_log("Got approval from alice"));
    assert!(client.has_log("This stage has been approved by 1 user(s) (alice)"));
}

/// Test: a commander already in the set is logged as duplicate
#[tokio::test(start_paused = true)]
async fn test_duplicate_is_ignored() {
    let client =
        Arc::new(MemoryStageClient::new("stage-1").with_metadata(APPROVED_USERS_KEY, "alice"));
    client.push_commands([approve("alice"), approve("bob")]);

    let status = execute(
        client.clone(),
        ALICE_BOB_TWO,
        ExecutorConfig::default(),
        StopSignal::never(),
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert!(client.has_log("Approval from the same user (alice) will not be counted"));
    assert_eq!(approved_users(&client), set(&["alice", "bob"]));
}

/// Test: partial progress is persisted and the stage keeps running
#[tokio::test(start_paused = true)]
async fn test_partial_progress_persists() {
    let client = Arc::new(MemoryStageClient::new("stage-1"));
    let mut exec =
        WaitApprovalExecutor::start(client.clone(), THREE_NEED_TWO, ExecutorConfig::default())
            .await
            .expect("config is valid");

    client.push_commands([approve("alice")]);
    assert_eq!(exec.poll_once().await, StageStatus::Running);
    assert_eq!(client.metadata(APPROVED_USERS_KEY).as_deref(), Some("alice"));
    assert!(client.has_log("Waiting for 1 more approver(s)"));

    client.push_commands([approve("bob")]);
    assert_eq!(exec.poll_once().await, StageStatus::Success);
    assert_eq!(approved_users(&client), set(&["alice", "bob"]));
}

/// Test: the full loop tallies once per tick, first tick one interval in
#[tokio::test(start_paused = true)]
async fn test_run_loop_one_pass_per_tick() {
    let client = Arc::new(MemoryStageClient::new("stage-1"));
    client.push_commands([approve("alice")]);
    client.push_commands([approve("bob")]);

    let started = tokio::time::Instant::now();
    let status = execute(
        client.clone(),
        THREE_NEED_TWO,
        ExecutorConfig::default(),
        StopSignal::never(),
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert_eq!(client.list_calls(), 2);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(15));
}

/// Test: cancellation while waiting fails the stage without writes
#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_wait() {
    let client = Arc::new(MemoryStageClient::new("stage-1"));
    let (handle, signal) = stop_signal();

    let task = tokio::spawn(execute(
        client.clone(),
        ALICE_BOB_ONE,
        ExecutorConfig::default(),
        signal,
    ));
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();

    let status = task.await.expect("executor task panicked");
    assert_eq!(status, StageStatus::Failure);
    assert!(client.has_log("Wait approval cancelled"));
    assert!(client.writes().is_empty());
    assert_eq!(client.list_calls(), 0);
}

/// Test: invalid config fails before any polling
#[tokio::test(start_paused = true)]
async fn test_invalid_config() {
    let raw: &[u8] = br#"{"approvers":["alice"],"minApproverNum":2}"#;
    let err = wait_approval::StageOptions::decode(raw).unwrap_err();
    assert!(err
        .to_string()
        .contains("minApproverNum must be less than or equal to the number of approvers"));

    let client = Arc::new(MemoryStageClient::new("stage-1"));
    client.push_commands([approve("alice")]);
    let status = execute(
        client.clone(),
        raw,
        ExecutorConfig::default(),
        StopSignal::never(),
    )
    .await;

    assert_eq!(status, StageStatus::Failure);
    assert_eq!(client.list_calls(), 0);
    assert!(client.has_log("Failed to decode stage config: minApproverNum"));
}

/// Test: a restarted executor resumes from persisted metadata
#[tokio::test(start_paused = true)]
async fn test_restart_idempotence() {
    let client = Arc::new(MemoryStageClient::new("stage-1"));
    {
        let mut first =
            WaitApprovalExecutor::start(client.clone(), THREE_NEED_TWO, ExecutorConfig::default())
                .await
                .unwrap();
        client.push_commands([approve("alice")]);
        assert_eq!(first.poll_once().await, StageStatus::Running);
    }
    assert_eq!(client.metadata(APPROVED_USERS_KEY).as_deref(), Some("alice"));

    client.push_commands([approve("alice"), approve("bob")]);
    let status = execute(
        client.clone(),
        THREE_NEED_TWO,
        ExecutorConfig::default(),
        StopSignal::never(),
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert!(client.has_log("Approval from the same user (alice) will not be counted"));
    assert!(client.has_log("Got approval from bob"));
    assert_eq!(approved_users(&client), set(&["alice", "bob"]));
}

/// Test: restart with no new commands issues no writes and keeps polling
#[tokio::test(start_paused = true)]
async fn test_restart_without_commands_is_quiet() {
    let client =
        Arc::new(MemoryStageClient::new("stage-1").with_metadata(APPROVED_USERS_KEY, "alice"));
    let (handle, signal) = stop_signal();

    let task = tokio::spawn(execute(
        client.clone(),
        THREE_NEED_TWO,
        ExecutorConfig::default(),
        signal,
    ));
    tokio::time::sleep(Duration::from_secs(32)).await;
    assert_eq!(client.list_calls(), 6);
    handle.cancel();

    assert_eq!(task.await.unwrap(), StageStatus::Failure);
    assert!(client.writes().is_empty());
}

/// Test: restart after quorum succeeds on the first tick without writes
#[tokio::test(start_paused = true)]
async fn test_restart_after_quorum() {
    let client = Arc::new(
        MemoryStageClient::new("stage-1").with_metadata(APPROVED_USERS_KEY, "alice, bob"),
    );
    let status = execute(
        client.clone(),
        ALICE_BOB_TWO,
        ExecutorConfig::default(),
        StopSignal::never(),
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert!(client.writes().is_empty());
}

/// Stage client whose command listing takes a while to answer.
struct SlowListing {
    inner: MemoryStageClient,
    delay: Duration,
}

#[async_trait]
impl StageClient for SlowListing {
    fn stage_id(&self) -> &str {
        self.inner.stage_id()
    }

    async fn get_metadata(&self, key: &str) -> ClientResult<Option<String>> {
        self.inner.get_metadata(key).await
    }

    async fn put_metadata(&self, key: &str, value: &str) -> ClientResult<()> {
        self.inner.put_metadata(key, value).await
    }

    async fn list_stage_commands(&self, kinds: &[CommandKind]) -> CommandStream {
        tokio::time::sleep(self.delay).await;
        self.inner.list_stage_commands(kinds).await
    }

    async fn acknowledge_commands(&self, ids: &[String]) -> ClientResult<()> {
        self.inner.acknowledge_commands(ids).await
    }

    fn log_info(&self, message: &str) {
        self.inner.log_info(message);
    }

    fn log_error(&self, message: &str) {
        self.inner.log_error(message);
    }
}

/// Test: cancellation during the command pull abandons the pass
#[tokio::test(start_paused = true)]
async fn test_cancellation_during_pull_writes_nothing() {
    let slow = Arc::new(SlowListing {
        inner: MemoryStageClient::new("stage-1"),
        delay: Duration::from_secs(10),
    });
    slow.inner.push_commands([approve("alice")]);
    let (handle, signal) = stop_signal();

    let task = tokio::spawn(execute(
        slow.clone(),
        ALICE_BOB_ONE,
        ExecutorConfig::default(),
        signal,
    ));
    // First tick at 5 s; the listing is still in flight at 7 s.
    tokio::time::sleep(Duration::from_secs(7)).await;
    handle.cancel();

    assert_eq!(task.await.unwrap(), StageStatus::Failure);
    assert!(slow.inner.writes().is_empty());
    assert!(slow.inner.has_log("Wait approval cancelled"));
    assert!(!slow.inner.has_log("Got approval"));
}

/// Test: custom poll interval is honoured
#[tokio::test(start_paused = true)]
async fn test_custom_poll_interval() {
    let client = Arc::new(MemoryStageClient::new("stage-1"));
    client.push_commands([approve("bob")]);

    let started = tokio::time::Instant::now();
    let status = execute(
        client.clone(),
        ALICE_BOB_ONE,
        ExecutorConfig::with_poll_interval(Duration::from_millis(250)),
        StopSignal::never(),
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(250) && elapsed < Duration::from_millis(500));
}

/// Stage client that requests cancellation once a metadata write lands.
struct CancelOnWrite {
    inner: MemoryStageClient,
    handle: StopHandle,
}

#[async_trait]
impl StageClient for CancelOnWrite {
    fn stage_id(&self) -> &str {
        self.inner.stage_id()
    }

    async fn get_metadata(&self, key: &str) -> ClientResult<Option<String>> {
        self.inner.get_metadata(key).await
    }

    async fn put_metadata(&self, key: &str, value: &str) -> ClientResult<()> {
        let res = self.inner.put_metadata(key, value).await;
        self.handle.cancel();
        res
    }

    async fn list_stage_commands(&self, kinds: &[CommandKind]) -> CommandStream {
        self.inner.list_stage_commands(kinds).await
    }

    async fn acknowledge_commands(&self, ids: &[String]) -> ClientResult<()> {
        self.inner.acknowledge_commands(ids).await
    }

    fn log_info(&self, message: &str) {
        self.inner.log_info(message);
    }

    fn log_error(&self, message: &str) {
        self.inner.log_error(message);
    }
}

/// Test: cancellation during the persist of a quorum pass fails the stage
#[tokio::test(start_paused = true)]
async fn test_cancellation_while_persisting_quorum() {
    let (handle, signal) = stop_signal();
    let client = Arc::new(CancelOnWrite {
        inner: MemoryStageClient::new("stage-1"),
        handle,
    });
    client.inner.push_commands([approve("alice")]);

    let status = execute(client.clone(), ALICE_BOB_ONE, ExecutorConfig::default(), signal).await;

    assert_eq!(status, StageStatus::Failure);
    assert_eq!(
        client.inner.writes(),
        vec![(APPROVED_USERS_KEY.to_string(), "alice".to_string())]
    );
    assert!(client.inner.acknowledged().is_empty());
    assert!(client.inner.has_log("Wait approval cancelled"));
    assert!(!client.inner.has_log("This stage has been approved"));

    // The recorded quorum wins on restart.
    let restarted = Arc::new(
        MemoryStageClient::new("stage-1").with_metadata(APPROVED_USERS_KEY, "alice"),
    );
    let status = execute(
        restarted.clone(),
        ALICE_BOB_ONE,
        ExecutorConfig::default(),
        StopSignal::never(),
    )
    .await;
    assert_eq!(status, StageStatus::Success);
}

/// Test: an approval listed before a crash is counted after restart
#[tokio::test]
async fn test_listing_without_persist_is_recovered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let before_crash = FileStageClient::new("stage-1", &path);
    before_crash.enqueue_command(approve("alice")).await.unwrap();
    let listed: Vec<_> = before_crash
        .list_stage_commands(&[CommandKind::ApproveStage])
        .await
        .collect()
        .await;
    assert_eq!(listed.len(), 1);
    drop(before_crash);

    let client = Arc::new(FileStageClient::new("stage-1", &path));
    let mut exec =
        WaitApprovalExecutor::start(client.clone(), ALICE_BOB_ONE, ExecutorConfig::default())
            .await
            .unwrap();
    assert_eq!(exec.poll_once().await, StageStatus::Success);
    assert_eq!(
        client.get_metadata(APPROVED_USERS_KEY).await.unwrap().as_deref(),
        Some("alice")
    );
    assert!(client.load().await.unwrap().pending_commands.is_empty());
}

