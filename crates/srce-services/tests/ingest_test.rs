use async_trait::async_trait;
use bytes::Bytes;
use srce_core::{AppError, AppResult, ProcessingStatus, SrceConfig};
use srce_db::{InMemoryVideoRepository, VideoRepository};
use srce_processing::test_helpers::FakeToolkit;
use srce_processing::{MediaToolkit, MediaValidator};
use srce_services::{build_runtime, ChunkReceipt, ChunkUpload, IngestService, SrceRuntime};
use srce_storage::{ChunkStore, StorageLayout};
use srce_worker::{JobOutcome, JobSubmitter, VideoJob};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;

struct Harness {
    dir: TempDir,
    config: SrceConfig,
    repository: Arc<InMemoryVideoRepository>,
    runtime: SrceRuntime,
    outcomes: mpsc::UnboundedReceiver<JobOutcome>,
}

impl Harness {
    fn new(toolkit: FakeToolkit) -> Self {
        Self::with_config(toolkit, |_| {})
    }

    fn with_config(toolkit: FakeToolkit, adjust: impl FnOnce(&mut SrceConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SrceConfig {
            video_dir: dir.path().join("videos"),
            compressed_dir: dir.path().join("compressed"),
            thumbnail_dir: dir.path().join("thumbnails"),
            ..SrceConfig::default()
        };
        adjust(&mut config);

        let repository = Arc::new(InMemoryVideoRepository::new());
        let toolkit: Arc<dyn MediaToolkit> = Arc::new(toolkit);
        let (tx, outcomes) = mpsc::unbounded_channel();
        let runtime = build_runtime(&config, repository.clone(), toolkit, Some(tx));

        Self {
            dir,
            config,
            repository,
            runtime,
            outcomes,
        }
    }

    async fn next_outcome(&mut self) -> JobOutcome {
        tokio::time::timeout(Duration::from_secs(5), self.outcomes.recv())
            .await
            .expect("timed out waiting for job outcome")
            .expect("outcome channel closed")
    }
}

fn chunk(id: u64, payload: &'static [u8], is_last: bool) -> ChunkUpload {
    ChunkUpload {
        owner: "Alice".to_string(),
        filename: "demo".to_string(),
        blob_id: id,
        payload: Bytes::from_static(payload),
        is_last,
        content_type: None,
    }
}

#[tokio::test]
async fn single_shot_upload_is_recorded_and_transcoded() {
    let mut harness = Harness::new(FakeToolkit::new());

    let record = harness
        .runtime
        .ingest
        .upload_video("Alice", "clip.mp4", "video/mp4", Bytes::from_static(b"movie"))
        .await
        .unwrap();

    assert_eq!(record.owner, "alice");
    assert_eq!(record.content_type, "video/mp4");
    assert_eq!(record.status, ProcessingStatus::Pending);
    assert_eq!(record.original_path.parent(), Some(harness.config.video_dir.as_path()));
    let name = record.original_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("alice_"), "{}", name);
    assert!(name.ends_with("_clip.mp4"), "{}", name);
    assert_eq!(tokio::fs::read(&record.original_path).await.unwrap(), b"movie");

    let outcome = harness.next_outcome().await;
    assert_eq!(outcome.video_id, record.id);
    assert_eq!(outcome.status, ProcessingStatus::Complete);

    let stored = harness.runtime.ingest.get_video(record.id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Complete);
    assert!(stored.compressed_path.unwrap().exists());
    assert!(stored.thumbnail_path.unwrap().exists());
}

#[tokio::test]
async fn invalid_single_shot_upload_leaves_nothing_behind() {
    let toolkit = FakeToolkit::new()
        .with_probe_diagnostics("junk.mp4", "junk.mp4: Invalid data found when processing input");
    let harness = Harness::new(toolkit);

    let err = harness
        .runtime
        .ingest
        .upload_video("alice", "junk.mp4", "video/mp4", Bytes::from_static(b"nope"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidMedia(_)));
    assert!(harness.repository.is_empty().await);
    let mut entries = tokio::fs::read_dir(&harness.config.video_dir).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn unavailable_tool_is_not_a_content_rejection() {
    let harness = Harness::new(FakeToolkit::new().unavailable());

    let err = harness
        .runtime
        .ingest
        .upload_video("alice", "clip.mp4", "video/mp4", Bytes::from_static(b"movie"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ToolUnavailable { .. }));
    assert!(!err.is_rejected_content());
    assert!(harness.repository.is_empty().await);
}

#[tokio::test]
async fn streamed_upload_is_recorded() {
    let mut harness = Harness::new(FakeToolkit::new());
    let mut reader: &[u8] = b"streamed movie";

    let record = harness
        .runtime
        .ingest
        .upload_video_from_reader("bob", "stream.webm", "video/webm", &mut reader)
        .await
        .unwrap();

    assert_eq!(
        tokio::fs::read(&record.original_path).await.unwrap(),
        b"streamed movie"
    );
    assert_eq!(harness.next_outcome().await.status, ProcessingStatus::Complete);
}

#[tokio::test]
async fn chunked_upload_merges_and_schedules() {
    let mut harness = Harness::new(FakeToolkit::new());
    let ingest = harness.runtime.ingest.clone();

    for (id, payload) in [(2, &b"BBB"[..]), (1, &b"AAA"[..])] {
        let receipt = ingest
            .receive_chunk(ChunkUpload {
                payload: Bytes::copy_from_slice(payload),
                ..chunk(id, b"", false)
            })
            .await
            .unwrap();
        assert!(matches!(receipt, ChunkReceipt::Stored { .. }));
    }

    let receipt = ingest.receive_chunk(chunk(3, b"CCC", true)).await.unwrap();
    let record = match receipt {
        ChunkReceipt::Completed { record } => record,
        other => panic!("expected completed upload, got {:?}", other),
    };

    assert_eq!(record.owner, "alice");
    assert_eq!(record.content_type, "video/x-matroska");
    assert_eq!(
        record.original_path,
        harness.config.video_dir.join("alice").join("demo.mkv")
    );
    assert_eq!(
        tokio::fs::read(&record.original_path).await.unwrap(),
        b"AAABBBCCC"
    );

    let outcome = harness.next_outcome().await;
    assert_eq!(outcome.video_id, record.id);
    assert_eq!(outcome.status, ProcessingStatus::Complete);

    let listed = ingest.list_videos("ALICE").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ProcessingStatus::Complete);
}

#[tokio::test]
async fn chunked_upload_keeps_caller_content_type() {
    let harness = Harness::new(FakeToolkit::new());

    let receipt = harness
        .runtime
        .ingest
        .receive_chunk(ChunkUpload {
            content_type: Some("video/webm".to_string()),
            ..chunk(1, b"only", true)
        })
        .await
        .unwrap();

    match receipt {
        ChunkReceipt::Completed { record } => assert_eq!(record.content_type, "video/webm"),
        other => panic!("expected completed upload, got {:?}", other),
    }
}

#[tokio::test]
async fn invalid_chunked_upload_is_discarded() {
    let toolkit = FakeToolkit::new()
        .with_probe_diagnostics("demo.mkv", "Invalid data found when processing input");
    let harness = Harness::new(toolkit);
    let ingest = &harness.runtime.ingest;

    ingest.receive_chunk(chunk(1, b"AAA", false)).await.unwrap();
    let err = ingest.receive_chunk(chunk(2, b"BBB", true)).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidMedia(_)));
    assert!(!ingest.layout().merged_path("alice", "demo").exists());
    assert!(!ingest.layout().staging_dir("alice", "demo").exists());
    assert!(harness.repository.is_empty().await);
}

#[tokio::test]
async fn staging_cleanup_after_merge_when_enabled() {
    let harness = Harness::with_config(FakeToolkit::new(), |config| {
        config.cleanup_staging_after_merge = true;
    });
    let ingest = &harness.runtime.ingest;

    ingest.receive_chunk(chunk(1, b"AAA", true)).await.unwrap();

    assert!(ingest.layout().merged_path("alice", "demo").exists());
    assert!(!ingest.layout().staging_dir("alice", "demo").exists());
}

#[tokio::test]
async fn unsafe_names_are_rejected() {
    let harness = Harness::new(FakeToolkit::new());
    let ingest = &harness.runtime.ingest;

    let err = ingest
        .upload_video("alice", "../escape.mp4", "video/mp4", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = ingest
        .receive_chunk(ChunkUpload {
            owner: "../root".to_string(),
            ..chunk(1, b"x", true)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(!harness.dir.path().join("root").exists());
}

#[tokio::test]
async fn failed_transcode_is_visible_through_lookup() {
    let toolkit = FakeToolkit::new().failing(srce_processing::ToolStep::Transcode, "");
    let mut harness = Harness::new(toolkit);

    let record = harness
        .runtime
        .ingest
        .upload_video("alice", "clip.mp4", "video/mp4", Bytes::from_static(b"movie"))
        .await
        .unwrap();

    let outcome = harness.next_outcome().await;
    assert_eq!(outcome.status, ProcessingStatus::Failed);
    assert!(outcome.error.is_some());

    let stored = harness.runtime.ingest.get_video(record.id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Failed);
    assert!(!stored.original_path.exists());
}

struct ClosedQueue;

#[async_trait]
impl JobSubmitter for ClosedQueue {
    fn submit(&self, _job: VideoJob) -> AppResult<()> {
        Err(AppError::QueueClosed)
    }

    async fn submit_async(&self, _job: VideoJob) -> AppResult<()> {
        Err(AppError::QueueClosed)
    }
}

#[tokio::test]
async fn scheduling_failure_marks_record_failed() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(
        dir.path().join("videos"),
        dir.path().join("compressed"),
        dir.path().join("thumbnails"),
        "mkv",
    );
    let repository = Arc::new(InMemoryVideoRepository::new());
    let ingest = IngestService::new(
        ChunkStore::new(layout),
        MediaValidator::new(Arc::new(FakeToolkit::new())),
        repository.clone(),
        Arc::new(ClosedQueue),
    );

    let err = ingest
        .upload_video("alice", "clip.mp4", "video/mp4", Bytes::from_static(b"movie"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QueueClosed));

    let records = repository.list_by_owner("alice").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ProcessingStatus::Failed);
    assert!(!records[0].original_path.exists());
}

#[tokio::test]
async fn concurrent_final_chunks_create_one_record() {
    let mut harness = Harness::new(FakeToolkit::new().with_delay(Duration::from_millis(100)));
    let ingest = harness.runtime.ingest.clone();

    ingest.receive_chunk(chunk(1, b"AAA", false)).await.unwrap();
    ingest.receive_chunk(chunk(2, b"BBB", false)).await.unwrap();

    let (a, b) = tokio::join!(
        ingest.receive_chunk(chunk(3, b"CCC", true)),
        ingest.receive_chunk(chunk(3, b"CCC", true))
    );

    let (completed, conflicted) = match (a, b) {
        (Ok(done), Err(err)) | (Err(err), Ok(done)) => (done, err),
        other => panic!("expected one completed and one conflicting upload, got {:?}", other),
    };
    assert!(matches!(completed, ChunkReceipt::Completed { .. }));
    assert!(matches!(conflicted, AppError::MergeInProgress { .. }));

    assert_eq!(harness.next_outcome().await.status, ProcessingStatus::Complete);
    let listed = ingest.list_videos("alice").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(
        tokio::fs::read(&listed[0].original_path).await.unwrap(),
        b"AAABBBCCC"
    );
}

#[tokio::test]
async fn final_chunk_waits_for_previous_transcode() {
    let mut harness = Harness::new(FakeToolkit::new().with_delay(Duration::from_millis(100)));
    let ingest = harness.runtime.ingest.clone();

    let first = ingest.receive_chunk(chunk(1, b"AAA", true)).await.unwrap();
    assert!(matches!(first, ChunkReceipt::Completed { .. }));

    let err = ingest.receive_chunk(chunk(1, b"ZZZ", true)).await.unwrap_err();
    assert!(matches!(err, AppError::MergeInProgress { .. }));
    assert_eq!(
        tokio::fs::read(ingest.layout().merged_path("alice", "demo"))
            .await
            .unwrap(),
        b"AAA"
    );

    assert_eq!(harness.next_outcome().await.status, ProcessingStatus::Complete);

    // Once the first upload has settled the name can be uploaded again.
    let again = ingest.receive_chunk(chunk(1, b"ZZZ", true)).await.unwrap();
    assert!(matches!(again, ChunkReceipt::Completed { .. }));
    assert_eq!(harness.next_outcome().await.status, ProcessingStatus::Complete);
    assert_eq!(ingest.list_videos("alice").await.unwrap().len(), 2);
}

struct BrokenPipe;

impl AsyncRead for BrokenPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "client went away",
        )))
    }
}

#[tokio::test]
async fn interrupted_single_shot_write_leaves_nothing_behind() {
    let harness = Harness::new(FakeToolkit::new());
    let mut reader = (&b"partial upload"[..]).chain(BrokenPipe);

    let err = harness
        .runtime
        .ingest
        .upload_video_from_reader("alice", "clip.mp4", "video/mp4", &mut reader)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Io { .. }));
    assert!(harness.repository.is_empty().await);
    let mut entries = tokio::fs::read_dir(&harness.config.video_dir).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}
