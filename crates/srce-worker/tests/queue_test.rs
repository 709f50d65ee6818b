use srce_core::{AppError, NewVideo, ProcessingStatus, VideoId};
use srce_db::{InMemoryVideoRepository, VideoRepository};
use srce_processing::test_helpers::FakeToolkit;
use srce_processing::{ToolStep, TranscodePipeline, TranscodeSettings};
use srce_storage::StorageLayout;
use srce_worker::{JobOutcome, JobSubmitter, QueueSettings, VideoJob, VideoJobQueue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Harness {
    _dir: TempDir,
    layout: StorageLayout,
    repository: Arc<InMemoryVideoRepository>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(
            dir.path().join("videos"),
            dir.path().join("compressed"),
            dir.path().join("thumbnails"),
            "mkv",
        );
        layout.ensure_roots().await.unwrap();
        Self {
            _dir: dir,
            layout,
            repository: Arc::new(InMemoryVideoRepository::new()),
        }
    }

    async fn video(&self, name: &str) -> (VideoId, PathBuf) {
        let source = self.layout.video_dir().join(name);
        tokio::fs::write(&source, b"video bytes").await.unwrap();
        let record = self
            .repository
            .create_record(NewVideo {
                owner: "alice".to_string(),
                original_path: source.clone(),
                content_type: "video/x-matroska".to_string(),
            })
            .await
            .unwrap();
        (record.id, source)
    }

    fn queue(
        &self,
        toolkit: FakeToolkit,
        settings: QueueSettings,
    ) -> (VideoJobQueue, mpsc::UnboundedReceiver<JobOutcome>) {
        let pipeline = TranscodePipeline::new(
            Arc::new(toolkit),
            self.repository.clone(),
            self.layout.clone(),
            TranscodeSettings::default(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        (VideoJobQueue::new(pipeline, settings, Some(tx)), rx)
    }
}

async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<JobOutcome>) -> JobOutcome {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for job outcome")
        .expect("outcome channel closed")
}

#[tokio::test]
async fn concurrent_jobs_settle_independently() {
    let harness = Harness::new().await;
    let (good_id, good_source) = harness.video("good.mkv").await;
    let (bad_id, bad_source) = harness.video("bad.mkv").await;

    let toolkit = FakeToolkit::new()
        .with_delay(Duration::from_millis(10))
        .failing(ToolStep::Transcode, "bad.mkv");
    let (queue, mut outcomes) = harness.queue(toolkit, QueueSettings::default());

    queue
        .submit(VideoJob::Transcode {
            video_id: good_id,
            source_path: good_source.clone(),
        })
        .unwrap();
    queue
        .submit(VideoJob::Transcode {
            video_id: bad_id,
            source_path: bad_source.clone(),
        })
        .unwrap();

    let mut seen = vec![next_outcome(&mut outcomes).await, next_outcome(&mut outcomes).await];
    seen.sort_by_key(|o| o.video_id);

    let good = seen.iter().find(|o| o.video_id == good_id).unwrap();
    let bad = seen.iter().find(|o| o.video_id == bad_id).unwrap();
    assert_eq!(good.status, ProcessingStatus::Complete);
    assert!(good.error.is_none());
    assert_eq!(bad.status, ProcessingStatus::Failed);
    assert!(bad.error.is_some());

    let good_record = harness.repository.get_record(good_id).await.unwrap().unwrap();
    assert_eq!(good_record.status, ProcessingStatus::Complete);
    assert!(good_record.compressed_path.unwrap().exists());
    assert!(good_record.thumbnail_path.unwrap().exists());
    assert!(good_source.exists());

    let bad_record = harness.repository.get_record(bad_id).await.unwrap().unwrap();
    assert_eq!(bad_record.status, ProcessingStatus::Failed);
    assert!(bad_record.compressed_path.is_none());
    assert!(!bad_source.exists());

    queue.shutdown().await;
}

#[tokio::test]
async fn submit_rejects_when_full() {
    let harness = Harness::new().await;
    let (first, first_source) = harness.video("first.mkv").await;
    let (second, second_source) = harness.video("second.mkv").await;

    let (queue, _outcomes) = harness.queue(
        FakeToolkit::new(),
        QueueSettings {
            max_concurrent: 1,
            queue_size: 1,
        },
    );

    // The worker pool has not been polled yet, so the single slot stays taken.
    queue
        .submit(VideoJob::Transcode {
            video_id: first,
            source_path: first_source,
        })
        .unwrap();
    let err = queue
        .submit(VideoJob::Transcode {
            video_id: second,
            source_path: second_source.clone(),
        })
        .unwrap_err();
    assert!(matches!(err, AppError::QueueFull));

    // submit_async waits for room instead.
    queue
        .submit_async(VideoJob::Transcode {
            video_id: second,
            source_path: second_source,
        })
        .await
        .unwrap();

    queue.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_queued_jobs_then_closes() {
    let harness = Harness::new().await;
    let (a, a_source) = harness.video("a.mkv").await;
    let (b, b_source) = harness.video("b.mkv").await;

    let (queue, mut outcomes) = harness.queue(
        FakeToolkit::new().with_delay(Duration::from_millis(10)),
        QueueSettings {
            max_concurrent: 1,
            queue_size: 8,
        },
    );
    queue
        .submit(VideoJob::Transcode {
            video_id: a,
            source_path: a_source,
        })
        .unwrap();
    queue
        .submit(VideoJob::Transcode {
            video_id: b,
            source_path: b_source.clone(),
        })
        .unwrap();

    queue.shutdown().await;

    let mut finished = Vec::new();
    while let Ok(outcome) = outcomes.try_recv() {
        finished.push(outcome.video_id);
    }
    finished.sort();
    assert_eq!(finished, vec![a, b]);

    for id in [a, b] {
        let record = harness.repository.get_record(id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Complete);
    }

    let err = queue
        .submit(VideoJob::Transcode {
            video_id: b,
            source_path: b_source,
        })
        .unwrap_err();
    assert!(matches!(err, AppError::QueueClosed));
}

#[tokio::test]
async fn missing_record_reports_failure_without_crashing() {
    let harness = Harness::new().await;
    let (queue, mut outcomes) = harness.queue(FakeToolkit::new(), QueueSettings::default());

    queue
        .submit(VideoJob::Transcode {
            video_id: 404,
            source_path: harness.layout.video_dir().join("ghost.mkv"),
        })
        .unwrap();

    let outcome = next_outcome(&mut outcomes).await;
    assert_eq!(outcome.video_id, 404);
    assert_eq!(outcome.status, ProcessingStatus::Failed);
    assert!(outcome.error.unwrap().contains("not found"));

    queue.shutdown().await;
}
