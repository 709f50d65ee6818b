use srce_core::{AppError, AppResult, ProcessingStatus, SrceConfig, VideoId};
use srce_processing::TranscodePipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum VideoJob {
    Transcode {
        video_id: VideoId,
        source_path: PathBuf,
    },
}

impl VideoJob {
    pub fn video_id(&self) -> VideoId {
        match self {
            VideoJob::Transcode { video_id, .. } => *video_id,
        }
    }
}

/// Terminal result of one job, reported on the outcome channel.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub video_id: VideoId,
    pub status: ProcessingStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    pub queue_size: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            queue_size: 1000,
        }
    }
}

impl QueueSettings {
    pub fn from_config(config: &SrceConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_transcodes,
            queue_size: config.video_job_queue_size,
        }
    }
}

/// Where ingestion hands work off to.
#[async_trait::async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Enqueue without waiting. Fails with `QueueFull` or `QueueClosed`.
    fn submit(&self, job: VideoJob) -> AppResult<()>;

    /// Enqueue, waiting for capacity if the queue is full.
    async fn submit_async(&self, job: VideoJob) -> AppResult<()>;
}

pub struct VideoJobQueue {
    tx: mpsc::Sender<VideoJob>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl VideoJobQueue {
    /// Create a new video job queue with bounded channel.
    ///
    /// At most `settings.max_concurrent` jobs run at once. When `outcomes` is
    /// given every finished job is reported on it.
    pub fn new(
        pipeline: TranscodePipeline,
        settings: QueueSettings,
        outcomes: Option<mpsc::UnboundedSender<JobOutcome>>,
    ) -> Self {
        let queue_size = settings.queue_size.max(1);
        let max_concurrent = settings.max_concurrent.max(1);

        let (tx, rx) = mpsc::channel(queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(async move {
            Self::worker_pool(rx, shutdown_rx, pipeline, max_concurrent, outcomes).await;
        });

        tracing::info!(
            queue_size = queue_size,
            max_concurrent = max_concurrent,
            "Video job queue initialized with bounded channel"
        );

        Self {
            tx,
            shutdown_tx: Arc::new(shutdown_tx),
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Stop accepting jobs, finish everything already queued or running, then return.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Video worker pool terminated abnormally");
            }
        }
        tracing::info!("Video job queue shut down");
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<VideoJob>,
        mut shutdown_rx: watch::Receiver<bool>,
        pipeline: TranscodePipeline,
        max_concurrent: usize,
        outcomes: Option<mpsc::UnboundedSender<JobOutcome>>,
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut closing = false;

        loop {
            let job = tokio::select! {
                job = rx.recv() => job,
                changed = shutdown_rx.changed(), if !closing => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        // Already-buffered jobs still drain through recv().
                        rx.close();
                        closing = true;
                    }
                    continue;
                }
            };

            let Some(job) = job else { break };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pipeline = pipeline.clone();
            let outcomes = outcomes.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let outcome = Self::process_job(job, &pipeline).await;
                if let Some(outcomes) = outcomes {
                    let _ = outcomes.send(outcome);
                }
            });
        }

        // Wait for in-flight jobs by taking every permit back.
        let _ = semaphore.acquire_many(max_concurrent as u32).await;
    }

    #[tracing::instrument(skip(job, pipeline), fields(job.type = "transcode", video.id = job.video_id(), job.status = tracing::field::Empty))]
    async fn process_job(job: VideoJob, pipeline: &TranscodePipeline) -> JobOutcome {
        let VideoJob::Transcode {
            video_id,
            source_path,
        } = job;

        let start = std::time::Instant::now();
        tracing::info!("Starting video transcode job");

        let result = pipeline.process(video_id, &source_path).await;
        let elapsed = start.elapsed();

        match result {
            Ok(_) => {
                tracing::Span::current().record("job.status", "success");
                tracing::info!(
                    duration_ms = elapsed.as_millis() as u64,
                    duration_secs = elapsed.as_secs_f64(),
                    "Video transcode completed successfully"
                );
                JobOutcome {
                    video_id,
                    status: ProcessingStatus::Complete,
                    error: None,
                }
            }
            Err(e) => {
                tracing::Span::current().record("job.status", "failed");
                tracing::error!(
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Video transcode failed"
                );
                JobOutcome {
                    video_id,
                    status: ProcessingStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl JobSubmitter for VideoJobQueue {
    #[tracing::instrument(skip(self, job), fields(job.type = "transcode", video.id = job.video_id()))]
    fn submit(&self, job: VideoJob) -> AppResult<()> {
        tracing::info!("Enqueuing video transcode job");
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => {
                tracing::warn!("Video job queue is full, rejecting job");
                AppError::QueueFull
            }
            TrySendError::Closed(_) => AppError::QueueClosed,
        })
    }

    #[tracing::instrument(skip(self, job), fields(job.type = "transcode", video.id = job.video_id()))]
    async fn submit_async(&self, job: VideoJob) -> AppResult<()> {
        tracing::info!("Enqueuing video transcode job (async)");
        self.tx.send(job).await.map_err(|_| AppError::QueueClosed)
    }
}

impl Clone for VideoJobQueue {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            worker: self.worker.clone(),
        }
    }
}
