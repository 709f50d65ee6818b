//! Assemble the services from configuration

use srce_core::{AppResult, SrceConfig};
use srce_db::VideoRepository;
use srce_processing::{
    BoundedToolkit, FfmpegToolkit, MediaToolkit, MediaValidator, TranscodePipeline,
    TranscodeSettings,
};
use srce_storage::{ChunkStore, StorageLayout};
use srce_worker::{JobOutcome, QueueSettings, VideoJobQueue};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ingest::IngestService;
use crate::lifecycle::VideoLifecycleService;

/// Everything a front end needs, sharing one repository and one job queue.
#[derive(Clone)]
pub struct SrceRuntime {
    pub ingest: IngestService,
    pub lifecycle: VideoLifecycleService,
    pub queue: VideoJobQueue,
    pub repository: Arc<dyn VideoRepository>,
}

/// ffmpeg toolkit, wrapped with the per-step limit when one is configured.
pub fn toolkit_from_config(config: &SrceConfig) -> AppResult<Arc<dyn MediaToolkit>> {
    let ffmpeg = FfmpegToolkit::new(config.ffmpeg_path.clone())?;
    Ok(match config.transcode_timeout {
        Some(limit) => {
            tracing::info!(limit_secs = limit.as_secs(), "Media tool steps are time-limited");
            Arc::new(BoundedToolkit::new(ffmpeg, limit))
        }
        None => Arc::new(ffmpeg),
    })
}

/// Wire storage, validation, the transcode pipeline and the job queue together.
///
/// Must be called inside a tokio runtime: the queue's worker pool is spawned here.
pub fn build_runtime(
    config: &SrceConfig,
    repository: Arc<dyn VideoRepository>,
    toolkit: Arc<dyn MediaToolkit>,
    outcomes: Option<mpsc::UnboundedSender<JobOutcome>>,
) -> SrceRuntime {
    let layout = StorageLayout::from_config(config);

    let pipeline = TranscodePipeline::new(
        toolkit.clone(),
        repository.clone(),
        layout.clone(),
        TranscodeSettings::from_config(config),
    );
    let queue = VideoJobQueue::new(pipeline, QueueSettings::from_config(config), outcomes);

    let ingest = IngestService::new(
        ChunkStore::new(layout),
        MediaValidator::new(toolkit),
        repository.clone(),
        Arc::new(queue.clone()),
    )
    .with_staging_cleanup(config.cleanup_staging_after_merge);

    SrceRuntime {
        ingest,
        lifecycle: VideoLifecycleService::new(repository.clone()),
        queue,
        repository,
    }
}
