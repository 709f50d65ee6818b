//! Transcode pipeline
//!
//! Compress the source, then grab one frame from the *compressed* output. The
//! two steps never overlap for one video. Success marks the record complete with
//! both artifact paths; any failure deletes the source, removes partial outputs
//! and marks the record failed before the error is returned.

use srce_core::{AppError, AppResult, SrceConfig, VideoId, VideoUpdate};
use srce_db::VideoRepository;
use srce_storage::{remove_if_exists, StorageLayout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::video::MediaToolkit;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeSettings {
    pub crf: u8,
    pub thumbnail_offset: Duration,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            crf: srce_core::constants::DEFAULT_TRANSCODE_CRF,
            thumbnail_offset: srce_core::constants::DEFAULT_THUMBNAIL_OFFSET,
        }
    }
}

impl TranscodeSettings {
    pub fn from_config(config: &SrceConfig) -> Self {
        Self {
            crf: config.transcode_crf,
            thumbnail_offset: config.thumbnail_offset,
        }
    }
}

/// Paths written by a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeArtifacts {
    pub compressed_path: PathBuf,
    pub thumbnail_path: PathBuf,
}

#[derive(Clone)]
pub struct TranscodePipeline {
    toolkit: Arc<dyn MediaToolkit>,
    repository: Arc<dyn VideoRepository>,
    layout: StorageLayout,
    settings: TranscodeSettings,
}

impl TranscodePipeline {
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        repository: Arc<dyn VideoRepository>,
        layout: StorageLayout,
        settings: TranscodeSettings,
    ) -> Self {
        Self {
            toolkit,
            repository,
            layout,
            settings,
        }
    }

    pub fn repository(&self) -> &Arc<dyn VideoRepository> {
        &self.repository
    }

    /// Run both steps for `video_id` and settle its status.
    ///
    /// Returns `NotFound` without touching any file when the record does not
    /// exist. If the record disappears while the tools run, the produced artifacts
    /// are removed and `NotFound` is returned. Any other failure to mark the
    /// record complete is handled like a failed step.
    #[tracing::instrument(skip(self, source), fields(source = %source.display()))]
    pub async fn process(&self, video_id: VideoId, source: &Path) -> AppResult<TranscodeArtifacts> {
        if self.repository.get_record(video_id).await?.is_none() {
            tracing::warn!("Video record not found, skipping transcode");
            return Err(AppError::NotFound(format!("Video {} not found", video_id)));
        }

        let artifacts = TranscodeArtifacts {
            compressed_path: self.layout.compressed_path(source)?,
            thumbnail_path: self.layout.thumbnail_path(source)?,
        };
        let start = Instant::now();

        if let Err(err) = self.run_steps(source, &artifacts).await {
            tracing::error!(error = %err, "Transcode failed");
            self.roll_back(video_id, source, &artifacts).await;
            return Err(err);
        }

        let update = VideoUpdate::Complete {
            compressed_path: artifacts.compressed_path.clone(),
            thumbnail_path: artifacts.thumbnail_path.clone(),
        };
        match self.repository.update_record(video_id, update).await {
            Ok(_) => {}
            Err(err @ AppError::NotFound(_)) => {
                tracing::warn!(error = %err, "Video record removed during transcode, discarding artifacts");
                remove_best_effort(&artifacts.compressed_path).await;
                remove_best_effort(&artifacts.thumbnail_path).await;
                return Err(err);
            }
            Err(err) => {
                tracing::error!(error = %err, "Could not mark video complete");
                self.roll_back(video_id, source, &artifacts).await;
                return Err(err);
            }
        }

        tracing::info!(
            compressed = %artifacts.compressed_path.display(),
            thumbnail = %artifacts.thumbnail_path.display(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transcode complete"
        );

        Ok(artifacts)
    }

    async fn run_steps(&self, source: &Path, artifacts: &TranscodeArtifacts) -> AppResult<()> {
        self.layout.ensure_output_roots().await?;

        // A leftover output from an earlier upload of the same name must not
        // pass for this run's result.
        remove_if_exists(&artifacts.compressed_path).await?;
        self.toolkit
            .transcode(source, &artifacts.compressed_path, self.settings.crf)
            .await?;

        remove_if_exists(&artifacts.thumbnail_path).await?;
        self.toolkit
            .extract_frame(
                &artifacts.compressed_path,
                &artifacts.thumbnail_path,
                self.settings.thumbnail_offset,
            )
            .await
    }

    async fn roll_back(&self, video_id: VideoId, source: &Path, artifacts: &TranscodeArtifacts) {
        remove_best_effort(source).await;
        remove_best_effort(&artifacts.compressed_path).await;
        remove_best_effort(&artifacts.thumbnail_path).await;

        if let Err(err) = self
            .repository
            .update_record(video_id, VideoUpdate::Failed)
            .await
        {
            tracing::error!(error = %err, "Failed to mark video as failed");
        }
    }
}

async fn remove_best_effort(path: &Path) {
    if let Err(e) = remove_if_exists(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
    }
}
