use srce_core::{AppError, AppResult, VideoId, VideoRecord};
use srce_db::VideoRepository;
use srce_storage::remove_if_exists;
use std::path::Path;
use std::sync::Arc;

/// Service for video lifecycle operations (deleting artifacts before the record).
#[derive(Clone)]
pub struct VideoLifecycleService {
    repository: Arc<dyn VideoRepository>,
}

impl VideoLifecycleService {
    pub fn new(repository: Arc<dyn VideoRepository>) -> Self {
        Self { repository }
    }

    /// Delete a video's files, then its record. Returns the deleted record.
    ///
    /// File removal is best-effort: missing files are skipped and other failures
    /// are logged without stopping the delete.
    #[tracing::instrument(skip(self))]
    pub async fn delete_video(&self, id: VideoId) -> AppResult<VideoRecord> {
        let record = self
            .repository
            .get_record(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", id)))?;

        futures::join!(
            delete_artifact(&record.original_path, "original"),
            delete_optional(record.compressed_path.as_deref(), "compressed"),
            delete_optional(record.thumbnail_path.as_deref(), "thumbnail"),
        );

        if !self.repository.delete_record(id).await? {
            return Err(AppError::NotFound(format!("Video {} not found", id)));
        }

        tracing::info!(video_id = id, owner = %record.owner, "Video deleted");
        Ok(record)
    }
}

async fn delete_optional(path: Option<&Path>, kind: &'static str) {
    if let Some(path) = path {
        delete_artifact(path, kind).await;
    }
}

async fn delete_artifact(path: &Path, kind: &'static str) {
    match remove_if_exists(path).await {
        Ok(true) => tracing::debug!(path = %path.display(), kind, "Deleted video artifact"),
        Ok(false) => tracing::debug!(path = %path.display(), kind, "Video artifact already gone"),
        Err(e) => tracing::error!(
            error = %e,
            path = %path.display(),
            kind,
            "Failed to delete video artifact"
        ),
    }
}
