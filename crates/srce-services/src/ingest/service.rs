//! Upload ingestion: store, validate, record, schedule.
//!
//! A file only gets a record after it passes the validation gate. Rejected or
//! unverifiable content is deleted before the error reaches the caller.

use bytes::Bytes;
use chrono::Utc;
use srce_core::validation::{content_type_for_extension, normalize_owner, validate_path_segment};
use srce_core::{AppError, AppResult, NewVideo, VideoId, VideoRecord, VideoUpdate};
use srce_db::VideoRepository;
use srce_processing::MediaValidator;
use srce_storage::{remove_if_exists, write_stream, ChunkStore, MergeGuard, StorageLayout};
use srce_worker::{JobSubmitter, VideoJob};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

use super::types::{ChunkReceipt, ChunkUpload};

#[derive(Clone)]
pub struct IngestService {
    layout: StorageLayout,
    chunks: ChunkStore,
    validator: MediaValidator,
    repository: Arc<dyn VideoRepository>,
    jobs: Arc<dyn JobSubmitter>,
    cleanup_staging_after_merge: bool,
}

impl IngestService {
    pub fn new(
        chunks: ChunkStore,
        validator: MediaValidator,
        repository: Arc<dyn VideoRepository>,
        jobs: Arc<dyn JobSubmitter>,
    ) -> Self {
        Self {
            layout: chunks.layout().clone(),
            chunks,
            validator,
            repository,
            jobs,
            cleanup_staging_after_merge: false,
        }
    }

    /// Remove the staging directory after every successful merge.
    pub fn with_staging_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_staging_after_merge = enabled;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Accept a complete video in one piece.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn upload_video(
        &self,
        owner: &str,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> AppResult<VideoRecord> {
        let mut reader: &[u8] = &data;
        self.store_single_shot(owner, filename, content_type, &mut reader)
            .await
    }

    /// Like [`IngestService::upload_video`], copying from `reader` until EOF.
    #[tracing::instrument(skip(self, reader))]
    pub async fn upload_video_from_reader<R>(
        &self,
        owner: &str,
        filename: &str,
        content_type: &str,
        reader: &mut R,
    ) -> AppResult<VideoRecord>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        self.store_single_shot(owner, filename, content_type, reader)
            .await
    }

    /// Write a single-shot upload, removing whatever was written if the copy fails.
    async fn store_single_shot<R>(
        &self,
        owner: &str,
        filename: &str,
        content_type: &str,
        reader: &mut R,
    ) -> AppResult<VideoRecord>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let owner = normalize_owner(owner)?;
        validate_path_segment("filename", filename)?;

        self.layout.ensure_roots().await?;
        let path = self.layout.single_shot_path(&owner, Utc::now(), filename);

        if let Err(e) = write_stream(&path, reader).await {
            discard_file(&path).await;
            return Err(e);
        }
        self.admit(&owner, path, content_type).await
    }

    /// Stage one chunk; on the final chunk merge, validate and record the upload.
    #[tracing::instrument(
        skip(self, upload),
        fields(owner = %upload.owner, filename = %upload.filename, blob_id = upload.blob_id, is_last = upload.is_last)
    )]
    pub async fn receive_chunk(&self, upload: ChunkUpload) -> AppResult<ChunkReceipt> {
        let owner = normalize_owner(&upload.owner)?;
        let name = upload.filename.as_str();

        if !upload.is_last {
            let path = self
                .chunks
                .store_chunk(&owner, name, upload.blob_id, &upload.payload)
                .await?;
            return Ok(ChunkReceipt::Stored { path });
        }

        // Held until the upload is recorded and scheduled, so a second final
        // chunk for the key fails with `MergeInProgress`.
        let guard = self.chunks.begin_finalize(&owner, name).await?;
        self.ensure_not_in_flight(&owner, name).await?;

        self.chunks
            .store_chunk_guarded(&guard, upload.blob_id, &upload.payload)
            .await?;
        let merged = self.chunks.merge_guarded(&guard).await?;

        match self.validator.is_valid_media(&merged).await {
            Ok(true) => {}
            Ok(false) => {
                discard_file(&merged).await;
                self.discard_staging(&guard).await;
                return Err(AppError::InvalidMedia(format!(
                    "{} is not a decodable video",
                    name
                )));
            }
            Err(e) => {
                // Staging stays so the final chunk can be resent.
                discard_file(&merged).await;
                return Err(e);
            }
        }

        let content_type = upload
            .content_type
            .unwrap_or_else(|| content_type_for_extension(self.layout.chunk_extension()).to_string());
        let record = self.create_and_schedule(&owner, merged, &content_type).await?;

        if self.cleanup_staging_after_merge {
            self.discard_staging(&guard).await;
        }

        Ok(ChunkReceipt::Completed { record })
    }

    /// A merged source still being transcoded must not be overwritten.
    async fn ensure_not_in_flight(&self, owner: &str, name: &str) -> AppResult<()> {
        let merged = self.layout.merged_path(owner, name);
        let pending = self
            .repository
            .list_by_owner(owner)
            .await?
            .into_iter()
            .find(|record| record.original_path == merged && !record.status.is_terminal());

        match pending {
            Some(record) => {
                tracing::warn!(video_id = record.id, "Previous upload of this name is still being transcoded");
                Err(AppError::MergeInProgress {
                    owner: owner.to_string(),
                    logical_name: name.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    pub async fn get_video(&self, id: VideoId) -> AppResult<VideoRecord> {
        self.repository
            .get_record(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", id)))
    }

    pub async fn list_videos(&self, owner: &str) -> AppResult<Vec<VideoRecord>> {
        let owner = normalize_owner(owner)?;
        self.repository.list_by_owner(&owner).await
    }

    /// Validate a stored single-shot file, then record and schedule it.
    async fn admit(&self, owner: &str, path: PathBuf, content_type: &str) -> AppResult<VideoRecord> {
        match self.validator.is_valid_media(&path).await {
            Ok(true) => {}
            Ok(false) => {
                discard_file(&path).await;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return Err(AppError::InvalidMedia(format!(
                    "{} is not a decodable video",
                    name
                )));
            }
            Err(e) => {
                discard_file(&path).await;
                return Err(e);
            }
        }

        self.create_and_schedule(owner, path, content_type).await
    }

    async fn create_and_schedule(
        &self,
        owner: &str,
        path: PathBuf,
        content_type: &str,
    ) -> AppResult<VideoRecord> {
        let record = match self
            .repository
            .create_record(NewVideo {
                owner: owner.to_string(),
                original_path: path.clone(),
                content_type: content_type.to_string(),
            })
            .await
        {
            Ok(record) => record,
            Err(e) => {
                discard_file(&path).await;
                return Err(e);
            }
        };

        let job = VideoJob::Transcode {
            video_id: record.id,
            source_path: path.clone(),
        };
        if let Err(e) = self.jobs.submit(job) {
            tracing::error!(video_id = record.id, error = %e, "Failed to schedule transcode");
            discard_file(&path).await;
            if let Err(update_err) = self
                .repository
                .update_record(record.id, VideoUpdate::Failed)
                .await
            {
                tracing::error!(video_id = record.id, error = %update_err, "Failed to mark video as failed");
            }
            return Err(e);
        }

        tracing::info!(
            video_id = record.id,
            path = %record.original_path.display(),
            "Video accepted, transcode scheduled"
        );
        Ok(record)
    }

    async fn discard_staging(&self, guard: &MergeGuard) {
        if let Err(e) = self.chunks.discard_staging_guarded(guard).await {
            tracing::warn!(key = %guard.key(), error = %e, "Failed to remove staging directory");
        }
    }
}

async fn discard_file(path: &Path) {
    if let Err(e) = remove_if_exists(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove rejected upload");
    }
}
