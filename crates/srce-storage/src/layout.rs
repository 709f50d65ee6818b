use chrono::{DateTime, Utc};
use srce_core::constants::{
    COMPRESSED_EXTENSION, COMPRESSED_PREFIX, THUMBNAIL_EXTENSION, THUMBNAIL_PREFIX,
    UPLOAD_TIMESTAMP_FORMAT,
};
use srce_core::{AppError, AppResult, SrceConfig};
use std::path::{Path, PathBuf};

use crate::files::ensure_dir;

/// Where every source and artifact lives. Paths are derived, never chosen per call.
///
/// ```text
/// {video_dir}/{owner}/{name}/{seq}.{ext}      staged chunk
/// {video_dir}/{owner}/{name}.{ext}            merged source
/// {video_dir}/{owner}_{timestamp}_{filename}  single-shot source
/// {compressed_dir}/compressed_{basename}.mp4
/// {thumbnail_dir}/thumbnail_{basename}.jpg
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    video_dir: PathBuf,
    compressed_dir: PathBuf,
    thumbnail_dir: PathBuf,
    chunk_extension: String,
}

impl StorageLayout {
    pub fn new(
        video_dir: impl Into<PathBuf>,
        compressed_dir: impl Into<PathBuf>,
        thumbnail_dir: impl Into<PathBuf>,
        chunk_extension: impl Into<String>,
    ) -> Self {
        Self {
            video_dir: video_dir.into(),
            compressed_dir: compressed_dir.into(),
            thumbnail_dir: thumbnail_dir.into(),
            chunk_extension: chunk_extension.into(),
        }
    }

    pub fn from_config(config: &SrceConfig) -> Self {
        Self::new(
            &config.video_dir,
            &config.compressed_dir,
            &config.thumbnail_dir,
            &config.chunk_extension,
        )
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    pub fn compressed_dir(&self) -> &Path {
        &self.compressed_dir
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    pub fn chunk_extension(&self) -> &str {
        &self.chunk_extension
    }

    pub fn staging_dir(&self, owner: &str, logical_name: &str) -> PathBuf {
        self.video_dir.join(owner).join(logical_name)
    }

    pub fn chunk_path(&self, owner: &str, logical_name: &str, sequence_id: u64) -> PathBuf {
        self.staging_dir(owner, logical_name)
            .join(format!("{}.{}", sequence_id, self.chunk_extension))
    }

    pub fn merged_path(&self, owner: &str, logical_name: &str) -> PathBuf {
        self.video_dir
            .join(owner)
            .join(format!("{}.{}", logical_name, self.chunk_extension))
    }

    pub fn single_shot_path(
        &self,
        owner: &str,
        uploaded_at: DateTime<Utc>,
        original_filename: &str,
    ) -> PathBuf {
        self.video_dir.join(format!(
            "{}_{}_{}",
            owner,
            uploaded_at.format(UPLOAD_TIMESTAMP_FORMAT),
            original_filename
        ))
    }

    pub fn compressed_path(&self, source: &Path) -> AppResult<PathBuf> {
        let basename = source_basename(source)?;
        Ok(self.compressed_dir.join(format!(
            "{}{}.{}",
            COMPRESSED_PREFIX, basename, COMPRESSED_EXTENSION
        )))
    }

    pub fn thumbnail_path(&self, source: &Path) -> AppResult<PathBuf> {
        let basename = source_basename(source)?;
        Ok(self.thumbnail_dir.join(format!(
            "{}{}.{}",
            THUMBNAIL_PREFIX, basename, THUMBNAIL_EXTENSION
        )))
    }

    /// Create the three roots. Safe to call repeatedly.
    pub async fn ensure_roots(&self) -> AppResult<()> {
        ensure_dir(&self.video_dir).await?;
        ensure_dir(&self.compressed_dir).await?;
        ensure_dir(&self.thumbnail_dir).await?;
        Ok(())
    }

    /// Create only the artifact roots the transcode pipeline writes into.
    pub async fn ensure_output_roots(&self) -> AppResult<()> {
        ensure_dir(&self.compressed_dir).await?;
        ensure_dir(&self.thumbnail_dir).await?;
        Ok(())
    }
}

/// File name of the source, extension included.
fn source_basename(source: &Path) -> AppResult<&str> {
    source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Source path has no usable file name: {}",
                source.display()
            ))
        })
}
