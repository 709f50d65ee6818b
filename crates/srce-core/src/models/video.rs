use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Opaque numeric identity assigned by the persistence layer.
pub type VideoId = i64;

/// Lifecycle state of a video.
///
/// `Pending` is the only non-terminal state: it moves once to either `Complete`
/// or `Failed` and never moves again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "processing_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Complete,
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProcessingStatus::Pending)
    }

    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        self == ProcessingStatus::Pending && next.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Complete => "complete",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "complete" => Ok(ProcessingStatus::Complete),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(AppError::InvalidInput(format!(
                "Invalid processing status: {}",
                s
            ))),
        }
    }
}

/// A stored video and its artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoRecord {
    pub id: VideoId,
    /// Always lowercase.
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub original_path: PathBuf,
    pub compressed_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub content_type: String,
    pub status: ProcessingStatus,
}

impl VideoRecord {
    /// Artifact paths are present exactly when the video is complete.
    pub fn is_consistent(&self) -> bool {
        let has_artifacts = self.compressed_path.is_some() && self.thumbnail_path.is_some();
        let has_none = self.compressed_path.is_none() && self.thumbnail_path.is_none();
        match self.status {
            ProcessingStatus::Complete => has_artifacts,
            ProcessingStatus::Pending | ProcessingStatus::Failed => has_none,
        }
    }

    /// Apply a terminal update in place, refusing anything but `pending -> terminal`.
    pub fn apply(&mut self, update: VideoUpdate) -> Result<(), AppError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        match update {
            VideoUpdate::Complete {
                compressed_path,
                thumbnail_path,
            } => {
                self.compressed_path = Some(compressed_path);
                self.thumbnail_path = Some(thumbnail_path);
            }
            VideoUpdate::Failed => {
                self.compressed_path = None;
                self.thumbnail_path = None;
            }
        }
        self.status = next;
        Ok(())
    }
}

/// Fields supplied when a record is created. Status always starts at `pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewVideo {
    pub owner: String,
    pub original_path: PathBuf,
    pub content_type: String,
}

/// The only mutations a record ever receives after creation.
///
/// Carrying the artifact paths inside `Complete` keeps "paths set iff complete"
/// true by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VideoUpdate {
    Complete {
        compressed_path: PathBuf,
        thumbnail_path: PathBuf,
    },
    Failed,
}

impl VideoUpdate {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            VideoUpdate::Complete { .. } => ProcessingStatus::Complete,
            VideoUpdate::Failed => ProcessingStatus::Failed,
        }
    }
}
