use bytes::Bytes;
use serde::Serialize;
use srce_core::VideoRecord;
use std::path::PathBuf;

/// One chunk ("blob") of a chunked upload.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub owner: String,
    /// Logical name shared by every chunk of the upload.
    pub filename: String,
    pub blob_id: u64,
    pub payload: Bytes,
    /// Set on the final chunk; triggers the merge.
    pub is_last: bool,
    /// Derived from the chunk extension when absent.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ChunkReceipt {
    Stored { path: PathBuf },
    Completed { record: VideoRecord },
}
