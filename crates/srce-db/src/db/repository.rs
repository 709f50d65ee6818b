use srce_core::{AppResult, NewVideo, VideoId, VideoRecord, VideoUpdate};

/// Durable store of video records.
///
/// Implementations assign ids, stamp `created_at` and refuse any update that is
/// not `pending -> complete` or `pending -> failed`.
#[async_trait::async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert a new record with status `pending` and no artifact paths.
    async fn create_record(&self, video: NewVideo) -> AppResult<VideoRecord>;

    /// Move a pending record to a terminal state.
    ///
    /// Fails with `NotFound` for an unknown id and `InvalidTransition` when the
    /// record is already terminal.
    async fn update_record(&self, id: VideoId, update: VideoUpdate) -> AppResult<VideoRecord>;

    async fn get_record(&self, id: VideoId) -> AppResult<Option<VideoRecord>>;

    /// Returns `false` if no record had this id.
    async fn delete_record(&self, id: VideoId) -> AppResult<bool>;

    /// Records owned by `owner`, oldest first. `owner` is expected lowercase.
    async fn list_by_owner(&self, owner: &str) -> AppResult<Vec<VideoRecord>>;
}
