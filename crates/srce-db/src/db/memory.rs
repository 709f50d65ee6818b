use chrono::Utc;
use srce_core::{AppError, AppResult, NewVideo, VideoId, VideoRecord, VideoUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::repository::VideoRepository;

/// Process-local repository used when no database is configured, and by tests.
#[derive(Clone, Default)]
pub struct InMemoryVideoRepository {
    records: Arc<Mutex<HashMap<VideoId, VideoRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn create_record(&self, video: NewVideo) -> AppResult<VideoRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = VideoRecord {
            id,
            owner: video.owner,
            created_at: Utc::now(),
            original_path: video.original_path,
            compressed_path: None,
            thumbnail_path: None,
            content_type: video.content_type,
            status: srce_core::ProcessingStatus::Pending,
        };
        self.records.lock().await.insert(id, record.clone());
        tracing::debug!(video_id = id, "Video record created");
        Ok(record)
    }

    async fn update_record(&self, id: VideoId, update: VideoUpdate) -> AppResult<VideoRecord> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", id)))?;
        record.apply(update)?;
        Ok(record.clone())
    }

    async fn get_record(&self, id: VideoId) -> AppResult<Option<VideoRecord>> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn delete_record(&self, id: VideoId) -> AppResult<bool> {
        Ok(self.records.lock().await.remove(&id).is_some())
    }

    async fn list_by_owner(&self, owner: &str) -> AppResult<Vec<VideoRecord>> {
        let records = self.records.lock().await;
        let mut owned: Vec<VideoRecord> = records
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|r| r.id);
        Ok(owned)
    }
}
