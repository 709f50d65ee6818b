use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres};
use srce_core::{
    AppError, AppResult, NewVideo, ProcessingStatus, VideoId, VideoRecord, VideoUpdate,
};
use std::path::{Path, PathBuf};

use super::repository::VideoRepository;

/// Database row for the `videos` table.
#[derive(Debug, FromRow)]
pub struct VideoRow {
    pub id: i64,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub original_location: String,
    pub compressed_location: Option<String>,
    pub thumbnail_location: Option<String>,
    pub content_type: String,
    pub status: ProcessingStatus,
}

impl From<VideoRow> for VideoRecord {
    fn from(row: VideoRow) -> Self {
        VideoRecord {
            id: row.id,
            owner: row.owner,
            created_at: row.created_at,
            original_path: PathBuf::from(row.original_location),
            compressed_path: row.compressed_location.map(PathBuf::from),
            thumbnail_path: row.thumbnail_location.map(PathBuf::from),
            content_type: row.content_type,
            status: row.status,
        }
    }
}

fn location(path: &Path) -> AppResult<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "Path is not valid UTF-8: {}",
            path.display()
        ))
    })
}

/// PostgreSQL-backed video repository
#[derive(Clone)]
pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl VideoRepository for PgVideoRepository {
    #[tracing::instrument(skip(self, video), fields(db.table = "videos", db.operation = "insert", owner = %video.owner))]
    async fn create_record(&self, video: NewVideo) -> AppResult<VideoRecord> {
        let original_location = location(&video.original_path)?;

        let row: VideoRow = sqlx::query_as::<Postgres, VideoRow>(
            r#"
            INSERT INTO videos (owner, original_location, content_type, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING id, owner, created_at, original_location, compressed_location,
                      thumbnail_location, content_type, status
            "#,
        )
        .bind(&video.owner)
        .bind(&original_location)
        .bind(&video.content_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "videos", db.operation = "update", db.record_id = id))]
    async fn update_record(&self, id: VideoId, update: VideoUpdate) -> AppResult<VideoRecord> {
        let next = update.status();
        let (compressed_location, thumbnail_location) = match &update {
            VideoUpdate::Complete {
                compressed_path,
                thumbnail_path,
            } => (
                Some(location(compressed_path)?),
                Some(location(thumbnail_path)?),
            ),
            VideoUpdate::Failed => (None, None),
        };

        // The status guard makes the transition check and the write one statement.
        let row: Option<VideoRow> = sqlx::query_as::<Postgres, VideoRow>(
            r#"
            UPDATE videos
            SET status = $2, compressed_location = $3, thumbnail_location = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING id, owner, created_at, original_location, compressed_location,
                      thumbnail_location, content_type, status
            "#,
        )
        .bind(id)
        .bind(next)
        .bind(compressed_location)
        .bind(thumbnail_location)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        let current: Option<ProcessingStatus> =
            sqlx::query_scalar::<Postgres, ProcessingStatus>("SELECT status FROM videos WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            Some(from) => Err(AppError::InvalidTransition { from, to: next }),
            None => Err(AppError::NotFound(format!("Video {} not found", id))),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select", db.record_id = id))]
    async fn get_record(&self, id: VideoId) -> AppResult<Option<VideoRecord>> {
        let row: Option<VideoRow> = sqlx::query_as::<Postgres, VideoRow>(
            r#"
            SELECT id, owner, created_at, original_location, compressed_location,
                   thumbnail_location, content_type, status
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VideoRecord::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "delete", db.record_id = id))]
    async fn delete_record(&self, id: VideoId) -> AppResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select"))]
    async fn list_by_owner(&self, owner: &str) -> AppResult<Vec<VideoRecord>> {
        let rows: Vec<VideoRow> = sqlx::query_as::<Postgres, VideoRow>(
            r#"
            SELECT id, owner, created_at, original_location, compressed_location,
                   thumbnail_location, content_type, status
            FROM videos
            WHERE owner = $1
            ORDER BY id
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VideoRecord::from).collect())
    }
}
