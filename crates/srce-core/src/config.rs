//! Configuration module
//!
//! Runtime settings for the ingest, storage and transcode layers, loaded from the
//! environment (and an optional `.env` file).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{DEFAULT_CHUNK_EXTENSION, DEFAULT_TRANSCODE_CRF, MAX_TRANSCODE_CRF};

const MAX_CONCURRENT_TRANSCODES: usize = 2;
const VIDEO_JOB_QUEUE_SIZE: usize = 1000;
const DB_MAX_CONNECTIONS: u32 = 5;
const THUMBNAIL_OFFSET_SECS: f64 = 2.0;

#[derive(Clone, Debug)]
pub struct SrceConfig {
    pub video_dir: PathBuf,
    pub compressed_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    /// Extension of staged chunk files and merged artifacts, without the dot.
    pub chunk_extension: String,
    pub ffmpeg_path: String,
    pub transcode_crf: u8,
    pub thumbnail_offset: Duration,
    pub max_concurrent_transcodes: usize,
    pub video_job_queue_size: usize,
    /// Per-step limit for external tool invocations. `None` waits indefinitely.
    pub transcode_timeout: Option<Duration>,
    pub cleanup_staging_after_merge: bool,
    /// When unset, records are kept in memory only.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub environment: String,
}

impl Default for SrceConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("videos"),
            compressed_dir: PathBuf::from("compressed"),
            thumbnail_dir: PathBuf::from("thumbnails"),
            chunk_extension: DEFAULT_CHUNK_EXTENSION.to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            transcode_crf: DEFAULT_TRANSCODE_CRF,
            thumbnail_offset: Duration::from_secs_f64(THUMBNAIL_OFFSET_SECS),
            max_concurrent_transcodes: MAX_CONCURRENT_TRANSCODES,
            video_job_queue_size: VIDEO_JOB_QUEUE_SIZE,
            transcode_timeout: None,
            cleanup_staging_after_merge: false,
            database_url: None,
            db_max_connections: DB_MAX_CONNECTIONS,
            environment: "development".to_string(),
        }
    }
}

impl SrceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = SrceConfig::default();

        let thumbnail_offset_secs: f64 = env::var("THUMBNAIL_OFFSET_SECS")
            .unwrap_or_else(|_| THUMBNAIL_OFFSET_SECS.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("THUMBNAIL_OFFSET_SECS must be a number of seconds"))?;
        let thumbnail_offset = Duration::try_from_secs_f64(thumbnail_offset_secs)
            .map_err(|_| anyhow::anyhow!("THUMBNAIL_OFFSET_SECS must be a non-negative number"))?;

        let transcode_timeout = match env::var("TRANSCODE_TIMEOUT_SECS") {
            Ok(value) if !value.trim().is_empty() => {
                let secs: u64 = value.trim().parse().map_err(|_| {
                    anyhow::anyhow!("TRANSCODE_TIMEOUT_SECS must be a whole number of seconds")
                })?;
                Some(Duration::from_secs(secs))
            }
            _ => None,
        };

        let config = SrceConfig {
            video_dir: env::var("VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.video_dir),
            compressed_dir: env::var("COMPRESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.compressed_dir),
            thumbnail_dir: env::var("THUMBNAIL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.thumbnail_dir),
            chunk_extension: env::var("CHUNK_EXTENSION")
                .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                .unwrap_or(defaults.chunk_extension),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            transcode_crf: env_setting("TRANSCODE_CRF", DEFAULT_TRANSCODE_CRF)?,
            thumbnail_offset,
            max_concurrent_transcodes: env_setting(
                "MAX_CONCURRENT_TRANSCODES",
                MAX_CONCURRENT_TRANSCODES,
            )?,
            video_job_queue_size: env_setting("VIDEO_JOB_QUEUE_SIZE", VIDEO_JOB_QUEUE_SIZE)?,
            transcode_timeout,
            cleanup_staging_after_merge: env_setting("CLEANUP_STAGING_AFTER_MERGE", false)?,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            db_max_connections: env_setting("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
            environment: env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or(defaults.environment),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.transcode_crf > MAX_TRANSCODE_CRF {
            return Err(anyhow::anyhow!(
                "TRANSCODE_CRF must be between 0 and {}",
                MAX_TRANSCODE_CRF
            ));
        }

        if self.max_concurrent_transcodes == 0 {
            return Err(anyhow::anyhow!(
                "MAX_CONCURRENT_TRANSCODES must be at least 1"
            ));
        }

        if self.video_job_queue_size == 0 {
            return Err(anyhow::anyhow!("VIDEO_JOB_QUEUE_SIZE must be at least 1"));
        }

        if self.chunk_extension.is_empty()
            || !self
                .chunk_extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(anyhow::anyhow!(
                "CHUNK_EXTENSION must be a non-empty alphanumeric extension"
            ));
        }

        if self.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("FFMPEG_PATH must not be empty"));
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn env_setting<T: FromStr>(name: &str, default: T) -> Result<T, anyhow::Error> {
    parse_setting(name, env::var(name).ok(), default)
}

/// Parse an optional raw value, falling back to `default` only when it is unset or blank.
fn parse_setting<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, anyhow::Error> {
    match raw {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", name, value)),
        _ => Ok(default),
    }
}
