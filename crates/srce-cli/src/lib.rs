use anyhow::Context;
use serde::Serialize;
use srce_core::SrceConfig;
use srce_db::{connect_and_migrate, InMemoryVideoRepository, PgVideoRepository, VideoRepository};
use std::sync::Arc;

/// Initialize tracing for CLI binaries. Production environments log JSON.
pub fn init_tracing(config: &SrceConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise a process-local store.
pub async fn open_repository(config: &SrceConfig) -> anyhow::Result<Arc<dyn VideoRepository>> {
    match &config.database_url {
        Some(url) => {
            let pool = connect_and_migrate(url, config.db_max_connections)
                .await
                .context("Failed to set up database")?;
            Ok(Arc::new(PgVideoRepository::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory for this run only");
            Ok(Arc::new(InMemoryVideoRepository::new()))
        }
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Byte ranges `(blob_id, offset, len)` covering `total` bytes, blob ids from 1.
///
/// An empty input still yields one empty chunk so the upload can complete.
pub fn chunk_plan(total: u64, chunk_size: u64) -> Vec<(u64, u64, u64)> {
    let chunk_size = chunk_size.max(1);
    if total == 0 {
        return vec![(1, 0, 0)];
    }

    let count = total.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let offset = i * chunk_size;
            (i + 1, offset, chunk_size.min(total - offset))
        })
        .collect()
}
