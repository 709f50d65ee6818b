//! Video ingestion

mod service;
mod types;

pub use service::IngestService;
pub use types::{ChunkReceipt, ChunkUpload};
