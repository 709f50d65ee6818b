//! Srce Services Library
//!
//! Ingestion (single-shot and chunked uploads), video lifecycle operations and
//! the wiring that assembles them from configuration.

pub mod ingest;
pub mod lifecycle;
pub mod setup;

pub use ingest::{ChunkReceipt, ChunkUpload, IngestService};
pub use lifecycle::VideoLifecycleService;
pub use setup::{build_runtime, toolkit_from_config, SrceRuntime};
