//! Srce Core Library
//!
//! Domain models, error types, configuration and validation helpers shared by
//! every srce crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::SrceConfig;
pub use error::{AppError, AppResult, ErrorCategory, ErrorMetadata, LogLevel};
pub use models::{NewVideo, ProcessingStatus, VideoId, VideoRecord, VideoUpdate};
