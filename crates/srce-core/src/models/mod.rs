//! Domain models

pub mod video;

pub use video::{NewVideo, ProcessingStatus, VideoId, VideoRecord, VideoUpdate};
