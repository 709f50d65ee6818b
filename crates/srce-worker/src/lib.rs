//! Srce Worker Library
//!
//! Bounded queue and worker pool that runs transcode jobs off the ingest path.

pub mod job_queue;

pub use job_queue::{JobOutcome, JobSubmitter, QueueSettings, VideoJob, VideoJobQueue};
