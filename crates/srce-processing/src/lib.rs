//! Srce Processing Library
//!
//! External media tooling behind the [`MediaToolkit`] seam, the validation gate
//! and the two-stage transcode pipeline.

pub mod pipeline;
pub mod validator;
pub mod video;

// Test helpers (test builds, or downstream tests via the `test-helpers` feature)
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use pipeline::{TranscodeArtifacts, TranscodePipeline, TranscodeSettings};
pub use validator::{classify_probe_output, MediaValidator};
pub use video::{BoundedToolkit, FfmpegToolkit, MediaToolkit, ProbeReport, ToolStep};
