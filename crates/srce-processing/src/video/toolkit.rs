use async_trait::async_trait;
use srce_core::AppResult;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One invocation kind of the media tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolStep {
    Probe,
    Transcode,
    ExtractFrame,
}

impl ToolStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStep::Probe => "probe",
            ToolStep::Transcode => "compress",
            ToolStep::ExtractFrame => "thumbnail",
        }
    }
}

impl fmt::Display for ToolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic output of a probe, whatever the tool's exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub diagnostics: String,
    pub exit_code: Option<i32>,
}

/// Media tool capability.
///
/// All methods return `ToolUnavailable` when the tool cannot be started at all.
/// `transcode` and `extract_frame` return `ToolFailed` when the tool runs and
/// reports failure or produces no output.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe(&self, input: &Path) -> AppResult<ProbeReport>;

    /// Encode `input` into `output` with an H.264-class codec at the given CRF.
    async fn transcode(&self, input: &Path, output: &Path, crf: u8) -> AppResult<()>;

    /// Write the single frame found at `offset` into `output`.
    async fn extract_frame(&self, input: &Path, output: &Path, offset: Duration) -> AppResult<()>;
}

#[async_trait]
impl<T: MediaToolkit + ?Sized> MediaToolkit for Arc<T> {
    async fn probe(&self, input: &Path) -> AppResult<ProbeReport> {
        (**self).probe(input).await
    }

    async fn transcode(&self, input: &Path, output: &Path, crf: u8) -> AppResult<()> {
        (**self).transcode(input, output, crf).await
    }

    async fn extract_frame(&self, input: &Path, output: &Path, offset: Duration) -> AppResult<()> {
        (**self).extract_frame(input, output, offset).await
    }
}
