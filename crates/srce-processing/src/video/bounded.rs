use async_trait::async_trait;
use srce_core::{AppError, AppResult};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use super::toolkit::{MediaToolkit, ProbeReport, ToolStep};

/// Puts a per-step time limit on another toolkit.
///
/// When the limit expires the inner future is dropped. For [`super::FfmpegToolkit`]
/// that kills the child process.
#[derive(Debug, Clone)]
pub struct BoundedToolkit<T> {
    inner: T,
    limit: Duration,
}

impl<T> BoundedToolkit<T> {
    pub fn new(inner: T, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<F, R>(&self, step: ToolStep, fut: F) -> AppResult<R>
    where
        F: Future<Output = AppResult<R>> + Send,
    {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(step = %step, limit_secs = self.limit.as_secs(), "Media tool step timed out");
                Err(AppError::Timeout {
                    operation: step.to_string(),
                    seconds: self.limit.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl<T: MediaToolkit> MediaToolkit for BoundedToolkit<T> {
    async fn probe(&self, input: &Path) -> AppResult<ProbeReport> {
        self.bounded(ToolStep::Probe, self.inner.probe(input)).await
    }

    async fn transcode(&self, input: &Path, output: &Path, crf: u8) -> AppResult<()> {
        self.bounded(ToolStep::Transcode, self.inner.transcode(input, output, crf))
            .await
    }

    async fn extract_frame(&self, input: &Path, output: &Path, offset: Duration) -> AppResult<()> {
        self.bounded(
            ToolStep::ExtractFrame,
            self.inner.extract_frame(input, output, offset),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeToolkit;

    #[tokio::test]
    async fn test_slow_step_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mkv");
        tokio::fs::write(&input, b"video").await.unwrap();

        let fake = FakeToolkit::new().with_delay(Duration::from_millis(500));
        let bounded = BoundedToolkit::new(fake, Duration::from_millis(20));

        let err = bounded
            .transcode(&input, &dir.path().join("out.mp4"), 28)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout { ref operation, .. } if operation == "compress"));
    }

    #[tokio::test]
    async fn test_fast_step_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mkv");
        tokio::fs::write(&input, b"video").await.unwrap();

        let bounded = BoundedToolkit::new(FakeToolkit::new(), Duration::from_secs(5));
        let report = bounded.probe(&input).await.unwrap();
        assert!(report.diagnostics.contains("Video: h264"));
    }
}
