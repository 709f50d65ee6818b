//! Scripted MediaToolkit that never spawns a process

use async_trait::async_trait;
use srce_core::{AppError, AppResult};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::video::{MediaToolkit, ProbeReport, ToolStep};

const DEFAULT_DIAGNOSTICS: &str =
    "Input #0, matroska,webm, from 'input.mkv':\n  Duration: 00:00:10.00\n  Stream #0:0: Video: h264 (High), yuv420p, 1280x720";

/// One recorded toolkit invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeCall {
    pub step: ToolStep,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Whether a file was already at `output` when the call was made.
    pub output_existed: bool,
}

#[derive(Default)]
struct FakeState {
    probe_diagnostics: Vec<(String, String)>,
    failures: Vec<(ToolStep, String)>,
    unavailable: bool,
    delay: Option<Duration>,
    calls: Vec<FakeCall>,
}

/// Scripted toolkit.
///
/// Successful `transcode` and `extract_frame` calls write a small placeholder
/// file at the output path. A scripted failure writes a partial output first and
/// then reports `ToolFailed`, like a tool that dies midway. Patterns match when
/// the input path contains them; an empty pattern matches everything.
///
/// Clones share the script and the call log.
#[derive(Clone, Default)]
pub struct FakeToolkit {
    state: Arc<Mutex<FakeState>>,
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Probe output for inputs whose path contains `pattern`.
    pub fn with_probe_diagnostics(self, pattern: &str, diagnostics: &str) -> Self {
        self.state()
            .probe_diagnostics
            .push((pattern.to_string(), diagnostics.to_string()));
        self
    }

    /// Make `step` fail for inputs whose path contains `pattern`.
    pub fn failing(self, step: ToolStep, pattern: &str) -> Self {
        self.state().failures.push((step, pattern.to_string()));
        self
    }

    /// Every call fails as if the binary were missing.
    pub fn unavailable(self) -> Self {
        self.state().unavailable = true;
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, step: ToolStep) -> usize {
        self.state().calls.iter().filter(|c| c.step == step).count()
    }

    /// Record the call, apply the delay and report whether it should fail.
    async fn begin(&self, step: ToolStep, input: &Path, output: Option<&Path>) -> AppResult<bool> {
        let (delay, unavailable, fails) = {
            let mut state = self.state();
            state.calls.push(FakeCall {
                step,
                input: input.to_path_buf(),
                output: output.map(Path::to_path_buf),
                output_existed: output.is_some_and(Path::exists),
            });
            let input_text = input.to_string_lossy();
            let fails = state
                .failures
                .iter()
                .any(|(s, pattern)| *s == step && input_text.contains(pattern.as_str()));
            (state.delay, state.unavailable, fails)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if unavailable {
            return Err(AppError::ToolUnavailable {
                tool: format!("fake-ffmpeg ({})", step),
                source: io::Error::new(io::ErrorKind::NotFound, "fake tool is unavailable"),
            });
        }

        Ok(fails)
    }

    async fn produce(&self, step: ToolStep, input: &Path, output: &Path, contents: &[u8]) -> AppResult<()> {
        let fails = self.begin(step, input, Some(output)).await?;

        if fails {
            tokio::fs::write(output, b"partial")
                .await
                .map_err(|e| AppError::io(output, e))?;
            return Err(AppError::ToolFailed {
                tool: format!("fake-ffmpeg ({})", step),
                exit_code: Some(1),
                stderr: "Conversion failed!".to_string(),
            });
        }

        tokio::fs::metadata(input)
            .await
            .map_err(|e| AppError::io(input, e))?;
        tokio::fs::write(output, contents)
            .await
            .map_err(|e| AppError::io(output, e))
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, input: &Path) -> AppResult<ProbeReport> {
        self.begin(ToolStep::Probe, input, None).await?;

        let input_text = input.to_string_lossy();
        let diagnostics = self
            .state()
            .probe_diagnostics
            .iter()
            .find(|(pattern, _)| input_text.contains(pattern.as_str()))
            .map(|(_, diagnostics)| diagnostics.clone())
            .unwrap_or_else(|| DEFAULT_DIAGNOSTICS.to_string());

        Ok(ProbeReport {
            diagnostics,
            exit_code: Some(1),
        })
    }

    async fn transcode(&self, input: &Path, output: &Path, _crf: u8) -> AppResult<()> {
        self.produce(ToolStep::Transcode, input, output, b"fake-mp4")
            .await
    }

    async fn extract_frame(&self, input: &Path, output: &Path, _offset: Duration) -> AppResult<()> {
        self.produce(ToolStep::ExtractFrame, input, output, b"fake-jpg")
            .await
    }
}
