use async_trait::async_trait;
use srce_core::constants::TRANSCODE_VIDEO_CODEC;
use srce_core::{AppError, AppResult};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

use super::toolkit::{MediaToolkit, ProbeReport, ToolStep};

/// Longest stderr tail kept in a `ToolFailed` error.
const STDERR_TAIL_BYTES: usize = 2048;

/// Media toolkit backed by the ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg_path: String,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_path: impl Into<String>) -> AppResult<Self> {
        let ffmpeg_path = ffmpeg_path.into();

        let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
        if ffmpeg_path.trim().is_empty() || ffmpeg_path.chars().any(|c| dangerous_chars.contains(&c)) {
            return Err(AppError::InvalidInput(
                "Invalid ffmpeg_path: contains dangerous characters".to_string(),
            ));
        }

        Ok(Self { ffmpeg_path })
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    fn tool_name(&self, step: ToolStep) -> String {
        format!("{} ({})", self.ffmpeg_path, step)
    }

    async fn run(&self, step: ToolStep, args: Vec<OsString>) -> AppResult<Output> {
        let start = Instant::now();

        let output = Command::new(&self.ffmpeg_path)
            .arg("-hide_banner")
            .arg("-nostdin")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::ToolUnavailable {
                tool: self.tool_name(step),
                source: e,
            })?;

        tracing::debug!(
            step = %step,
            exit_code = ?output.status.code(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "ffmpeg finished"
        );

        Ok(output)
    }

    /// Treat a nonzero exit, or a zero exit that left no output, as failure.
    async fn check_produced(&self, step: ToolStep, output: Output, produced: &Path) -> AppResult<()> {
        let stderr = stderr_tail(&output.stderr);

        if !output.status.success() {
            return Err(AppError::ToolFailed {
                tool: self.tool_name(step),
                exit_code: output.status.code(),
                stderr,
            });
        }

        let size = tokio::fs::metadata(produced)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(AppError::ToolFailed {
                tool: self.tool_name(step),
                exit_code: output.status.code(),
                stderr: if stderr.is_empty() {
                    format!("no output written to {}", produced.display())
                } else {
                    stderr
                },
            });
        }

        Ok(())
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    #[tracing::instrument(skip(self, input), fields(input = %input.display()))]
    async fn probe(&self, input: &Path) -> AppResult<ProbeReport> {
        // With no output ffmpeg always exits nonzero; only the diagnostics matter.
        let output = self
            .run(ToolStep::Probe, vec!["-i".into(), input.into()])
            .await?;

        Ok(ProbeReport {
            diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    #[tracing::instrument(skip(self, input, output), fields(input = %input.display(), output = %output.display()))]
    async fn transcode(&self, input: &Path, output: &Path, crf: u8) -> AppResult<()> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-vcodec".into(),
            TRANSCODE_VIDEO_CODEC.into(),
            "-crf".into(),
            crf.to_string().into(),
            output.into(),
        ];

        let result = self.run(ToolStep::Transcode, args).await?;
        self.check_produced(ToolStep::Transcode, result, output).await
    }

    #[tracing::instrument(skip(self, input, output), fields(input = %input.display(), output = %output.display()))]
    async fn extract_frame(&self, input: &Path, output: &Path, offset: Duration) -> AppResult<()> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-ss".into(),
            format_timestamp(offset).into(),
            "-vframes".into(),
            "1".into(),
            output.into(),
        ];

        let result = self.run(ToolStep::ExtractFrame, args).await?;
        self.check_produced(ToolStep::ExtractFrame, result, output).await
    }
}

/// `HH:MM:SS.mmm`, as accepted by ffmpeg's `-ss`.
pub fn format_timestamp(offset: Duration) -> String {
    let total_ms = offset.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }

    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
