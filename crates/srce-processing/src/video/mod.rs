//! Video tooling
//!
//! The media tool is treated as a capability: `probe`, `transcode` and
//! `extract_frame`. The ffmpeg implementation shells out; tests substitute a
//! scripted one.

mod bounded;
mod ffmpeg;
mod toolkit;

pub use bounded::BoundedToolkit;
pub use ffmpeg::{format_timestamp, FfmpegToolkit};
pub use toolkit::{MediaToolkit, ProbeReport, ToolStep};
