//! Input validation shared by the ingest and storage layers

use crate::constants::FALLBACK_CONTENT_TYPE;
use crate::error::{AppError, AppResult};

const MAX_SEGMENT_LENGTH: usize = 255;

/// Validate that `value` can be used as exactly one path segment.
///
/// `kind` names the field in the error message ("owner", "filename", ...).
pub fn validate_path_segment(kind: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} must not be empty", kind)));
    }

    if value.len() > MAX_SEGMENT_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "{} must be at most {} bytes",
            kind, MAX_SEGMENT_LENGTH
        )));
    }

    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        return Err(AppError::InvalidInput(format!(
            "{} must not contain path separators",
            kind
        )));
    }

    if value == "." || value == ".." {
        return Err(AppError::InvalidInput(format!(
            "{} contains invalid path traversal",
            kind
        )));
    }

    Ok(())
}

/// Lowercase an owner name after checking it is a safe path segment.
pub fn normalize_owner(owner: &str) -> AppResult<String> {
    validate_path_segment("owner", owner)?;
    Ok(owner.to_lowercase())
}

/// Content type conventionally served for a video container extension.
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_lowercase().as_str() {
        "mkv" => "video/x-matroska",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        _ => FALLBACK_CONTENT_TYPE,
    }
}
