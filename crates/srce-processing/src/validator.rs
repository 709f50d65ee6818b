//! Validation gate
//!
//! Decides whether a stored file is decodable media before any record exists
//! for it.

use srce_core::constants::INVALID_DATA_MARKER;
use srce_core::{AppError, AppResult};
use std::path::Path;
use std::sync::Arc;

use crate::video::MediaToolkit;

/// True unless the probe diagnostics carry the invalid-data marker.
///
/// Warnings and any other output are ignored.
pub fn classify_probe_output(diagnostics: &str) -> bool {
    !diagnostics.contains(INVALID_DATA_MARKER)
}

#[derive(Clone)]
pub struct MediaValidator {
    toolkit: Arc<dyn MediaToolkit>,
}

impl MediaValidator {
    pub fn new(toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { toolkit }
    }

    /// Probe `path` and classify the result.
    ///
    /// `Ok(false)` means the content was rejected. Failing to run the probe at all
    /// is an error, never a rejection.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn is_valid_media(&self, path: &Path) -> AppResult<bool> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(AppError::NotFound(format!(
                    "Media file {} does not exist",
                    path.display()
                )))
            }
            Err(e) => return Err(AppError::io(path, e)),
        }

        let report = self.toolkit.probe(path).await?;
        let valid = classify_probe_output(&report.diagnostics);

        if valid {
            tracing::debug!("Media passed validation");
        } else {
            tracing::info!(exit_code = ?report.exit_code, "Media rejected by probe");
        }

        Ok(valid)
    }
}
