//! Fallback controller: ordered encode-and-fill attempts
//!
//! Walks an ordered list of document encoders, attempting one fill per
//! format and moving to the next on failure. The policy is bounded and
//! deterministic: with the default encoder list that is exactly one primary
//! attempt and one fallback attempt, never a generic retry loop, because
//! repeating the same malformed payload cannot succeed.

use crate::encoder::DocumentEncoder;
use crate::engine::FormsEngine;
use crate::error::FillError;
use crate::types::{DocFormat, FieldAssignment};
use std::path::Path;
use tracing::{info, warn};

/// Attempt each encoder in order until one fill succeeds.
///
/// On failure the partial output file (if any) is discarded before the next
/// attempt, since the engine may leave an invalid file behind. When every
/// attempt fails, the *last* attempt's error is propagated; the most recent
/// failure is the most diagnostically relevant.
pub async fn fill_with_fallback(
    engine: &dyn FormsEngine,
    encoders: &[Box<dyn DocumentEncoder>],
    segment: &str,
    template: &Path,
    assignments: &[FieldAssignment],
    output: &Path,
) -> std::result::Result<DocFormat, FillError> {
    let mut last_error: Option<FillError> = None;

    for (attempt, encoder) in encoders.iter().enumerate() {
        let format = encoder.format();
        let payload = encoder.encode(assignments);

        match engine.fill(template, &payload, output).await {
            Ok(()) => {
                if attempt > 0 {
                    info!(
                        segment = %segment,
                        format = %format,
                        attempt = attempt + 1,
                        "fallback format succeeded"
                    );
                }
                return Ok(format);
            }
            Err(e) => {
                warn!(
                    segment = %segment,
                    format = %format,
                    attempt = attempt + 1,
                    total = encoders.len(),
                    error = %e,
                    "fill attempt failed"
                );
                // The engine may have left a partial, invalid output file
                tokio::fs::remove_file(output).await.ok();
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(FillError::ExitFailed {
        code: None,
        stderr: "no document encoders configured".to_string(),
    }))
}
