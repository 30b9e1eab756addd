//! Forms-filling process adapter
//!
//! Wraps the external filling engine (a pdftk-compatible CLI) behind the
//! [`FormsEngine`] trait so the pipeline can be driven by a stub in tests.
//! The adapter owns process lifetime: payload over stdin, wall-clock
//! timeout, non-graceful kill on expiry, and failure classification.

use crate::config::EngineConfig;
use crate::error::{Error, FillError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default engine binary name searched on PATH
const DEFAULT_BINARY: &str = "pdftk";

/// Executes one fill-and-flatten invocation of the forms engine.
///
/// Implementations write exactly one output file at `output` on success and
/// must be assumed to leave nothing (or a partial, invalid file) on failure.
#[async_trait]
pub trait FormsEngine: Send + Sync {
    /// Fill the template with the payload and write the flattened result.
    async fn fill(
        &self,
        template: &Path,
        payload: &[u8],
        output: &Path,
    ) -> std::result::Result<(), FillError>;

    /// Human-readable engine name for logging
    fn name(&self) -> &'static str;
}

/// CLI-based engine adapter spawning the external binary per invocation.
///
/// Invocation: `engine <template> fill_form - output <out> flatten` with the
/// document payload on stdin. Feeding stdin instead of a payload temp file
/// avoids a file-existence race and an extra unlink. `flatten` burns the
/// form fields into static page content so the result is print-faithful and
/// non-editable.
#[derive(Debug)]
pub struct CliFillEngine {
    binary_path: PathBuf,
    timeout: Duration,
}

impl CliFillEngine {
    /// Create an adapter with an explicit binary path
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Attempt to find the engine binary in PATH
    pub fn from_path(timeout: Duration) -> Option<Self> {
        which::which(DEFAULT_BINARY)
            .ok()
            .map(|path| Self::new(path, timeout))
    }

    /// Build the adapter from configuration: explicit path first, then PATH
    /// discovery when `search_path` is enabled.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        if let Some(path) = &config.engine_path {
            return Ok(Self::new(path.clone(), config.fill_timeout));
        }
        if config.search_path {
            if let Some(engine) = Self::from_path(config.fill_timeout) {
                return Ok(engine);
            }
        }
        Err(Error::Config {
            message: format!("forms engine binary '{DEFAULT_BINARY}' not found"),
            key: Some("engine_path".to_string()),
        })
    }

    /// The resolved engine binary path
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl FormsEngine for CliFillEngine {
    async fn fill(
        &self,
        template: &Path,
        payload: &[u8],
        output: &Path,
    ) -> std::result::Result<(), FillError> {
        debug!(
            binary = ?self.binary_path,
            ?template,
            ?output,
            payload_len = payload.len(),
            "spawning forms engine"
        );

        let mut child = Command::new(&self.binary_path)
            .arg(template)
            .arg("fill_form")
            .arg("-") // payload arrives on stdin
            .arg("output")
            .arg(output)
            .arg("flatten")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FillError::SpawnFailed {
                binary: self.binary_path.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A write failure here means the engine already died; the exit
            // status below carries the diagnostic.
            if let Err(e) = stdin.write_all(payload).await {
                debug!(error = %e, "failed to write payload to engine stdin");
            }
            drop(stdin);
        }

        // The wait future owns the child; dropping it on timeout triggers
        // kill_on_drop, so an expired invocation cannot linger as a zombie.
        let waited = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match waited {
            Ok(Ok(result)) if result.status.success() => Ok(()),
            Ok(Ok(result)) => {
                let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
                warn!(
                    binary = ?self.binary_path,
                    code = ?result.status.code(),
                    stderr = %stderr,
                    "forms engine exited non-zero"
                );
                Err(FillError::ExitFailed {
                    code: result.status.code(),
                    stderr,
                })
            }
            Ok(Err(e)) => Err(FillError::ExitFailed {
                code: None,
                stderr: format!("failed to collect engine output: {e}"),
            }),
            Err(_) => {
                warn!(
                    binary = ?self.binary_path,
                    timeout_secs = self.timeout.as_secs(),
                    "forms engine timed out, child killed"
                );
                Err(FillError::TimedOut {
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "cli-pdftk"
    }
}
