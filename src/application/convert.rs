//! HTML-to-PDF conversion by delegating to an external converter binary.
//!
//! Each conversion gets a private scratch directory holding the intermediate
//! input file and the produced output file. The directory is removed when the
//! conversion finishes, on every exit path, so concurrent requests never share
//! filesystem state and no artifact outlives its request.

use std::{
    io::ErrorKind,
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use bytes::Bytes;
use metrics::{counter, histogram};
use tempfile::TempDir;
use thiserror::Error;
use tokio::{fs, process::Command, time::timeout};
use tracing::{info, warn};

use crate::config::ConverterSettings;

const INPUT_FILENAME: &str = "input.html";
const OUTPUT_FILENAME: &str = "output.pdf";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to prepare scratch directory: {0}")]
    ScratchInit(std::io::Error),
    #[error("io failure during conversion: {0}")]
    Io(#[from] std::io::Error),
    #[error("converter exited with status {exit_code:?}: {stderr}")]
    Converter {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("converter binary unavailable: {0}")]
    NotFound(std::io::Error),
    #[error("conversion exceeded the {limit_secs}s ceiling")]
    Timeout { limit_secs: u64 },
    #[error("converter reported success but produced no output")]
    MissingOutput,
}

/// Runs the external converter binary against per-request scratch files.
#[derive(Debug, Clone)]
pub struct ConversionService {
    binary_path: PathBuf,
    timeout: Duration,
    scratch_dir: PathBuf,
}

impl ConversionService {
    pub fn new(settings: &ConverterSettings) -> Result<Self, ConvertError> {
        std::fs::create_dir_all(&settings.scratch_dir).map_err(ConvertError::ScratchInit)?;
        Ok(Self {
            binary_path: settings.binary_path.clone(),
            timeout: settings.timeout,
            scratch_dir: settings.scratch_dir.clone(),
        })
    }

    /// Render the provided markup to PDF bytes.
    ///
    /// The content is written verbatim to the intermediate input file; empty
    /// content is handed to the converter unmodified and its behavior on an
    /// empty input is the observable result.
    pub async fn render_pdf(&self, content: &str) -> Result<Bytes, ConvertError> {
        let started_at = Instant::now();
        let scratch = TempDir::with_prefix_in("request-", &self.scratch_dir)?;
        let input_path = scratch.path().join(INPUT_FILENAME);
        let output_path = scratch.path().join(OUTPUT_FILENAME);

        fs::write(&input_path, content.as_bytes()).await?;

        let child = Command::new(&self.binary_path)
            .arg(&input_path)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!(
                    target = "application::convert",
                    op = "convert::render_pdf",
                    result = "error",
                    error_code = "spawn_converter",
                    binary = %self.binary_path.display(),
                    error = %err,
                    "Failed to spawn converter"
                );
                counter!("stampa_conversion_io_error_total").increment(1);
                histogram!("stampa_conversion_ms")
                    .record(started_at.elapsed().as_millis() as f64);
                if err.kind() == ErrorKind::NotFound {
                    ConvertError::NotFound(err)
                } else {
                    ConvertError::Io(err)
                }
            })?;

        // Dropping the wait future on timeout kills the child (kill_on_drop).
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                counter!("stampa_conversion_io_error_total").increment(1);
                histogram!("stampa_conversion_ms")
                    .record(started_at.elapsed().as_millis() as f64);
                return Err(ConvertError::Io(err));
            }
            Err(_) => {
                let limit_secs = self.timeout.as_secs();
                warn!(
                    target = "application::convert",
                    op = "convert::render_pdf",
                    result = "timeout",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    limit_secs,
                    "Converter exceeded the configured ceiling and was killed"
                );
                counter!("stampa_conversion_timeout_total").increment(1);
                histogram!("stampa_conversion_ms")
                    .record(started_at.elapsed().as_millis() as f64);
                return Err(ConvertError::Timeout { limit_secs });
            }
        };

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "application::convert",
                op = "convert::render_pdf",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                error_code = "converter_exit",
                stderr = %stderr,
                "Converter invocation failed"
            );
            counter!("stampa_conversion_converter_error_total").increment(1);
            histogram!("stampa_conversion_ms").record(started_at.elapsed().as_millis() as f64);
            return Err(ConvertError::Converter { exit_code, stderr });
        }

        let pdf = match fs::read(&output_path).await {
            Ok(data) if !data.is_empty() => Bytes::from(data),
            Ok(_) => return Err(ConvertError::MissingOutput),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ConvertError::MissingOutput);
            }
            Err(err) => return Err(ConvertError::Io(err)),
        };

        drop(scratch);

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        info!(
            target = "application::convert",
            op = "convert::render_pdf",
            result = "ok",
            elapsed_ms,
            pdf_bytes = pdf.len(),
            "Rendered PDF via converter"
        );
        counter!("stampa_conversion_success_total").increment(1);
        histogram!("stampa_conversion_ms").record(elapsed_ms as f64);

        Ok(pdf)
    }

    /// Check that the converter binary can be spawned at all.
    pub async fn probe(&self) -> bool {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(self.timeout, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(_)) | Err(_) => false,
        }
    }
}
