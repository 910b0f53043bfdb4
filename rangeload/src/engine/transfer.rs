//! Transfer units: one streaming GET into one file.
//!
//! A unit reads the response body in bounded increments. Before each
//! increment is written it passes a checkpoint, which blocks while the
//! record is paused and reports when the record was canceled. The unit never
//! touches record status itself; it reports an outcome and the engine
//! decides what that means for the record.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::http::HttpClient;
use super::record::{ByteRange, DownloadId};
use crate::error::{EngineError, EngineResult};

/// Whether a transfer may continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Stop,
}

/// Link between a running transfer and the record it serves.
pub trait TransferControl {
    /// Block while paused. Returns [`Gate::Stop`] once the record is canceled,
    /// failed elsewhere, or the engine is shutting down.
    fn checkpoint(&self) -> Gate;

    /// Account for `bytes` that were just written.
    fn advance(&self, bytes: u64);
}

/// Everything one unit needs to run.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub download_id: DownloadId,
    pub url: String,
    pub referrer: Option<String>,
    /// `None` sends no `Range` header.
    pub range: Option<ByteRange>,
    /// Index into the segment table, `None` for single-stream transfers.
    pub segment: Option<usize>,
    pub path: PathBuf,
    /// Expected body length, 0 when unknown.
    pub expected_len: u64,
    pub buffer_size: usize,
}

/// How a unit ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Stream exhausted; the file holds this many bytes.
    Finished(u64),
    /// Stopped at a checkpoint; partial output was discarded.
    Stopped,
}

/// Run a transfer to completion, cancellation, or failure.
///
/// On failure or cancellation the partially written file is removed. A file
/// the unit never created (the GET failed, or it stopped before the first
/// write) is left untouched.
pub fn run_transfer(
    http: &HttpClient,
    job: &TransferJob,
    control: &dyn TransferControl,
) -> EngineResult<TransferOutcome> {
    let mut created = false;
    let result = stream_to_file(http, job, control, &mut created);
    if created && !matches!(result, Ok(TransferOutcome::Finished(_))) {
        discard(&job.path);
    }
    result
}

fn stream_to_file(
    http: &HttpClient,
    job: &TransferJob,
    control: &dyn TransferControl,
    created: &mut bool,
) -> EngineResult<TransferOutcome> {
    if control.checkpoint() == Gate::Stop {
        return Ok(TransferOutcome::Stopped);
    }

    let mut response = http.get(&job.url, job.referrer.as_deref(), job.range)?;

    let file = File::create(&job.path).map_err(|e| EngineError::WriteFailed {
        path: job.path.clone(),
        source: e,
    })?;
    *created = true;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0u8; job.buffer_size.max(1)];
    let mut written: u64 = 0;

    loop {
        let bytes_read = match response.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(job, http, e)),
        };

        if control.checkpoint() == Gate::Stop {
            debug!(download_id = %job.download_id, segment = ?job.segment, "Transfer stopped");
            return Ok(TransferOutcome::Stopped);
        }

        if bytes_read == 0 {
            break;
        }

        let bytes = bytes_read as u64;
        if job.expected_len > 0 && written + bytes > job.expected_len {
            return Err(EngineError::Transfer {
                url: job.url.clone(),
                reason: format!(
                    "received more than the expected {} bytes",
                    job.expected_len
                ),
            });
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| EngineError::WriteFailed {
                path: job.path.clone(),
                source: e,
            })?;

        written += bytes;
        control.advance(bytes);
    }

    writer.flush().map_err(|e| EngineError::WriteFailed {
        path: job.path.clone(),
        source: e,
    })?;

    if job.expected_len > 0 && written < job.expected_len {
        return Err(EngineError::Transfer {
            url: job.url.clone(),
            reason: format!(
                "connection closed after {} of {} bytes",
                written, job.expected_len
            ),
        });
    }

    Ok(TransferOutcome::Finished(written))
}

fn read_error(job: &TransferJob, http: &HttpClient, err: io::Error) -> EngineError {
    if err.kind() == io::ErrorKind::TimedOut {
        EngineError::Timeout {
            url: job.url.clone(),
            timeout_secs: http.timeout_secs(),
        }
    } else {
        EngineError::Transfer {
            url: job.url.clone(),
            reason: format!("read error: {}", err),
        }
    }
}

/// Remove a file, ignoring "not found".
pub(crate) fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial file"),
    }
}
