//! Concurrent, resumable HTTP download engine.
//!
//! The engine accepts download requests, queues them, and runs at most
//! `max_concurrent_downloads` of them at a time. Each admitted record is
//! probed for its size and range support, then fetched either as one stream
//! or as several byte ranges in parallel that are merged on completion.
//!
//! # Architecture
//!
//! ```text
//! Engine (public API)
//!    │
//!    ├── Registry          records, FIFO queue, slot accounting
//!    ├── admission loop    promotes queued records (dispatch)
//!    │      └── promote    probe + Segmenter (segment)
//!    │             └── transfer units × N (transfer)
//!    │                    └── Merger on last unit (merge)
//!    ├── HttpClient        HEAD probe and streaming GET (http)
//!    └── EventBus          lifecycle events to subscribers (events)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rangeload::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default().with_max_threads_per_download(4))?;
//! let mut events = engine.subscribe();
//!
//! let id = engine.submit("https://example.com/big.iso", "/tmp/downloads", None, None)?;
//! let record = engine.wait(id, Duration::from_secs(600));
//! engine.shutdown();
//! ```

mod dispatch;
mod events;
mod http;
mod merge;
mod record;
mod registry;
mod segment;
mod transfer;

pub use events::{DownloadEvent, EventKind, EventReceiver};
pub use http::{HttpClient, ProbeInfo};
pub use merge::merge_segments;
pub use record::{
    filename_from_url, ByteRange, DownloadId, DownloadRecord, DownloadStatus, Segment,
    DEFAULT_FILENAME,
};
pub use segment::{plan as plan_segments, segment_count, segment_path, split_ranges, SegmentPlan};

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use dispatch::{admission_loop, cancel_record, Shared};
use merge::remove_segment_files;

/// Download engine.
///
/// Owns every record it was given. All methods take `&self`; the engine can
/// be shared across threads behind an `Arc`. Dropping the engine shuts it
/// down.
pub struct Engine {
    shared: Arc<Shared>,
    admission: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Create an engine and start its admission loop.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let config = config.normalized();
        let http = HttpClient::new(&config)?;
        let shared = Arc::new(Shared::new(config, http));

        let loop_shared = Arc::clone(&shared);
        let admission = thread::Builder::new()
            .name("rangeload-admission".to_string())
            .spawn(move || admission_loop(loop_shared))
            .map_err(|e| {
                EngineError::InvalidConfig(format!("cannot start admission loop: {}", e))
            })?;

        let config = &shared.config;
        info!(
            max_concurrent = config.max_concurrent_downloads,
            max_threads = config.max_threads_per_download,
            chunk_size = config.chunk_size,
            "Download engine started"
        );

        Ok(Self {
            shared,
            admission: Mutex::new(Some(admission)),
        })
    }

    /// Create an engine with [`EngineConfig::default`].
    pub fn with_defaults() -> EngineResult<Self> {
        Self::new(EngineConfig::default())
    }

    /// The configuration this engine runs with, after normalization.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Subscribe to lifecycle events published from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Queue a download and return its id.
    ///
    /// The URL is not validated here; an unusable URL fails the record at
    /// probe time. `destination_dir` is created if missing. `filename`
    /// defaults to the last path component of the URL.
    pub fn submit(
        &self,
        url: impl Into<String>,
        destination_dir: impl AsRef<Path>,
        filename: Option<String>,
        referrer: Option<String>,
    ) -> EngineResult<DownloadId> {
        let url = url.into();
        let save_dir = destination_dir.as_ref();

        if !self.shared.state.lock().accepting {
            return Err(EngineError::ShuttingDown);
        }

        fs::create_dir_all(save_dir).map_err(|e| EngineError::CreateDir {
            path: save_dir.to_path_buf(),
            source: e,
        })?;

        let mut state = self.shared.state.lock();
        if !state.accepting {
            return Err(EngineError::ShuttingDown);
        }

        let record = state.insert(|id| DownloadRecord::new(id, url, save_dir, filename, referrer));
        let id = record.id;
        info!(
            download_id = %id,
            url = %record.url,
            destination = %record.destination().display(),
            "Download queued"
        );
        self.shared.events.publish(EventKind::Added, record);
        self.shared.changed.notify_all();

        Ok(id)
    }

    /// Pause a downloading record. `false` for any other status or unknown id.
    pub fn pause(&self, id: DownloadId) -> bool {
        let mut state = self.shared.state.lock();

        // No units running means the record is merging.
        let pausable = state
            .entry(id)
            .is_some_and(|e| e.record.status == DownloadStatus::Downloading && e.running > 0);
        if !pausable || !state.transition(id, DownloadStatus::Paused) {
            return false;
        }

        info!(download_id = %id, "Download paused");
        self.shared.publish(&state, EventKind::Paused, id);
        self.shared.changed.notify_all();
        true
    }

    /// Resume a paused record. `false` for any other status or unknown id.
    pub fn resume(&self, id: DownloadId) -> bool {
        let mut state = self.shared.state.lock();
        if state.status(id) != Some(DownloadStatus::Paused)
            || !state.transition(id, DownloadStatus::Downloading)
        {
            return false;
        }

        info!(download_id = %id, "Download resumed");
        self.shared.publish(&state, EventKind::Resumed, id);
        self.shared.changed.notify_all();
        true
    }

    /// Cancel a queued, downloading or paused record and delete its segment
    /// files. `false` for terminal records or unknown ids.
    pub fn cancel(&self, id: DownloadId) -> bool {
        let segments = {
            let mut state = self.shared.state.lock();
            cancel_record(&self.shared, &mut state, id)
        };

        match segments {
            Some(segments) => {
                remove_segment_files(&segments);
                true
            }
            None => false,
        }
    }

    /// Snapshot of one record.
    pub fn get(&self, id: DownloadId) -> Option<DownloadRecord> {
        self.shared.state.lock().record(id).cloned()
    }

    /// Snapshots of every record in submission order.
    pub fn list(&self) -> Vec<DownloadRecord> {
        self.shared.state.lock().snapshots()
    }

    /// Records holding a concurrency slot (probing, downloading or paused).
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active_count()
    }

    /// Records waiting for a slot.
    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queued_count()
    }

    /// Block until `id` is terminal or `timeout` elapses.
    ///
    /// Returns the latest snapshot, or `None` for an unknown id.
    pub fn wait(&self, id: DownloadId, timeout: Duration) -> Option<DownloadRecord> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();

        loop {
            let record = state.record(id)?;
            if record.is_terminal() {
                return Some(record.clone());
            }
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return state.record(id).cloned();
            }
        }
    }

    /// Stop admission, cancel every non-terminal record and wait up to
    /// `shutdown_timeout` for transfers to exit.
    ///
    /// Idempotent. Subscribers see the end of their event stream afterwards.
    pub fn shutdown(&self) {
        let Some(admission) = self.admission.lock().take() else {
            return;
        };
        info!("Shutting down download engine");

        let canceled: Vec<Segment> = {
            let mut state = self.shared.state.lock();
            state.accepting = false;
            let ids = state.ids();
            let canceled = ids
                .into_iter()
                .filter_map(|id| cancel_record(&self.shared, &mut state, id))
                .flatten()
                .collect();
            self.shared.changed.notify_all();
            canceled
        };
        remove_segment_files(&canceled);

        if admission.join().is_err() {
            warn!("Admission loop panicked");
        }

        let deadline = Instant::now() + self.shared.config.shutdown_timeout;
        {
            let mut state = self.shared.state.lock();
            while state.workers > 0 {
                if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                    warn!(
                        workers = state.workers,
                        "Shutdown timed out with transfers still running"
                    );
                    break;
                }
            }
        }

        self.shared.events.close();
        debug!("Download engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Engine")
            .field("active", &state.active_count())
            .field("queued", &state.queued_count())
            .field("accepting", &state.accepting)
            .finish()
    }
}
