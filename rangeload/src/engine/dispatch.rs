//! Admission, promotion and transfer coordination.
//!
//! ```text
//! admission loop ──► promote (probe thread) ──► transfer unit × N
//!        ▲                                            │
//!        └──────── slot released ◄── finish ◄─────────┘
//!                                     │ last unit
//!                                     ▼
//!                          complete / merge / cleanup
//! ```
//!
//! All state lives in one [`Registry`] behind `Shared::state`. Every status
//! change and every event publication happens with that lock held, and
//! `Shared::changed` is notified after each change so the admission loop,
//! paused transfers and waiters re-check their conditions.

use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::events::{EventBus, EventKind};
use super::http::HttpClient;
use super::merge::{merge_segments, remove_segment_files};
use super::record::{DownloadId, DownloadStatus, Segment};
use super::registry::Registry;
use super::segment::{self, SegmentPlan};
use super::transfer::{self, discard, Gate, TransferControl, TransferJob, TransferOutcome};
use crate::config::EngineConfig;
use crate::error::EngineResult;

pub(crate) struct Shared {
    pub config: EngineConfig,
    pub http: HttpClient,
    pub state: Mutex<Registry>,
    pub changed: Condvar,
    pub events: EventBus,
}

impl Shared {
    pub fn new(config: EngineConfig, http: HttpClient) -> Self {
        Self {
            config,
            http,
            state: Mutex::new(Registry::new()),
            changed: Condvar::new(),
            events: EventBus::new(),
        }
    }

    /// Publish `kind` for `id` from inside the state lock.
    pub fn publish(&self, state: &Registry, kind: EventKind, id: DownloadId) {
        if let Some(record) = state.record(id) {
            self.events.publish(kind, record);
        }
    }

    /// Move `id` to `Error`, cancel its siblings and publish. `false` if already terminal.
    pub fn fail_record(&self, state: &mut Registry, id: DownloadId, message: String) -> bool {
        if !state.fail(id, message.clone()) {
            return false;
        }
        error!(download_id = %id, error = %message, "Download failed");
        self.publish(state, EventKind::Error, id);
        self.changed.notify_all();
        true
    }

    fn worker_exited(&self) {
        let mut state = self.state.lock();
        state.workers -= 1;
        self.changed.notify_all();
    }
}

/// Promote queued records while slots are free; sleeps on the condvar otherwise.
pub(crate) fn admission_loop(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    while state.accepting {
        match state.admit_next(shared.config.max_concurrent_downloads) {
            Some(id) => start_promotion(&shared, &mut state, id),
            None => shared.changed.wait(&mut state),
        }
    }
    debug!("Admission loop stopped");
}

fn start_promotion(shared: &Arc<Shared>, state: &mut Registry, id: DownloadId) {
    let Some(record) = state.record(id) else {
        return;
    };
    let url = record.url.clone();
    let referrer = record.referrer.clone();
    debug!(download_id = %id, url = %url, active = state.active_count(), "Admitting download");

    let worker = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("rangeload-probe-{}", id.as_u64()))
        .spawn(move || {
            promote(&worker, id, &url, referrer.as_deref());
            worker.worker_exited();
        });

    match spawned {
        Ok(_) => state.workers += 1,
        Err(e) => {
            shared.fail_record(state, id, format!("cannot start worker thread: {}", e));
        }
    }
}

/// Probe the resource, plan segments and start the transfer units.
fn promote(shared: &Arc<Shared>, id: DownloadId, url: &str, referrer: Option<&str>) {
    let probe = shared.http.probe(url, referrer);

    let mut state = shared.state.lock();
    if state.status(id) != Some(DownloadStatus::Queued) {
        debug!(download_id = %id, "Download left the queue during probe");
        return;
    }

    let info = match probe {
        Ok(info) => info,
        Err(e) => {
            shared.fail_record(&mut state, id, e.to_string());
            return;
        }
    };

    let config = &shared.config;
    let plan = segment::plan(
        info.total_size,
        info.accepts_ranges,
        config.max_threads_per_download,
        config.chunk_size,
    );

    let Some(entry) = state.entry_mut(id) else {
        return;
    };
    let record = &mut entry.record;
    record.total_size = info.total_size;

    let jobs: Vec<TransferJob> = match &plan {
        SegmentPlan::Single => vec![TransferJob {
            download_id: id,
            url: record.url.clone(),
            referrer: record.referrer.clone(),
            range: None,
            segment: None,
            path: record.destination(),
            expected_len: info.total_size,
            buffer_size: config.buffer_size,
        }],
        SegmentPlan::Ranged(ranges) => {
            record.segments = segment::build_segments(&record.save_dir, &record.filename, ranges);
            record
                .segments
                .iter()
                .map(|seg| TransferJob {
                    download_id: id,
                    url: record.url.clone(),
                    referrer: record.referrer.clone(),
                    range: Some(seg.range),
                    segment: Some(seg.index),
                    path: seg.path.clone(),
                    expected_len: seg.range.len(),
                    buffer_size: config.buffer_size,
                })
                .collect()
        }
    };

    state.transition(id, DownloadStatus::Downloading);
    info!(
        download_id = %id,
        url = %url,
        total_size = info.total_size,
        accepts_ranges = info.accepts_ranges,
        segments = plan.transfer_count(),
        "Download started"
    );
    shared.publish(&state, EventKind::Started, id);
    shared.changed.notify_all();

    for job in jobs {
        if !spawn_transfer(shared, &mut state, job) {
            break;
        }
    }

    // Units cannot finish while this lock is held, so `running` only
    // reaches zero here when no unit was started at all.
    if state.entry(id).map(|e| e.running) == Some(0) {
        drop(state);
        cleanup_outputs(shared, id);
    }
}

fn spawn_transfer(shared: &Arc<Shared>, state: &mut Registry, job: TransferJob) -> bool {
    let id = job.download_id;
    let Some(entry) = state.entry_mut(id) else {
        return false;
    };
    let token = entry.token.clone();

    let name = match job.segment {
        Some(index) => format!("rangeload-{}-seg{}", id.as_u64(), index),
        None => format!("rangeload-{}", id.as_u64()),
    };
    let worker = Arc::clone(shared);
    let spawned = thread::Builder::new().name(name).spawn(move || {
        run_unit(&worker, &job, &token);
        worker.worker_exited();
    });

    match spawned {
        Ok(_) => {
            entry.running += 1;
            state.workers += 1;
            true
        }
        Err(e) => {
            shared.fail_record(state, id, format!("cannot start transfer thread: {}", e));
            false
        }
    }
}

/// Checkpoint and progress hooks for one transfer unit.
struct RecordControl<'a> {
    shared: &'a Shared,
    id: DownloadId,
    segment: Option<usize>,
    token: &'a CancellationToken,
}

impl TransferControl for RecordControl<'_> {
    fn checkpoint(&self) -> Gate {
        if self.token.is_cancelled() {
            return Gate::Stop;
        }

        let mut state = self.shared.state.lock();
        loop {
            match state.status(self.id) {
                Some(DownloadStatus::Downloading) => return Gate::Proceed,
                Some(DownloadStatus::Paused) if !self.token.is_cancelled() => {
                    self.shared.changed.wait(&mut state);
                }
                _ => return Gate::Stop,
            }
        }
    }

    fn advance(&self, bytes: u64) {
        let mut state = self.shared.state.lock();
        let interval = self.shared.config.speed_sample_interval;
        if let Some(record) = state.add_progress(self.id, self.segment, bytes, interval) {
            self.shared.events.publish(EventKind::Progress, record);
        }
    }
}

fn run_unit(shared: &Arc<Shared>, job: &TransferJob, token: &CancellationToken) {
    let control = RecordControl {
        shared,
        id: job.download_id,
        segment: job.segment,
        token,
    };
    let result = transfer::run_transfer(&shared.http, job, &control);
    finish_unit(shared, job, result);
}

/// Record a unit's outcome; the last unit of a record finalizes it.
fn finish_unit(shared: &Arc<Shared>, job: &TransferJob, result: EngineResult<TransferOutcome>) {
    let id = job.download_id;
    let finished = matches!(result, Ok(TransferOutcome::Finished(_)));
    let mut state = shared.state.lock();

    match result {
        Ok(TransferOutcome::Finished(bytes)) => {
            debug!(download_id = %id, segment = ?job.segment, bytes, "Transfer finished");
            if let (Some(index), Some(entry)) = (job.segment, state.entry_mut(id)) {
                if let Some(seg) = entry.record.segments.get_mut(index) {
                    seg.complete = true;
                }
            }
        }
        Ok(TransferOutcome::Stopped) => {}
        Err(e) => {
            if !shared.fail_record(&mut state, id, e.to_string()) {
                debug!(download_id = %id, error = %e, "Transfer error after download ended");
            }
        }
    }

    let Some(entry) = state.entry_mut(id) else {
        return;
    };
    entry.running -= 1;
    if entry.running > 0 {
        return;
    }

    // A pause can land between this unit's last checkpoint and here.
    while state.status(id) == Some(DownloadStatus::Paused) {
        shared.changed.wait(&mut state);
    }

    match state.status(id) {
        Some(DownloadStatus::Downloading) => finalize(shared, state, id),
        Some(DownloadStatus::Error) | Some(DownloadStatus::Canceled) => {
            drop(state);
            // A finished single stream wrote the destination itself.
            if finished && job.segment.is_none() {
                discard(&job.path);
            }
            cleanup_outputs(shared, id);
        }
        _ => {}
    }
}

/// Complete a single-stream record or merge a segmented one.
fn finalize(shared: &Arc<Shared>, mut state: MutexGuard<'_, Registry>, id: DownloadId) {
    let Some(record) = state.record(id) else {
        return;
    };

    if !record.is_segmented() {
        complete(shared, &mut state, id);
        return;
    }

    let incomplete = record.segments.iter().find(|s| !s.complete).map(|s| s.index);
    let segments = record.segments.clone();
    let destination = record.destination();

    if let Some(index) = incomplete {
        let message = format!("segment {} did not complete", index);
        shared.fail_record(&mut state, id, message);
        drop(state);
        remove_segment_files(&segments);
        return;
    }
    drop(state);

    debug!(download_id = %id, segments = segments.len(), "Merging segments");
    let merged = merge_segments(&segments, &destination);

    let mut state = shared.state.lock();
    match merged {
        Ok(_) if state.status(id) == Some(DownloadStatus::Downloading) => {
            complete(shared, &mut state, id);
        }
        Ok(_) => {
            drop(state);
            discard(&destination);
        }
        Err(e) => {
            shared.fail_record(&mut state, id, e.to_string());
        }
    }
}

fn complete(shared: &Shared, state: &mut Registry, id: DownloadId) {
    let Some(entry) = state.entry_mut(id) else {
        return;
    };
    let record = &mut entry.record;
    if record.total_size == 0 {
        record.total_size = record.downloaded_size;
    }
    record.progress = 100.0;

    if state.transition(id, DownloadStatus::Completed) {
        if let Some(record) = state.record(id) {
            info!(
                download_id = %id,
                destination = %record.destination().display(),
                bytes = record.downloaded_size,
                "Download completed"
            );
        }
        shared.publish(state, EventKind::Completed, id);
        shared.changed.notify_all();
    }
}

/// Remove the record's segment files. The destination is never touched here.
fn cleanup_outputs(shared: &Shared, id: DownloadId) {
    let segments = {
        let state = shared.state.lock();
        let Some(record) = state.record(id) else {
            return;
        };
        record.segments.clone()
    };
    remove_segment_files(&segments);
}

/// Cancel `id` if it is not terminal yet. Returns the segment files to remove.
pub(crate) fn cancel_record(
    shared: &Shared,
    state: &mut Registry,
    id: DownloadId,
) -> Option<Vec<Segment>> {
    if !state.transition(id, DownloadStatus::Canceled) {
        return None;
    }
    let entry = state.entry(id)?;
    entry.token.cancel();
    let segments = entry.record.segments.clone();

    info!(download_id = %id, "Download canceled");
    shared.publish(state, EventKind::Canceled, id);
    shared.changed.notify_all();
    Some(segments)
}
