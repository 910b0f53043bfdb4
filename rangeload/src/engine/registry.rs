//! Engine-owned state store.
//!
//! Holds every record, the admission queue and the concurrency accounting.
//! The engine keeps one `Registry` behind its mutex; nothing outside the
//! engine sees it.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime};

use tokio_util::sync::CancellationToken;

use super::record::{DownloadId, DownloadRecord, DownloadStatus};

/// Engine bookkeeping for one record.
#[derive(Debug)]
pub(crate) struct Entry {
    pub record: DownloadRecord,
    /// Cancelled on cancel, shutdown, or when any transfer of the record fails.
    pub token: CancellationToken,
    /// Transfer units still running for this record.
    pub running: usize,
    /// The record occupies one of the concurrency slots.
    pub holds_slot: bool,
    sample_at: Instant,
    sample_bytes: u64,
}

impl Entry {
    fn new(record: DownloadRecord) -> Self {
        Self {
            record,
            token: CancellationToken::new(),
            running: 0,
            holds_slot: false,
            sample_at: Instant::now(),
            sample_bytes: 0,
        }
    }

    fn reset_speed_sample(&mut self) {
        self.sample_at = Instant::now();
        self.sample_bytes = self.record.downloaded_size;
    }
}

#[derive(Debug)]
pub(crate) struct Registry {
    entries: HashMap<DownloadId, Entry>,
    order: Vec<DownloadId>,
    queue: VecDeque<DownloadId>,
    active: usize,
    next_id: u64,
    /// Cleared by shutdown; no submissions or admissions afterwards.
    pub accepting: bool,
    /// Live engine threads other than the admission loop.
    pub workers: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            queue: VecDeque::new(),
            active: 0,
            next_id: 1,
            accepting: true,
            workers: 0,
        }
    }

    /// Register a record built for a fresh id and enqueue it.
    pub fn insert(&mut self, build: impl FnOnce(DownloadId) -> DownloadRecord) -> &DownloadRecord {
        let id = DownloadId::new(self.next_id);
        self.next_id += 1;

        self.order.push(id);
        self.queue.push_back(id);
        &self.entries.entry(id).or_insert_with(|| Entry::new(build(id))).record
    }

    pub fn entry(&self, id: DownloadId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn entry_mut(&mut self, id: DownloadId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    pub fn record(&self, id: DownloadId) -> Option<&DownloadRecord> {
        self.entries.get(&id).map(|e| &e.record)
    }

    pub fn status(&self, id: DownloadId) -> Option<DownloadStatus> {
        self.record(id).map(|r| r.status)
    }

    /// Snapshots in submission order.
    pub fn snapshots(&self) -> Vec<DownloadRecord> {
        self.order
            .iter()
            .filter_map(|id| self.record(*id).cloned())
            .collect()
    }

    pub fn ids(&self) -> Vec<DownloadId> {
        self.order.clone()
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Pop the next queued id if a slot is free, and give it the slot.
    pub fn admit_next(&mut self, ceiling: usize) -> Option<DownloadId> {
        if !self.accepting || self.active >= ceiling {
            return None;
        }

        while let Some(id) = self.queue.pop_front() {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.record.status != DownloadStatus::Queued {
                continue;
            }
            entry.holds_slot = true;
            self.active += 1;
            return Some(id);
        }
        None
    }

    /// Apply a status change if it is legal.
    ///
    /// Terminal transitions release the record's slot and zero its speed.
    /// Returns `false` (and changes nothing) for illegal transitions or
    /// unknown ids.
    pub fn transition(&mut self, id: DownloadId, next: DownloadStatus) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        let current = entry.record.status;
        if !current.can_transition_to(next) {
            return false;
        }

        entry.record.status = next;
        match next {
            DownloadStatus::Downloading => {
                if current == DownloadStatus::Queued {
                    entry.record.start_time = Some(SystemTime::now());
                }
                entry.reset_speed_sample();
            }
            DownloadStatus::Paused => entry.record.speed = 0.0,
            _ => {}
        }

        if next.is_terminal() {
            entry.record.speed = 0.0;
            if entry.holds_slot {
                entry.holds_slot = false;
                self.active -= 1;
            }
            if current == DownloadStatus::Queued {
                self.queue.retain(|queued| *queued != id);
            }
        }
        true
    }

    /// Move to `Error` with `message`. Returns `false` if already terminal.
    pub fn fail(&mut self, id: DownloadId, message: String) -> bool {
        if !self.transition(id, DownloadStatus::Error) {
            return false;
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.record.error_message = Some(message);
            entry.token.cancel();
        }
        true
    }

    /// Account for bytes written by a transfer unit.
    ///
    /// Bytes count while the record is downloading or paused, since a pause
    /// can land after a unit wrote an increment but before it reported it.
    /// Ignored for queued and terminal records. Speed is recomputed once at
    /// least `sample_interval` has passed since the previous sample, and only
    /// while downloading.
    pub fn add_progress(
        &mut self,
        id: DownloadId,
        segment: Option<usize>,
        bytes: u64,
        sample_interval: Duration,
    ) -> Option<&DownloadRecord> {
        let entry = self.entries.get_mut(&id)?;
        match entry.record.status {
            DownloadStatus::Downloading => {}
            DownloadStatus::Paused => {
                entry.record.add_bytes(segment, bytes);
                return Some(&entry.record);
            }
            _ => return None,
        }

        entry.record.add_bytes(segment, bytes);

        let elapsed = entry.sample_at.elapsed();
        if elapsed >= sample_interval && !elapsed.is_zero() {
            let delta = entry.record.downloaded_size - entry.sample_bytes;
            entry.record.speed = delta as f64 / elapsed.as_secs_f64();
            entry.sample_at = Instant::now();
            entry.sample_bytes = entry.record.downloaded_size;
        }

        Some(&entry.record)
    }
}
