//! Download records and their status state machine.
//!
//! A [`DownloadRecord`] is the snapshot consumers see: target, destination,
//! status, byte counters and the segment table. Only the engine mutates
//! records; everything handed out is a clone.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Filename used when the URL path does not yield one.
pub const DEFAULT_FILENAME: &str = "download";

/// Unique identifier of a download within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DownloadId(u64);

impl DownloadId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dl-{}", self.0)
    }
}

/// Lifecycle status of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Error,
    Canceled,
}

impl DownloadStatus {
    /// No further status or counter changes happen once terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Canceled)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;

        matches!(
            (self, next),
            (Queued, Downloading)
                | (Queued, Error)
                | (Queued, Canceled)
                | (Downloading, Paused)
                | (Downloading, Completed)
                | (Downloading, Error)
                | (Downloading, Canceled)
                | (Paused, Downloading)
                | (Paused, Error)
                | (Paused, Canceled)
        )
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "empty byte range {}-{}", start, end);
        Self { start, end }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Range` header value.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// One entry of a record's segment table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Position in the segment table.
    pub index: usize,
    /// Bytes this segment covers.
    pub range: ByteRange,
    /// Bytes written so far.
    pub downloaded: u64,
    /// Temporary output file.
    pub path: PathBuf,
    /// Set once the stream for this segment ended cleanly.
    pub complete: bool,
}

impl Segment {
    pub fn new(index: usize, range: ByteRange, path: PathBuf) -> Self {
        Self {
            index,
            range,
            downloaded: 0,
            path,
            complete: false,
        }
    }

    /// Bytes still expected.
    pub fn remaining(&self) -> u64 {
        self.range.len().saturating_sub(self.downloaded)
    }
}

/// Tracked state of one download request.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub id: DownloadId,
    pub url: String,
    pub referrer: Option<String>,
    pub save_dir: PathBuf,
    pub filename: String,
    pub status: DownloadStatus,
    /// Total size in bytes, 0 while unknown.
    pub total_size: u64,
    pub downloaded_size: u64,
    /// Percentage in `0.0..=100.0`; stays 0 while the total is unknown.
    pub progress: f64,
    /// Bytes per second, sampled at most once per sampling interval.
    pub speed: f64,
    /// Empty for single-stream transfers.
    pub segments: Vec<Segment>,
    /// Set only in [`DownloadStatus::Error`].
    pub error_message: Option<String>,
    /// When the record entered [`DownloadStatus::Downloading`].
    pub start_time: Option<SystemTime>,
}

impl DownloadRecord {
    /// Create a queued record. The filename is derived from the URL when not supplied.
    pub fn new(
        id: DownloadId,
        url: impl Into<String>,
        save_dir: impl Into<PathBuf>,
        filename: Option<String>,
        referrer: Option<String>,
    ) -> Self {
        let url = url.into();
        let filename = filename
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| filename_from_url(&url));

        Self {
            id,
            url,
            referrer,
            save_dir: save_dir.into(),
            filename,
            status: DownloadStatus::Queued,
            total_size: 0,
            downloaded_size: 0,
            progress: 0.0,
            speed: 0.0,
            segments: Vec::new(),
            error_message: None,
            start_time: None,
        }
    }

    /// Final output path.
    pub fn destination(&self) -> PathBuf {
        self.save_dir.join(&self.filename)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_segmented(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Percentage of the total downloaded, 0 while the total is unknown.
    pub fn progress_percent(&self) -> f64 {
        progress_of(self.downloaded_size, self.total_size)
    }

    /// Estimated time to completion at the current speed.
    pub fn eta(&self) -> Option<Duration> {
        if self.speed <= 0.0 || self.total_size == 0 || self.downloaded_size >= self.total_size {
            return None;
        }
        let remaining = (self.total_size - self.downloaded_size) as f64;
        Some(Duration::from_secs_f64(remaining / self.speed))
    }

    /// Path of every segment temp file.
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments.iter().map(|s| s.path.clone()).collect()
    }

    /// Add freshly written bytes; `segment` is `None` for single-stream transfers.
    pub(crate) fn add_bytes(&mut self, segment: Option<usize>, bytes: u64) {
        match segment.and_then(|i| self.segments.get_mut(i)) {
            Some(seg) => {
                seg.downloaded += bytes;
                self.downloaded_size = self.segments.iter().map(|s| s.downloaded).sum();
            }
            None => self.downloaded_size += bytes,
        }
        self.progress = self.progress_percent();
    }
}

pub(crate) fn progress_of(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (downloaded as f64 / total as f64) * 100.0
    }
}

/// Last path component of a URL, or [`DEFAULT_FILENAME`].
pub fn filename_from_url(url: &str) -> String {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> DownloadRecord {
        DownloadRecord::new(DownloadId::new(1), url, "/tmp/dl", None, None)
    }

    #[test]
    fn test_filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://example.com/files/archive.tar.gz"),
            "archive.tar.gz"
        );
        assert_eq!(
            filename_from_url("https://example.com/get/file.iso?token=abc#frag"),
            "file.iso"
        );
    }

    #[test]
    fn test_filename_from_url_falls_back() {
        assert_eq!(filename_from_url("https://example.com/"), DEFAULT_FILENAME);
        assert_eq!(filename_from_url("https://example.com"), DEFAULT_FILENAME);
        assert_eq!(filename_from_url("https://example.com/dir/"), DEFAULT_FILENAME);
        assert_eq!(filename_from_url("not a url/"), DEFAULT_FILENAME);
    }

    #[test]
    fn test_supplied_filename_wins() {
        let rec = DownloadRecord::new(
            DownloadId::new(3),
            "https://example.com/a.bin",
            "/tmp/dl",
            Some("renamed.bin".to_string()),
            None,
        );
        assert_eq!(rec.filename, "renamed.bin");
        assert_eq!(rec.destination(), PathBuf::from("/tmp/dl/renamed.bin"));
    }

    #[test]
    fn test_new_record_is_queued() {
        let rec = record("https://example.com/a.bin");
        assert_eq!(rec.status, DownloadStatus::Queued);
        assert_eq!(rec.total_size, 0);
        assert!(rec.segments.is_empty());
        assert!(rec.error_message.is_none());
        assert!(!rec.is_terminal());
    }

    #[test]
    fn test_status_transitions() {
        use DownloadStatus::*;

        assert!(Queued.can_transition_to(Downloading));
        assert!(Queued.can_transition_to(Canceled));
        assert!(Downloading.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Downloading));
        assert!(Paused.can_transition_to(Canceled));
        assert!(!Queued.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Completed));

        for terminal in [Completed, Error, Canceled] {
            assert!(terminal.is_terminal());
            for next in [Queued, Downloading, Paused, Completed, Error, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_progress_single_stream() {
        let mut rec = record("https://example.com/a.bin");
        assert_eq!(rec.progress_percent(), 0.0);

        rec.total_size = 1000;
        rec.add_bytes(None, 250);
        assert_eq!(rec.downloaded_size, 250);
        assert_eq!(rec.progress, 25.0);
    }

    #[test]
    fn test_progress_segmented_sums_segments() {
        let mut rec = record("https://example.com/a.bin");
        rec.total_size = 100;
        rec.segments = vec![
            Segment::new(0, ByteRange::new(0, 49), PathBuf::from("a.part0")),
            Segment::new(1, ByteRange::new(50, 99), PathBuf::from("a.part1")),
        ];

        rec.add_bytes(Some(0), 20);
        rec.add_bytes(Some(1), 30);

        assert_eq!(rec.segments[0].downloaded, 20);
        assert_eq!(rec.segments[1].remaining(), 20);
        assert_eq!(rec.downloaded_size, 50);
        assert_eq!(rec.progress, 50.0);
    }

    #[test]
    fn test_eta() {
        let mut rec = record("https://example.com/a.bin");
        assert!(rec.eta().is_none());

        rec.total_size = 1000;
        rec.downloaded_size = 400;
        rec.speed = 100.0;
        assert_eq!(rec.eta(), Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_byte_range() {
        let range = ByteRange::new(5, 9);
        assert_eq!(range.len(), 5);
        assert_eq!(range.header_value(), "bytes=5-9");
        assert_eq!(range.to_string(), "[5, 9]");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(DownloadId::new(42).to_string(), "dl-42");
        assert_eq!(DownloadId::new(42).as_u64(), 42);
    }
}
