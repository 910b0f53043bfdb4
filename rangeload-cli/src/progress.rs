//! Terminal progress bars fed by engine events.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use rangeload::{DownloadEvent, DownloadId, DownloadStatus, EventKind, EventReceiver};

const BAR_TEMPLATE: &str =
    "{msg} [{bar:32.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} {bytes} ({bytes_per_sec})";

/// Final state of every tracked download.
#[derive(Debug, Default)]
pub struct Summary {
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.canceled
    }
}

/// One bar per download, updated from the event stream.
pub struct ProgressDisplay {
    multi: MultiProgress,
    bars: HashMap<DownloadId, ProgressBar>,
    summary: Summary,
}

impl ProgressDisplay {
    pub fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            bars: HashMap::new(),
            summary: Summary::default(),
        }
    }

    /// Consume events until every id in `ids` is terminal or the stream ends.
    pub fn run(mut self, events: &mut EventReceiver, ids: &[DownloadId]) -> Summary {
        let mut pending = ids.len();
        while pending > 0 {
            let Some(event) = events.blocking_recv() else {
                break;
            };
            if !ids.contains(&event.record.id) {
                continue;
            }
            if self.apply(&event) {
                pending -= 1;
            }
        }
        self.summary
    }

    /// Update the display; returns `true` when the event is terminal.
    fn apply(&mut self, event: &DownloadEvent) -> bool {
        let record = &event.record;
        let bar = self.bar(record.id, &record.filename);

        match event.kind {
            EventKind::Added => bar.set_message(format!("{} (queued)", record.filename)),
            EventKind::Started => {
                if record.total_size > 0 {
                    bar.set_style(style(BAR_TEMPLATE));
                    bar.set_length(record.total_size);
                }
                let mode = match record.segments.len() {
                    0 => String::new(),
                    n => format!(" ×{}", n),
                };
                bar.set_message(format!("{}{}", record.filename, mode));
            }
            EventKind::Progress => bar.set_position(record.downloaded_size),
            EventKind::Paused => bar.set_message(format!("{} (paused)", record.filename)),
            EventKind::Resumed => bar.set_message(record.filename.clone()),
            EventKind::Completed => {
                bar.set_position(record.downloaded_size);
                bar.finish_with_message(format!("{} done", record.filename));
            }
            EventKind::Error => {
                let reason = record.error_message.as_deref().unwrap_or("unknown error");
                bar.abandon_with_message(format!("{} failed: {}", record.filename, reason));
            }
            EventKind::Canceled => {
                bar.abandon_with_message(format!("{} canceled", record.filename));
            }
        }

        if !event.kind.is_terminal() {
            return false;
        }
        match record.status {
            DownloadStatus::Completed => self.summary.completed += 1,
            DownloadStatus::Error => self.summary.failed += 1,
            _ => self.summary.canceled += 1,
        }
        true
    }

    fn bar(&mut self, id: DownloadId, filename: &str) -> ProgressBar {
        self.bars
            .entry(id)
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(style(SPINNER_TEMPLATE));
                bar.set_message(filename.to_string());
                bar
            })
            .clone()
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}
