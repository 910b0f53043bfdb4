//! Lifecycle notifications.
//!
//! Every subscriber owns an unbounded channel and receives each event
//! published after it subscribed, carrying a snapshot of the affected
//! record. Listeners never run on engine threads.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::record::DownloadRecord;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Added,
    Started,
    Progress,
    Paused,
    Resumed,
    Completed,
    Error,
    Canceled,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    /// `Completed`, `Error` or `Canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Canceled)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event with the record as it was when the event fired.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadEvent {
    pub kind: EventKind,
    pub record: DownloadRecord,
}

/// Receiving half of a subscription.
#[derive(Debug)]
pub struct EventReceiver {
    rx: UnboundedReceiver<DownloadEvent>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<DownloadEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv). Must not be called from async code.
    pub fn blocking_recv(&mut self) -> Option<DownloadEvent> {
        self.rx.blocking_recv()
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<DownloadEvent> {
        self.rx.try_recv().ok()
    }

    /// Every event queued right now.
    pub fn drain(&mut self) -> Vec<DownloadEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Fan-out of events to all live subscribers.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<DownloadEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        EventReceiver { rx }
    }

    /// Send a snapshot of `record` to every subscriber and drop closed ones.
    pub fn publish(&self, kind: EventKind, record: &DownloadRecord) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }

        let event = DownloadEvent {
            kind,
            record: record.clone(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Drop every sender so receivers observe the end of the stream.
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
