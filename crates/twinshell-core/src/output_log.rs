//! Ordered, observable output log with broadcast + history.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::OutputLine;

/// Default history size limit (16 MB of line text).
const HISTORY_BYTES: usize = 16 * 1024 * 1024;

/// Capacity of the live channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 4096;

/// Change pushed to live subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A line was appended.
    Line(OutputLine),
    /// The log was cleared.
    Cleared,
}

struct Inner {
    history: VecDeque<OutputLine>,
    total_bytes: usize,
}

/// Output log shared between the execution task and observers.
///
/// New observers read the history and then follow live events, so a view
/// attached mid-run still sees every line in order.
pub struct OutputLog {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<OutputEvent>,
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(64),
                total_bytes: 0,
            }),
            sender,
        }
    }

    /// Append a line, evicting the oldest lines past the size limit.
    pub fn push(&self, line: OutputLine) {
        let bytes = line.text.len();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        while inner.total_bytes.saturating_add(bytes) > HISTORY_BYTES {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.text.len());
            } else {
                break;
            }
        }
        inner.history.push_back(line.clone());
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
        // Send under the lock so a new subscriber never sees a line twice.
        let _ = self.sender.send(OutputEvent::Line(line));
    }

    /// Append a line built from text.
    pub fn push_text<S: Into<String>>(&self, text: S, is_error: bool) {
        self.push(OutputLine::new(text, is_error));
    }

    /// Drop all history and notify listeners.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.history.clear();
        inner.total_bytes = 0;
        let _ = self.sender.send(OutputEvent::Cleared);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn get_receiver(&self) -> broadcast::Receiver<OutputEvent> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn get_history(&self) -> Vec<OutputLine> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .cloned()
            .collect()
    }

    /// Text of every line in the history.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.get_history().into_iter().map(|l| l.text).collect()
    }

    /// Stream that yields history first, then live updates.
    ///
    /// Lagged live events are skipped.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, OutputEvent> {
        let (history, rx) = {
            // Subscribe under the read lock so no line falls between the two.
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            let history: Vec<OutputLine> = inner.history.iter().cloned().collect();
            (history, self.sender.subscribe())
        };

        let hist = futures::stream::iter(history.into_iter().map(OutputEvent::Line));
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}
