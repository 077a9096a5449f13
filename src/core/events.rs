// ─── Observer Bus ───
// Publishes progress snapshots and lifecycle events to any number of
// subscribers without ever waiting on them.
//
// Delivery:
//   progress   bounded per subscriber; a snapshot is dropped when the
//              subscriber is behind, later snapshots supersede it
//   lifecycle  unbounded per subscriber; never dropped

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::core::downloader::ProgressSnapshot;

const PROGRESS_BUFFER: usize = 16;

/// Which part of a launch an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Launch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started { stage: Stage },
    Succeeded { stage: Stage },
    Failed { stage: Stage, reason: String },
}

impl LifecycleEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleEvent::Started { .. })
    }
}

struct Subscriber {
    progress: mpsc::Sender<ProgressSnapshot>,
    lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
}

/// Receiving side handed to an observer.
pub struct Subscription {
    pub progress: mpsc::Receiver<ProgressSnapshot>,
    pub lifecycle: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl Subscription {
    /// Most recent snapshot currently queued, if any.
    pub fn latest_progress(&mut self) -> Option<ProgressSnapshot> {
        let mut latest = None;
        while let Ok(snapshot) = self.progress.try_recv() {
            latest = Some(snapshot);
        }
        latest
    }

    /// Lifecycle events queued so far.
    pub fn drain_lifecycle(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.lifecycle.try_recv() {
            events.push(event);
        }
        events
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_BUFFER);
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber {
            progress: progress_tx,
            lifecycle: lifecycle_tx,
        });
        Subscription {
            progress: progress_rx,
            lifecycle: lifecycle_rx,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn publish_progress(&self, snapshot: ProgressSnapshot) {
        self.lock()
            .retain(|sub| match sub.progress.try_send(snapshot) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
    }

    pub fn publish(&self, event: LifecycleEvent) {
        debug!("Lifecycle event: {:?}", event);
        self.lock()
            .retain(|sub| sub.lifecycle.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
