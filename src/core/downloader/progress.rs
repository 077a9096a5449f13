use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::events::EventBus;

use super::task::TaskStatus;

const BYTE_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Aggregate state of a download run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Sum of known task sizes.
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub total_tasks: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.completed_bytes as f64 / self.total_bytes as f64).min(1.0)
        } else if self.total_tasks > 0 {
            self.done as f64 / self.total_tasks as f64
        } else {
            1.0
        }
    }

    pub fn is_finished(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }

    fn count_mut(&mut self, status: TaskStatus) -> &mut usize {
        match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Done => &mut self.done,
            TaskStatus::Failed => &mut self.failed,
        }
    }
}

/// The one writer of a run's snapshot. Workers report through it; every
/// update happens under a single lock and readers get a copy.
pub struct ProgressTracker {
    inner: Mutex<TrackerState>,
    bus: Option<EventBus>,
}

struct TrackerState {
    snapshot: ProgressSnapshot,
    last_published: Option<Instant>,
}

impl ProgressTracker {
    pub fn new(total_tasks: usize, total_bytes: u64, bus: Option<EventBus>) -> Self {
        Self {
            inner: Mutex::new(TrackerState {
                snapshot: ProgressSnapshot {
                    total_bytes,
                    total_tasks,
                    pending: total_tasks,
                    ..ProgressSnapshot::default()
                },
                last_published: None,
            }),
            bus,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot
    }

    /// Record a task moving between states. Always published.
    pub fn transition(&self, from: TaskStatus, to: TaskStatus) {
        let snapshot = {
            let mut state = self.lock();
            let from_count = state.snapshot.count_mut(from);
            *from_count = from_count.saturating_sub(1);
            *state.snapshot.count_mut(to) += 1;
            state.last_published = Some(Instant::now());
            state.snapshot
        };
        self.publish(snapshot);
    }

    /// Bytes written to disk. Published at a sampled rate.
    pub fn add_bytes(&self, bytes: u64) {
        let snapshot = {
            let mut state = self.lock();
            state.snapshot.completed_bytes = state.snapshot.completed_bytes.saturating_add(bytes);
            let due = state
                .last_published
                .map_or(true, |at| at.elapsed() >= BYTE_SAMPLE_INTERVAL);
            if !due {
                return;
            }
            state.last_published = Some(Instant::now());
            state.snapshot
        };
        self.publish(snapshot);
    }

    /// Bytes of an attempt that was thrown away.
    pub fn discard_bytes(&self, bytes: u64) {
        let mut state = self.lock();
        state.snapshot.completed_bytes = state.snapshot.completed_bytes.saturating_sub(bytes);
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        if let Some(bus) = &self.bus {
            bus.publish_progress(snapshot);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
