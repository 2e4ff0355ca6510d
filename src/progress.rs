//! Task progress tracking
//!
//! [`ProgressTracker`] is the shared store pollers read from. A pipeline never
//! touches it directly: it reports through a [`ProgressSink`] handed to it at
//! construction, and [`TaskProgress`] is the sink that writes one task's
//! entry in the tracker.

use crate::types::{Event, Progress, TaskId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Receiver of a pipeline's progress reports
///
/// Implementations must be cheap and non-blocking; they are called from
/// inside the download loop.
pub trait ProgressSink: Send + Sync {
    /// Report a non-terminal update
    fn report(&self, percent: u8, message: &str);

    /// Report successful completion (percent 100)
    fn finish(&self, message: &str) {
        self.report(100, message);
    }

    /// Report a terminal failure; `message` is the error text verbatim
    fn fail(&self, message: &str);
}

/// Sink that discards every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _percent: u8, _message: &str) {}
    fn fail(&self, _message: &str) {}
}

/// Lifecycle of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Pipeline still running
    Running,
    /// Pipeline produced its output
    Completed,
    /// Pipeline failed
    Failed,
}

impl TaskState {
    /// Whether no further updates are accepted
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

#[derive(Debug, Clone)]
struct TaskEntry {
    percent: u8,
    message: String,
    state: TaskState,
    updated_at: Instant,
}

/// Thread-safe map of task id to latest progress
///
/// Cloning is cheap; clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    tasks: Arc<RwLock<HashMap<TaskId, TaskEntry>>>,
}

impl ProgressTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id` at 0%
    pub fn register(&self, id: &TaskId) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.insert(
            id.clone(),
            TaskEntry {
                percent: 0,
                message: "Starting download...".to_string(),
                state: TaskState::Running,
                updated_at: Instant::now(),
            },
        );
    }

    /// Record a progress update
    ///
    /// The stored percent never decreases and never exceeds 100. Updates for
    /// unknown or terminal tasks are ignored.
    pub fn update(&self, id: &TaskId, percent: u8, message: &str) {
        self.apply(id, percent, message, TaskState::Running);
    }

    /// Mark `id` completed at 100%
    pub fn finish(&self, id: &TaskId, message: &str) {
        self.apply(id, 100, message, TaskState::Completed);
    }

    /// Mark `id` failed, keeping its current percent
    pub fn fail(&self, id: &TaskId, message: &str) {
        self.apply(id, 0, message, TaskState::Failed);
    }

    fn apply(&self, id: &TaskId, percent: u8, message: &str, state: TaskState) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = tasks.get_mut(id) else {
            return;
        };
        if entry.state.is_terminal() {
            return;
        }
        entry.percent = entry.percent.max(percent.min(100));
        entry.message = message.to_string();
        entry.state = state;
        entry.updated_at = Instant::now();
    }

    /// Latest progress for `id`
    ///
    /// Unknown ids (not yet registered, released or evicted) yield
    /// `{0, "Unknown task"}` rather than an error.
    pub fn get(&self, id: &TaskId) -> Progress {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks
            .get(id)
            .map(|entry| Progress {
                percent: entry.percent,
                message: entry.message.clone(),
            })
            .unwrap_or_else(Progress::unknown)
    }

    /// Lifecycle state of `id`, if tracked
    pub fn state(&self, id: &TaskId) -> Option<TaskState> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks.get(id).map(|entry| entry.state)
    }

    /// Stop tracking `id`
    pub fn release(&self, id: &TaskId) -> bool {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.remove(id).is_some()
    }

    /// Drop terminal entries idle for longer than `ttl`, returning how many
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, entry| !(entry.state.is_terminal() && entry.updated_at.elapsed() > ttl));
        before - tasks.len()
    }

    /// Number of tracked tasks
    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no task is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`ProgressSink`] scoped to one task of a [`ProgressTracker`]
///
/// Optionally mirrors every report onto the event channel.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    tracker: ProgressTracker,
    id: TaskId,
    events: Option<broadcast::Sender<Event>>,
}

impl TaskProgress {
    /// Sink writing to `tracker` under `id`
    pub fn new(tracker: ProgressTracker, id: TaskId) -> Self {
        Self {
            tracker,
            id,
            events: None,
        }
    }

    /// Also emit `Event::TaskProgress` for every report
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self) {
        if let Some(events) = &self.events {
            let progress = self.tracker.get(&self.id);
            // no subscribers is fine
            events
                .send(Event::TaskProgress {
                    task_id: self.id.clone(),
                    percent: progress.percent,
                    message: progress.message,
                })
                .ok();
        }
    }
}

impl ProgressSink for TaskProgress {
    fn report(&self, percent: u8, message: &str) {
        self.tracker.update(&self.id, percent, message);
        self.emit();
    }

    fn finish(&self, message: &str) {
        self.tracker.finish(&self.id, message);
        self.emit();
    }

    fn fail(&self, message: &str) {
        self.tracker.fail(&self.id, message);
    }
}
