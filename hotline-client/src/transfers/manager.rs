//! Shared task registry
//!
//! Every worker and any number of readers share one [`TaskManager`] behind an
//! `Arc`. Readers get cloned snapshots; all mutation goes through the methods
//! here, and each task is only mutated by the worker running it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use uuid::Uuid;

use super::types::{Task, TaskStatus, TransferError};

#[derive(Debug, Default)]
struct Registry {
    tasks: HashMap<Uuid, Task>,
    /// Task IDs in insertion order
    order: Vec<Uuid>,
    /// Task IDs in the order they reached Completed or Failed
    finished: Vec<Uuid>,
}

/// Thread-safe registry of every task created in this session
#[derive(Debug, Default)]
pub struct TaskManager {
    inner: Mutex<Registry>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under a fresh ID and return that ID
    pub fn add(&self, mut task: Task) -> Uuid {
        let mut registry = self.inner.lock().expect("task registry lock");
        while registry.tasks.contains_key(&task.id) {
            task.id = Uuid::new_v4();
        }
        let id = task.id;
        registry.order.push(id);
        registry.tasks.insert(id, task);
        id
    }

    /// Snapshot of one task
    pub fn get(&self, id: Uuid) -> Option<Task> {
        let registry = self.inner.lock().expect("task registry lock");
        registry.tasks.get(&id).cloned()
    }

    /// Pending and Active tasks, oldest first
    pub fn get_active(&self) -> Vec<Task> {
        let registry = self.inner.lock().expect("task registry lock");
        registry
            .order
            .iter()
            .filter_map(|id| registry.tasks.get(id))
            .filter(|task| task.status.is_active())
            .cloned()
            .collect()
    }

    /// Up to `limit` Completed and Failed tasks, newest first
    pub fn get_completed(&self, limit: usize) -> Vec<Task> {
        let registry = self.inner.lock().expect("task registry lock");
        registry
            .finished
            .iter()
            .rev()
            .filter_map(|id| registry.tasks.get(id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("task registry lock").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending -> Active
    pub fn activate(&self, id: Uuid) -> bool {
        self.update(id, Task::activate).unwrap_or(false)
    }

    /// Active -> Completed
    pub fn complete(&self, id: Uuid) -> bool {
        self.finish(id, Task::complete)
    }

    /// Active -> Failed
    pub fn fail(&self, id: Uuid, error: &TransferError) -> bool {
        self.finish(id, |task| task.fail(error))
    }

    /// Set the expected size once it is known
    pub fn set_total(&self, id: Uuid, total_bytes: u64) {
        self.update(id, |task| task.total_bytes = total_bytes);
    }

    pub fn set_local_path(&self, id: Uuid, path: PathBuf) {
        self.update(id, |task| task.local_path = Some(path));
    }

    /// Record a cumulative byte count for an active task
    pub fn record_progress(&self, id: Uuid, transferred: u64) {
        self.update(id, |task| {
            if task.status == TaskStatus::Active {
                task.record_progress(transferred);
            }
        });
    }

    fn finish(&self, id: Uuid, transition: impl FnOnce(&mut Task) -> bool) -> bool {
        let mut registry = self.inner.lock().expect("task registry lock");
        let finished = registry.tasks.get_mut(&id).map(transition).unwrap_or(false);
        if finished {
            registry.finished.push(id);
        }
        finished
    }

    fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut registry = self.inner.lock().expect("task registry lock");
        registry.tasks.get_mut(&id).map(f)
    }
}
