//! The Warden - per-service task scheduler
//!
//! Runs every registered task on its own tokio task and interval:
//! - Ticks of one task run sequentially and never overlap
//! - Ticks of different tasks run concurrently
//! - Starting a task under an existing id replaces the old loop
//! - Shutdown lets an in-flight tick finish, but cuts short any sleep
//!   that races against the shutdown signal

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Boxed, sendable future used at trait seams
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unit of scheduled work
///
/// Receives the loop's shutdown signal so long waits inside a tick can be
/// abandoned on shutdown.
pub type Task = Arc<dyn Fn(Shutdown) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Smallest interval a task loop will run at
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Receiving side of a shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of a shutdown signal
///
/// Dropping the trigger also counts as shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a linked trigger and signal
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// Resolve once shutdown is requested
    pub async fn triggered(&mut self) {
        // Err means the trigger was dropped
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration` unless shutdown comes first
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}

impl ShutdownTrigger {
    /// Request shutdown
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Something that runs tasks on a fixed interval
pub trait Scheduler: Send + Sync {
    /// Start running `task` every `interval` under `task_id`
    ///
    /// Replaces any task already registered under the same id.
    fn start(&self, task_id: &str, interval: Duration, task: Task);

    /// Stop every task, waiting for in-flight ticks to finish
    fn stop_all(&self) -> BoxFuture<'_, ()>;
}

/// Running task bookkeeping
struct TaskSlot {
    /// Shutdown trigger for this loop
    trigger: ShutdownTrigger,
    /// Handle to the loop
    handle: JoinHandle<()>,
}

/// Tokio-backed scheduler with one loop per task id
#[derive(Default)]
pub struct Warden {
    /// Active loops: task id → slot
    tasks: Mutex<HashMap<String, TaskSlot>>,
    /// Replaced loops still finishing their last tick
    retiring: Mutex<Vec<JoinHandle<()>>>,
}

impl Warden {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all active tasks
    pub fn active_tasks(&self) -> Vec<String> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop a single task, waiting for its in-flight tick
    pub async fn stop(&self, task_id: &str) {
        let slot = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.remove(task_id)
        };

        if let Some(slot) = slot {
            slot.trigger.trigger();
            match slot.handle.await {
                Ok(()) => debug!(task = %task_id, "task stopped"),
                Err(e) => warn!(task = %task_id, error = %e, "task loop ended abnormally"),
            }
        }
    }

    async fn shutdown(&self) {
        let ids = self.active_tasks();
        {
            let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            for slot in tasks.values() {
                slot.trigger.trigger();
            }
        }

        for id in &ids {
            self.stop(id).await;
        }

        let retiring: Vec<JoinHandle<()>> = {
            let mut retiring = self.retiring.lock().unwrap_or_else(PoisonError::into_inner);
            retiring.drain(..).collect()
        };
        for handle in retiring {
            let _ = handle.await;
        }

        info!(count = ids.len(), "all tasks stopped");
    }
}

impl Scheduler for Warden {
    fn start(&self, task_id: &str, interval: Duration, task: Task) {
        let (trigger, shutdown) = Shutdown::channel();
        let id = task_id.to_string();
        let handle = tokio::spawn(run_task_loop(id, interval, task, shutdown));

        let old = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.insert(task_id.to_string(), TaskSlot { trigger, handle })
        };

        if let Some(old) = old {
            old.trigger.trigger();
            let mut retiring = self.retiring.lock().unwrap_or_else(PoisonError::into_inner);
            retiring.retain(|h| !h.is_finished());
            retiring.push(old.handle);
            info!(task = %task_id, ?interval, "task replaced");
        } else {
            debug!(task = %task_id, ?interval, "task started");
        }
    }

    fn stop_all(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}

/// The loop for a single task
async fn run_task_loop(task_id: String, interval: Duration, task: Task, mut shutdown: Shutdown) {
    let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = task(shutdown.clone()).await {
            warn!(task = %task_id, error = %e, "scheduled task failed");
        }
    }

    debug!(task = %task_id, "task loop stopped");
}

#[cfg(test)]
impl Shutdown {
    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

#[cfg(test)]
impl Warden {
    /// Whether a task is registered under `task_id`
    pub fn is_running(&self, task_id: &str) -> bool {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.contains_key(task_id)
    }
}
