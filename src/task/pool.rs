//! Bounded background execution with a put-once result slot

use crate::KageError;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const STATUS_OK: u16 = 200;
pub const STATUS_TIMEOUT: u16 = 408;
pub const STATUS_FAILED: u16 = 500;

/// What a caller gets back from a submitted unit of work
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub payload: Value,
    pub success: bool,
    pub status_code: u16,
}

impl TaskOutcome {
    fn ok(payload: Value) -> Self {
        Self {
            payload,
            success: true,
            status_code: STATUS_OK,
        }
    }

    fn failed(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            payload: json!({ "error": message.into() }),
            success: false,
            status_code,
        }
    }
}

/// Runs units of work in the background, at most `max_concurrent` at once
#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    running: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            running: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of submitted units that have not finished yet
    pub fn pending(&self) -> usize {
        self.running().iter().filter(|task| !task.is_finished()).count()
    }

    /// Waits until every submitted unit has finished
    ///
    /// A caller that stopped waiting on a handle calls this before the
    /// runtime shuts down, so abandoned runs still reach a terminal state.
    pub async fn wait_idle(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.running());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    warn!("Background task did not finish cleanly: {}", e);
                }
            }
        }
    }

    /// Starts `work` in the background and returns a handle to its result
    ///
    /// An error or a panic inside `work` becomes a failed outcome with
    /// status 500; nothing propagates to the caller.
    pub fn submit<F, T>(&self, label: impl Into<String>, work: F) -> TaskHandle
    where
        F: Future<Output = Result<T, KageError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let label = label.into();
        let (sender, receiver) = oneshot::channel();
        let permits = self.permits.clone();
        let task_label = label.clone();

        let task = tokio::spawn(async move {
            // A closed semaphore only means no bound is enforced any more
            let _permit = permits.acquire_owned().await.ok();
            debug!("Task '{}' started", task_label);

            let outcome = match tokio::spawn(work).await {
                Ok(Ok(value)) => match serde_json::to_value(&value) {
                    Ok(payload) => TaskOutcome::ok(payload),
                    Err(e) => TaskOutcome::failed(STATUS_FAILED, format!("unserializable result: {}", e)),
                },
                Ok(Err(e)) => {
                    error!("Task '{}' failed: {}", task_label, e);
                    TaskOutcome::failed(STATUS_FAILED, e.to_string())
                }
                Err(e) => {
                    error!("Task '{}' aborted: {}", task_label, e);
                    TaskOutcome::failed(STATUS_FAILED, format!("task aborted: {}", e))
                }
            };

            if sender.send(outcome).is_err() {
                debug!("Task '{}' finished after its caller stopped waiting", task_label);
            }
        });

        let mut running = self.running();
        running.retain(|task| !task.is_finished());
        running.push(task);
        drop(running);

        TaskHandle { label, receiver }
    }
}

/// Single-use handle on a submitted unit of work
pub struct TaskHandle {
    label: String,
    receiver: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Waits up to `timeout` for the result
    ///
    /// On timeout the outcome has status 408 and the work keeps running to
    /// completion in the background.
    pub async fn await_result(self, timeout: Duration) -> TaskOutcome {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => TaskOutcome::failed(STATUS_FAILED, "task ended without a result"),
            Err(_) => {
                warn!(
                    "Stopped waiting for task '{}' after {:?}; it keeps running",
                    self.label, timeout
                );
                TaskOutcome {
                    payload: json!({
                        "error": "timed out waiting for result",
                        "timeout_secs": timeout.as_secs_f64(),
                    }),
                    success: false,
                    status_code: STATUS_TIMEOUT,
                }
            }
        }
    }
}
