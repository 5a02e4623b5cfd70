use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

struct Worker {
    id: u64,
    name: String,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct Registry {
    last_id: u64,
    // registration order
    active: Vec<Worker>,
}

/// Tracks named background workers so shutdown can wait for them.
///
/// Owned by the process entry point and cloned into whatever spawns workers.
#[derive(Clone, Default)]
pub struct TaskSupervisor {
    registry: Arc<Mutex<Registry>>,
}

/// Completion handle for one registered worker. Dropping it marks the worker done.
pub struct WorkerHandle {
    id: u64,
    name: String,
    done: watch::Sender<bool>,
    marked: AtomicBool,
    registry: Arc<Mutex<Registry>>,
}

/// Outcome of [`TaskSupervisor::drain_all`], in drain order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DrainReport {
    pub ended: Vec<String>,
    pub timed_out: Vec<String>,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new active worker.
    pub fn register(&self, name: impl Into<String>) -> WorkerHandle {
        let name = name.into();
        let (done_tx, done_rx) = watch::channel(false);

        let mut registry = self.registry.lock();
        registry.last_id += 1;
        let id = registry.last_id;
        registry.active.push(Worker {
            id,
            name: name.clone(),
            done: done_rx,
        });
        debug!(
            worker = %name,
            running = registry.active.len(),
            "Worker started"
        );

        WorkerHandle {
            id,
            name,
            done: done_tx,
            marked: AtomicBool::new(false),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Registers `name` and runs `task` on the tokio runtime, marking the worker done
    /// when the task returns or unwinds.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.register(name);
        tokio::spawn(async move {
            let output = task.await;
            handle.mark_done();
            output
        })
    }

    /// Names of the workers that have not finished, in registration order.
    pub fn active(&self) -> Vec<String> {
        self.registry
            .lock()
            .active
            .iter()
            .map(|w| w.name.clone())
            .collect()
    }

    /// Waits for every active worker, newest first, giving each at most `timeout`.
    ///
    /// Best effort: a worker that misses its deadline is logged and skipped, so this
    /// returns within `active workers × timeout`.
    pub async fn drain_all(&self, timeout: Duration) -> DrainReport {
        let pending: Vec<(String, watch::Receiver<bool>)> = self
            .registry
            .lock()
            .active
            .iter()
            .rev()
            .map(|w| (w.name.clone(), w.done.clone()))
            .collect();

        let mut report = DrainReport::default();
        for (name, mut done) in pending {
            let ended = tokio::time::timeout(timeout, done.wait_for(|d| *d))
                .await
                .is_ok();
            if ended {
                info!(worker = %name, "Worker ended");
                report.ended.push(name);
            } else {
                error!(worker = %name, ?timeout, "Worker didn't end in time");
                report.timed_out.push(name);
            }
        }
        report
    }
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the worker from the active set. Only the first call has an effect.
    pub fn mark_done(&self) {
        if self.marked.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut registry = self.registry.lock();
        self.done.send_replace(true);
        registry.active.retain(|w| w.id != self.id);
        let left = registry.active.len();
        if left == 0 {
            debug!("All workers ended");
        } else {
            debug!(worker = %self.name, left, "Worker ended");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.mark_done();
    }
}
