//! Worker pool with two priority lanes
//!
//! Reduction internals submit at high priority so that ready pairs are
//! drained ahead of newly launched tile work; everything else uses the
//! normal lane. Workers drain both lanes before honoring shutdown, so
//! dropping the pool never abandons queued work.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::trace;

/// Scheduling priority of a submitted task
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Default lane for tile work
    Normal,
    /// Drained first; used for internal reduction steps
    High,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queues {
    high: VecDeque<Job>,
    normal: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    queues: Mutex<Queues>,
    available: Condvar,
}

impl Shared {
    fn submit(&self, priority: Priority, job: Job) -> Result<()> {
        let mut queues = self.queues.lock();
        if queues.shutdown {
            return Err(Error::QueueExhausted);
        }
        match priority {
            Priority::High => queues.high.push_back(job),
            Priority::Normal => queues.normal.push_back(job),
        }
        drop(queues);
        self.available.notify_one();
        Ok(())
    }

    fn next_job(&self) -> Option<Job> {
        let mut queues = self.queues.lock();
        loop {
            if let Some(job) = queues.high.pop_front() {
                return Some(job);
            }
            if let Some(job) = queues.normal.pop_front() {
                return Some(job);
            }
            if queues.shutdown {
                return None;
            }
            self.available.wait(&mut queues);
        }
    }
}

/// Submit-only handle to a [`TaskPool`]
///
/// Handles are cheap to clone and may outlive the pool; submitting to a
/// shut-down pool returns [`Error::QueueExhausted`].
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    /// Enqueue `task` at the given priority.
    pub fn submit(&self, priority: Priority, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.shared.submit(priority, Box::new(task))
    }
}

/// Owning worker pool
///
/// Dropping the pool drains both lanes and joins every worker.
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Create a pool with `threads` workers.
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                high: VecDeque::new(),
                normal: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let workers = (0..threads)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("tilefuse-worker-{i}"))
                    .spawn(move || {
                        trace!(worker = i, "worker started");
                        while let Some(job) = shared.next_job() {
                            job();
                        }
                        trace!(worker = i, "worker stopped");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Enqueue `task` at the given priority.
    pub fn submit(&self, priority: Priority, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.shared.submit(priority, Box::new(task))
    }

    /// A submit-only handle that can be shared with tasks.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Default for TaskPool {
    /// Pool sized to the machine's available parallelism.
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(threads)
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.queues.lock().shutdown = true;
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            worker.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_runs_submitted_tasks() {
        let pool = TaskPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            pool.submit(Priority::Normal, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_high_priority_preempts_queued_normal_work() {
        // One worker, blocked long enough for both lanes to fill.
        let pool = TaskPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        pool.submit(Priority::Normal, || {
            std::thread::sleep(Duration::from_millis(20));
        })
        .unwrap();
        let order_normal = Arc::clone(&order);
        pool.submit(Priority::Normal, move || {
            order_normal.lock().push("normal");
        })
        .unwrap();
        let order_high = Arc::clone(&order);
        pool.submit(Priority::High, move || {
            order_high.lock().push("high");
        })
        .unwrap();

        drop(pool);
        assert_eq!(*order.lock(), vec!["high", "normal"]);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = TaskPool::new(1);
        let handle = pool.handle();
        drop(pool);
        assert_eq!(
            handle.submit(Priority::Normal, || {}),
            Err(Error::QueueExhausted)
        );
    }
}
