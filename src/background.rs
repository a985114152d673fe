//! Background execution contexts
//!
//! A small fixed set of worker threads that run `Send` closures off the main
//! context. Workers know nothing about promises; results travel back through a
//! [`Completer`](crate::Completer) owned by the submitted closure.

use std::thread::JoinHandle as ThreadJoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::BACKGROUND_THREAD_PREFIX;
use crate::error::Result;

type Work = Box<dyn FnOnce() + Send + 'static>;

/// Messages understood by a background worker
pub enum WorkerMessage {
    /// Run a closure
    Run(Work),
    /// Finish the current closure and exit
    Shutdown,
}

impl std::fmt::Debug for WorkerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerMessage::Run(_) => f.debug_tuple("Run").field(&"<closure>").finish(),
            WorkerMessage::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Fixed-size pool of background workers
#[derive(Debug)]
pub struct BackgroundPool {
    sender: Sender<WorkerMessage>,
    workers: Vec<ThreadJoinHandle<()>>,
}

impl BackgroundPool {
    /// Spawn `threads` workers (at least one)
    pub fn new(name: &str, threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = unbounded();
        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let receiver: Receiver<WorkerMessage> = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}-{}", BACKGROUND_THREAD_PREFIX, name, index))
                .spawn(move || worker_loop(index, receiver))?;
            workers.push(handle);
        }

        tracing::info!("Started {} background workers for runtime {}", threads, name);
        Ok(Self { sender, workers })
    }

    /// Queue a closure for execution on some worker
    pub fn execute<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(WorkerMessage::Run(Box::new(work))).is_err() {
            // Only possible once every worker has exited; the closure (and any
            // completer it owns) is dropped here.
            tracing::warn!("Background pool is shut down; dropping submitted work");
        }
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.sender.send(WorkerMessage::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                tracing::error!("Background worker failed to join: {:?}", e);
            }
        }
        tracing::debug!("Background pool stopped");
    }
}

fn worker_loop(index: usize, receiver: Receiver<WorkerMessage>) {
    tracing::debug!("Background worker {} started", index);
    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Run(work) => {
                // Work submitted through `MainContext` isolates its own panics;
                // this guard keeps the worker alive for raw submissions too.
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(work)).is_err() {
                    tracing::warn!("Background worker {} caught a panicking job", index);
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }
    tracing::debug!("Background worker {} shutting down", index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    #[test]
    fn test_pool_creation() {
        let pool = BackgroundPool::new("test", 3).unwrap();
        assert_eq!(pool.worker_count(), 3);
    }

    #[test]
    fn test_pool_has_at_least_one_worker() {
        let pool = BackgroundPool::new("test", 0).unwrap();
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_pool_runs_work_off_thread() {
        let pool = BackgroundPool::new("test", 2).unwrap();
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();

        pool.execute(move || {
            tx.send(std::thread::current().id()).unwrap();
        });

        let worker = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_pool_survives_panicking_work() {
        let pool = BackgroundPool::new("test", 1).unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::channel();

        pool.execute(|| panic!("boom"));
        let counter_clone = counter.clone();
        pool.execute(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            tx.send(()).unwrap();
        });

        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_joins_after_queued_work() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let pool = BackgroundPool::new("test", 2).unwrap();
            for _ in 0..8 {
                let counter = counter.clone();
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
