//! The executor façade: submission, the worker pool, completion draining.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::future::{TaskFuture, WorkFuture};
use crate::task::Task;
use crate::wakeup::{self, WakeupReader};
use crate::worker::{WorkItem, Worker};

/// Pool configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Worker threads started at construction.
    pub threads: usize,
    /// Prefix for worker thread names; the worker index is appended.
    pub thread_name: String,
    /// Retries before a wakeup byte is dropped on a persistently full pipe.
    pub wake_retry_limit: u32,
    /// Pause between wakeup write retries.
    pub wake_retry_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            thread_name: "pool-worker".to_string(),
            wake_retry_limit: 100,
            wake_retry_delay: Duration::from_millis(1),
        }
    }
}

/// Bounded pool of worker threads for blocking tasks, with completions
/// surfaced through a pollable file descriptor.
///
/// The executor belongs to one thread, typically the one running an event
/// loop. That thread registers [`read_fd`](Executor::read_fd) with its
/// readiness mechanism and calls [`poll`](Executor::poll) whenever the fd
/// turns readable. Each `poll` dispatches at most one completed task's
/// callbacks, so the loop should re-check readability until the fd goes
/// quiet; one readable event is not a promise of exactly one completion.
///
/// Submission, the readiness fd, and `poll` never block the owning thread.
/// Dropping the executor closes it, so every exit path joins the workers
/// and flushes outstanding completions.
pub struct Executor {
    closed: AtomicBool,
    work_tx: Sender<WorkItem>,
    completion_rx: Receiver<Box<dyn WorkFuture>>,
    wakeup_rx: Option<WakeupReader>,
    workers: Vec<Worker>,
    config: ExecutorConfig,
}

impl Executor {
    /// Start a pool with `threads` workers and default tuning.
    pub fn new(threads: usize) -> io::Result<Self> {
        Self::with_config(ExecutorConfig {
            threads,
            ..ExecutorConfig::default()
        })
    }

    /// Start a pool from an explicit configuration.
    pub fn with_config(config: ExecutorConfig) -> io::Result<Self> {
        let (work_tx, work_rx) = unbounded();
        let (completion_tx, completion_rx) = unbounded();
        let (wakeup_rx, wakeup_tx) =
            wakeup::pair(config.wake_retry_limit, config.wake_retry_delay)?;
        let wakeup_tx = Arc::new(wakeup_tx);

        let mut workers = Vec::with_capacity(config.threads);
        for index in 0..config.threads {
            workers.push(Worker::spawn(
                format!("{}-{}", config.thread_name, index),
                work_rx.clone(),
                completion_tx.clone(),
                Arc::clone(&wakeup_tx),
            )?);
        }
        log::info!("executor started with {} worker threads", config.threads);

        Ok(Self {
            closed: AtomicBool::new(false),
            work_tx,
            completion_rx,
            wakeup_rx: Some(wakeup_rx),
            workers,
            config,
        })
    }

    /// The configuration the pool was started with.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Number of worker threads the pool was built with.
    pub fn pool_size(&self) -> usize {
        self.config.threads
    }

    /// Whether [`close`](Executor::close) has run; a closed executor
    /// rejects submissions.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a task for execution.
    ///
    /// Returns the future immediately; the task runs on whichever worker
    /// dequeues it first. Work is handed to workers in submission order, but
    /// completion order depends on how long each task runs.
    ///
    /// # Panics
    ///
    /// Panics if the executor has been closed. Submitting after
    /// [`close`](Executor::close) is a lifecycle bug in the caller, not a
    /// recoverable condition.
    pub fn submit<T: Send + 'static>(&self, task: Task<T>) -> TaskFuture<T> {
        assert!(
            !self.closed.load(Ordering::Acquire),
            "submit on closed executor"
        );
        let future = TaskFuture::new(task);
        let item = WorkItem::Run(Box::new(future.clone()));
        if self.work_tx.send(item).is_err() {
            // No worker holds the channel any more; only possible once
            // shutdown has begun or the pool was built with zero threads.
            panic!("submit on executor with no live workers");
        }
        future
    }

    /// The fd the owning event loop registers for readability.
    ///
    /// One byte arrives per completed task; when the fd is readable, call
    /// [`poll`](Executor::poll).
    ///
    /// # Panics
    ///
    /// Panics after [`close`](Executor::close); the endpoints are gone.
    pub fn read_fd(&self) -> RawFd {
        self.wakeup_rx
            .as_ref()
            .expect("read_fd on closed executor")
            .read_fd()
    }

    /// Dispatch at most one completed task.
    ///
    /// Takes one wakeup byte and fires the callbacks of one completed
    /// future on the calling thread, returning true if one was dispatched.
    /// Never blocks: with no byte pending this is a no-op. After `close`
    /// there is nothing left to dispatch and it always returns false.
    pub fn poll(&mut self) -> bool {
        let Some(reader) = self.wakeup_rx.as_ref() else {
            return false;
        };
        match reader.try_take() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                log::error!("wakeup read failed: {}", err);
                return false;
            }
        }
        match self.completion_rx.try_recv() {
            Ok(future) => {
                future.notify();
                true
            }
            Err(_) => {
                // Workers publish the completion before the byte, so this
                // does not happen in normal operation.
                log::warn!("wakeup byte with no pending completion");
                false
            }
        }
    }

    /// Shut the pool down and flush every outstanding completion.
    ///
    /// Queues one shutdown item per worker behind any pending tasks, joins
    /// every worker, and notifies every future still sitting on the
    /// completion channel, so no completion is lost. Idempotent: the second
    /// and later calls return immediately. Dropping the executor closes it
    /// the same way.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("executor closing; stopping {} workers", self.workers.len());

        for _ in 0..self.workers.len() {
            if self.work_tx.send(WorkItem::Shutdown).is_err() {
                break;
            }
        }
        let mut flushed = 0usize;
        let workers = std::mem::take(&mut self.workers);
        for worker in workers {
            worker.join();
            // Flush a completion that raced this worker's exit.
            if self.poll() {
                flushed += 1;
            }
        }
        while let Ok(future) = self.completion_rx.try_recv() {
            future.notify();
            flushed += 1;
        }
        if flushed > 0 {
            log::warn!("close flushed {} completions that were never polled", flushed);
        }
        // Drops the read end; the worker exits dropped the write end.
        self.wakeup_rx = None;
        log::info!("executor closed");
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.close();
    }
}
