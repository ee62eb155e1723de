//! Completion handles for submitted tasks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TaskError;
use crate::task::Task;

/// Lifecycle of a submitted task as seen through its future.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// On the work channel, not yet picked up by a worker.
    Queued,
    /// Picked up by a worker and currently executing.
    Running,
    /// Finished with a result or an error.
    Completed,
    /// Cancelled before a worker completed it.
    Cancelled,
}

type DoneCallback<T> = Box<dyn FnOnce(&TaskFuture<T>) + Send + 'static>;

struct FutureState<T> {
    task: Option<Task<T>>,
    completed: bool,
    cancelled: bool,
    notified: bool,
    result: Option<T>,
    error: Option<TaskError>,
    callbacks: Vec<DoneCallback<T>>,
}

/// Handle to the eventual outcome of a submitted task.
///
/// Handles are cheap to clone and all clones observe the same state. The
/// worker that runs the task is the only writer of the terminal fields;
/// once [`done`](TaskFuture::done) reports true they never change again.
/// Exactly one of result and error is set after completion, or neither if
/// the future was cancelled first.
pub struct TaskFuture<T> {
    state: Arc<Mutex<FutureState<T>>>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> TaskFuture<T> {
    pub(crate) fn new(task: Task<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FutureState {
                task: Some(task),
                completed: false,
                cancelled: false,
                notified: false,
                result: None,
                error: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Run the task on the calling (worker) thread and record its outcome.
    ///
    /// Skips the operation entirely if the future was cancelled before any
    /// worker reached it. The terminal fields are written at most once; a
    /// cancellation that won the race keeps them unset.
    pub(crate) fn execute(&self) {
        let task = {
            let mut state = self.state.lock().expect("future state mutex poisoned");
            if state.completed {
                return;
            }
            match state.task.take() {
                Some(task) => task,
                None => return,
            }
        };

        let label = task.label().map(str::to_string);
        let outcome = task.run();

        let mut state = self.state.lock().expect("future state mutex poisoned");
        if state.completed {
            // A cancel raced with execution and won; the cancelled future
            // keeps neither result nor error.
            return;
        }
        match outcome {
            Ok(value) => state.result = Some(value),
            Err(err) => {
                match &label {
                    Some(label) => log::debug!("task '{}' failed: {}", label, err),
                    None => log::debug!("task failed: {}", err),
                }
                state.error = Some(err);
            }
        }
        state.completed = true;
    }

    /// Fire the registered callbacks, once.
    ///
    /// The first call delivers every callback registered so far, in
    /// registration order, passing this future; later calls do nothing. A
    /// panicking callback is logged and does not stop delivery to the
    /// remaining ones.
    pub(crate) fn notify(&self) {
        let callbacks = {
            let mut state = self.state.lock().expect("future state mutex poisoned");
            if state.notified {
                return;
            }
            state.notified = true;
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(self))).is_err() {
                log::warn!("task completion callback panicked");
            }
        }
    }

    /// Cancel the task if no worker has completed it yet.
    ///
    /// Returns true if the cancellation won; the future then reports done
    /// and cancelled, holds neither result nor error, and its callbacks fire
    /// on this thread before the call returns. Returns false when the task
    /// already completed. A worker mid-operation is not interrupted; its
    /// outcome is discarded.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.state.lock().expect("future state mutex poisoned");
            if state.completed {
                return false;
            }
            state.cancelled = true;
            state.completed = true;
            // Drop the closure so a queued task releases what it captured.
            state.task = None;
        }
        self.notify();
        true
    }

    /// Non-blocking peek at the result.
    ///
    /// Only `Duration::ZERO` is supported; the pool has no blocking waits
    /// and any other timeout is a caller bug. Returns `None` until the task
    /// completes, and always `None` for cancelled or failed tasks.
    pub fn result(&self, timeout: Duration) -> Option<T>
    where
        T: Clone,
    {
        if !timeout.is_zero() {
            unimplemented!("blocking waits on task futures are not supported");
        }
        let state = self.state.lock().expect("future state mutex poisoned");
        state.result.clone()
    }

    /// Non-blocking peek at the error. Same timeout contract as
    /// [`result`](TaskFuture::result).
    pub fn error(&self, timeout: Duration) -> Option<TaskError> {
        if !timeout.is_zero() {
            unimplemented!("blocking waits on task futures are not supported");
        }
        let state = self.state.lock().expect("future state mutex poisoned");
        state.error.clone()
    }

    /// True once the task completed or was cancelled.
    pub fn done(&self) -> bool {
        self.state.lock().expect("future state mutex poisoned").completed
    }

    /// True if the future was cancelled before completion.
    pub fn cancelled(&self) -> bool {
        self.state.lock().expect("future state mutex poisoned").cancelled
    }

    pub fn status(&self) -> TaskStatus {
        let state = self.state.lock().expect("future state mutex poisoned");
        if state.cancelled {
            TaskStatus::Cancelled
        } else if state.completed {
            TaskStatus::Completed
        } else if state.task.is_some() {
            TaskStatus::Queued
        } else {
            TaskStatus::Running
        }
    }

    /// Register a completion callback.
    ///
    /// If the future is already done the callback runs synchronously on the
    /// calling thread, right now. Otherwise it runs exactly once after
    /// completion, in registration order, on the thread driving
    /// [`Executor::poll`](crate::Executor::poll) or the one that cancelled.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&TaskFuture<T>) + Send + 'static,
    {
        let mut state = self.state.lock().expect("future state mutex poisoned");
        if state.completed {
            drop(state);
            callback(self);
        } else {
            state.callbacks.push(Box::new(callback));
        }
    }
}

/// Crate-internal view of a future as it moves through the pool: the worker
/// executes it, the poll side notifies it. Erases the result type so one
/// pool serves futures of any output type.
pub(crate) trait WorkFuture: Send {
    fn execute(&self);
    fn notify(&self);
}

impl<T: Send + 'static> WorkFuture for TaskFuture<T> {
    fn execute(&self) {
        TaskFuture::execute(self);
    }

    fn notify(&self) {
        TaskFuture::notify(self);
    }
}
