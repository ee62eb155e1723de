//! The unit of blocking work handed to the pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::TaskError;

type TaskFn<T> = Box<dyn FnOnce() -> Result<T, TaskError> + Send + 'static>;

/// One unit of blocking work: a closure plus an optional label for log lines.
///
/// The closure captures the operation's arguments and runs exactly once on a
/// worker thread. It may take arbitrarily long and may fail; failures and
/// panics are captured into a [`TaskError`], never propagated into the
/// worker.
pub struct Task<T> {
    func: TaskFn<T>,
    label: Option<String>,
}

impl<T> Task<T> {
    /// Wrap a blocking operation.
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        Self {
            func: Box::new(func),
            label: None,
        }
    }

    /// Wrap a blocking operation, naming it for log output.
    pub fn with_label<F>(label: impl Into<String>, func: F) -> Self
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        Self {
            func: Box::new(func),
            label: Some(label.into()),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Run the operation on the calling thread, capturing panics as errors.
    pub fn run(self) -> Result<T, TaskError> {
        match panic::catch_unwind(AssertUnwindSafe(self.func)) {
            Ok(outcome) => outcome,
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
