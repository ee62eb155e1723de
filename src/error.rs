//! Error values delivered through task futures.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

/// Failure of a task's blocking operation.
///
/// Captured by the worker that ran the operation and delivered through the
/// future on the same path as a successful result. A failing operation never
/// unwinds into its worker thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// The operation returned an error.
    Failed(String),
    /// The operation panicked; the payload message is preserved.
    Panicked(String),
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Failed(message) => f.write_str(message),
            TaskError::Panicked(message) => write!(f, "task panicked: {}", message),
        }
    }
}

impl Error for TaskError {}

impl From<io::Error> for TaskError {
    fn from(err: io::Error) -> Self {
        TaskError::Failed(err.to_string())
    }
}
