//! Thread pool for blocking tasks with poll-friendly completion delivery.
//!
//! The pool bridges blocking work (host-name resolution being the canonical
//! case) into a cooperative, single-threaded event loop that only observes
//! readiness of file descriptors. Workers take tasks from a shared FIFO,
//! run them, park the finished future on a completion channel, and write
//! one byte into a pipe. The loop that owns the [`Executor`] watches the
//! pipe's read end and calls [`Executor::poll`] whenever it turns readable;
//! each call delivers one completion's callbacks on that thread.
//!
//! # Architecture
//!
//! ```text
//! submit() ──► work channel ──► worker ──► completion channel ──► poll()
//!                                 │                                 ▲
//!                                 └── one byte ──► wakeup pipe ─────┘
//! ```
//!
//! The submitting thread never blocks: submission, the readiness fd, and
//! `poll` are all non-blocking by construction. Workers block only while
//! waiting for work.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use pollpool::{Executor, Task};
//!
//! let mut executor = Executor::new(2)?;
//! let future = executor.submit(Task::new(|| Ok(6 * 7)));
//! // Register executor.read_fd() with an event loop; when it turns
//! // readable, drain:
//! while !future.done() {
//!     executor.poll();
//! }
//! assert_eq!(future.result(Duration::ZERO), Some(42));
//! executor.close();
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod error;
pub mod executor;
pub mod future;
pub mod resolve;
pub mod task;
mod wakeup;
mod worker;

pub use crate::error::TaskError;
pub use crate::executor::{Executor, ExecutorConfig};
pub use crate::future::{TaskFuture, TaskStatus};
pub use crate::task::Task;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
