//! Pool worker threads and the items they consume.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::future::WorkFuture;
use crate::wakeup::WakeupWriter;

/// One entry on the work channel.
///
/// `Shutdown` terminates exactly one worker. The executor enqueues one per
/// worker when closing, behind anything still pending, so queued tasks run
/// before the pool winds down.
pub(crate) enum WorkItem {
    Run(Box<dyn WorkFuture>),
    Shutdown,
}

/// A pool worker thread.
pub(crate) struct Worker {
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker bound to the shared channels and the wakeup writer.
    pub(crate) fn spawn(
        name: String,
        work_rx: Receiver<WorkItem>,
        completion_tx: Sender<Box<dyn WorkFuture>>,
        wakeup: Arc<WakeupWriter>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new().name(name).spawn(move || {
            run_worker_loop(work_rx, completion_tx, wakeup);
        })?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the worker to stop.
    pub(crate) fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker_loop(
    work_rx: Receiver<WorkItem>,
    completion_tx: Sender<Box<dyn WorkFuture>>,
    wakeup: Arc<WakeupWriter>,
) {
    log::debug!("worker started");
    for item in work_rx.iter() {
        match item {
            WorkItem::Shutdown => {
                log::debug!("worker received shutdown");
                break;
            }
            WorkItem::Run(future) => {
                // Strict order: run, publish the completion, then signal.
                // The reader must never observe a wakeup byte for a
                // completion that is not yet on the channel.
                future.execute();
                if completion_tx.send(future).is_err() {
                    log::warn!("completion channel closed; worker exiting");
                    break;
                }
                wakeup.notify();
            }
        }
    }
    log::debug!("worker stopped");
}
