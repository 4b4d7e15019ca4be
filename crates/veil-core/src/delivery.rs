//! Serial completion delivery
//!
//! A [`DeliveryQueue`] runs completion callbacks one at a time, in the order
//! they were queued, on a Tokio task. The task is spawned on first use and
//! respawned on the caller's runtime whenever the previous one has stopped,
//! so every queued callback runs exactly once.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::SendError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a serial delivery task
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl DeliveryQueue {
    /// Create a queue; no task runs until the first delivery
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a callback
    ///
    /// Outside a Tokio runtime the callback runs on the calling thread.
    pub fn deliver<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut job: Job = Box::new(job);
        let mut sender = self.sender.lock();

        if let Some(tx) = sender.as_ref() {
            match tx.send(job) {
                Ok(()) => return,
                Err(SendError(returned)) => {
                    tracing::warn!("Delivery task stopped; restarting");
                    job = returned;
                }
            }
        }
        *sender = None;

        let Ok(handle) = Handle::try_current() else {
            drop(sender);
            run_job(job);
            return;
        };
        let tx = spawn_worker(&handle);
        match tx.send(job) {
            Ok(()) => *sender = Some(tx),
            // Runtime is shutting down and dropped the new task.
            Err(SendError(job)) => {
                drop(sender);
                run_job(job);
            }
        }
    }
}

fn spawn_worker(handle: &Handle) -> mpsc::UnboundedSender<Job> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
    handle.spawn(async move {
        while let Some(job) = receiver.recv().await {
            run_job(job);
        }
        tracing::debug!("Delivery queue closed");
    });
    sender
}

/// Run one callback, containing any panic so later callbacks still run
fn run_job(job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        tracing::error!("Completion callback panicked: {}", panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
