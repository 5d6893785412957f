//! Serial execution context for session work.
//!
//! A `SessionQueue` owns its context (the capture session and the inputs
//! attached to it) on one dedicated worker thread. Jobs run one at a time in
//! submission order, so configuration brackets never interleave and start/stop
//! stay ordered relative to the configuration submitted before them.

use crate::errors::{EngineError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

type Job<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

enum Message<C> {
    Run(Job<C>),
    Shutdown,
}

pub struct SessionQueue<C: Send + 'static> {
    label: String,
    sender: Sender<Message<C>>,
    worker: Mutex<Option<JoinHandle<C>>>,
    worker_id: ThreadId,
    /// Held for reading while a job is sent and for writing while closing,
    /// so no job can be queued behind `Message::Shutdown`.
    closed: RwLock<bool>,
}

impl<C: Send + 'static> SessionQueue<C> {
    /// Spawn the worker thread, named after `label`, and hand it `context`.
    pub fn new(label: impl Into<String>, context: C) -> Result<Self> {
        let label = label.into();
        let (sender, receiver) = crossbeam_channel::unbounded();

        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || run_worker(context, receiver))?;
        let worker_id = handle.thread().id();

        log::debug!("Session queue '{}' started", label);

        Ok(Self {
            label,
            sender,
            worker: Mutex::new(Some(handle)),
            worker_id,
            closed: RwLock::new(false),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the calling thread is this queue's worker.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue `job` and return immediately.
    pub fn dispatch<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let closed = self.closed.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *closed {
            return Err(EngineError::QueueClosed);
        }
        self.sender
            .send(Message::Run(Box::new(job)))
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Enqueue `job` and block until it has run, returning its value.
    ///
    /// Calling this from the worker itself would deadlock, so it is rejected.
    pub fn dispatch_sync<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Err(EngineError::invalid_argument(format!(
                "dispatch_sync called from inside session queue '{}'",
                self.label
            )));
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        self.dispatch(move |context| {
            let _ = tx.send(job(context));
        })?;
        rx.recv().map_err(|_| EngineError::QueueClosed)
    }

    /// Stop accepting work, let queued jobs drain, and join the worker.
    ///
    /// Returns the context once the worker has exited, or `None` when the
    /// queue was already shut down.
    pub fn shutdown(&self, join_timeout: Duration) -> Result<Option<C>> {
        {
            let mut closed = self.closed.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            if !*closed {
                *closed = true;
                let _ = self.sender.send(Message::Shutdown);
            }
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return Ok(None);
        };

        if self.is_current() {
            // The worker exits on its own once the current job returns.
            return Ok(None);
        }

        let start = Instant::now();
        while !handle.is_finished() {
            if start.elapsed() >= join_timeout {
                // Keep the handle so a later shutdown can retry the join.
                *self
                    .worker
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
                return Err(EngineError::Timeout(format!("session queue '{}'", self.label)));
            }
            thread::sleep(Duration::from_millis(2));
        }

        match handle.join() {
            Ok(context) => {
                log::debug!("Session queue '{}' stopped", self.label);
                Ok(Some(context))
            }
            Err(_) => {
                log::error!("Session queue '{}' worker panicked", self.label);
                Ok(None)
            }
        }
    }
}

impl<C: Send + 'static> Drop for SessionQueue<C> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(Duration::from_millis(100)) {
            log::warn!("Error shutting down session queue in drop: {}", e);
        }
    }
}

fn run_worker<C>(mut context: C, receiver: Receiver<Message<C>>) -> C {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => {
                if panic::catch_unwind(AssertUnwindSafe(|| job(&mut context))).is_err() {
                    log::error!("Session job panicked; continuing with the next job");
                }
            }
            Message::Shutdown => {
                let dropped = receiver.try_iter().count();
                if dropped > 0 {
                    log::warn!("Session queue dropped {} job(s) queued after shutdown", dropped);
                }
                break;
            }
        }
    }
    context
}
