use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Keeps the first error recorded; later ones are logged and dropped.
#[derive(Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<anyhow::Error>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `err` became the stored error.
    pub fn record(&self, err: anyhow::Error) -> bool {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!(error = %err, "dropping error after the first");
            return false;
        }
        *slot = Some(err);
        true
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn take(&self) -> Option<anyhow::Error> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn into_result(self) -> Result<()> {
        match self.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

type Task = BoxFuture<'static, Result<()>>;

/// A fixed set of workers draining a shared task queue. Submission never
/// blocks; tasks run in whichever worker frees up first.
pub struct AsyncPool {
    sender: mpsc::UnboundedSender<Task>,
    workers: Vec<JoinHandle<()>>,
    errors: ErrorSlot,
}

impl AsyncPool {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Task>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let errors = ErrorSlot::new();

        let workers = (0..concurrency)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let errors = errors.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(task) = next else {
                            break;
                        };
                        match AssertUnwindSafe(task).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                errors.record(err);
                            }
                            Err(_) => {
                                warn!(worker, "pool task panicked");
                                errors.record(anyhow!("pool task panicked"));
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            sender,
            workers,
            errors,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.workers.len()
    }

    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.sender.send(task.boxed()).is_err() {
            self.errors
                .record(anyhow!("async pool has no running workers"));
        }
    }

    /// Closes submission, waits for every submitted task, and returns the
    /// first error any of them produced.
    pub async fn wait(self) -> Result<()> {
        let AsyncPool {
            sender,
            workers,
            errors,
        } = self;
        drop(sender);
        for worker in workers {
            if let Err(err) = worker.await {
                errors.record(anyhow!("pool worker failed: {err}"));
            }
        }
        errors.into_result()
    }
}
