use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use normalizer::{Record, RecordKind};
use store::Pipe;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::async_pool::ErrorSlot;
use crate::metrics::RECORDS_WRITTEN_TOTAL;

/// Destination for converted records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&self, record: Record) -> Result<()>;
}

/// Routes records to one unbounded channel per kind. Producers never wait on
/// the pipe; each kind has its own drain task writing in arrival order.
pub struct Emitter {
    senders: RwLock<Option<HashMap<RecordKind, mpsc::UnboundedSender<Record>>>>,
}

pub struct Drains {
    handles: Vec<(RecordKind, JoinHandle<Result<usize>>)>,
}

impl Emitter {
    pub fn spawn(pipe: Arc<dyn Pipe>) -> (Self, Drains) {
        let mut senders = HashMap::new();
        let mut handles = Vec::new();
        for kind in RecordKind::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(kind, tx);
            handles.push((kind, tokio::spawn(drain(kind, rx, Arc::clone(&pipe)))));
        }
        (
            Self {
                senders: RwLock::new(Some(senders)),
            },
            Drains { handles },
        )
    }

    /// Stops accepting records so the drains can finish once their queues are
    /// empty.
    pub async fn close(&self) {
        self.senders.write().await.take();
    }
}

#[async_trait]
impl RecordSink for Emitter {
    async fn emit(&self, record: Record) -> Result<()> {
        let kind = record.kind();
        let senders = self.senders.read().await;
        let sender = senders
            .as_ref()
            .and_then(|senders| senders.get(&kind))
            .ok_or_else(|| anyhow!("emitter closed before {} record", kind.as_str()))?;
        sender
            .send(record)
            .map_err(|_| anyhow!("{} drain stopped", kind.as_str()))
    }
}

async fn drain(
    kind: RecordKind,
    mut rx: mpsc::UnboundedReceiver<Record>,
    pipe: Arc<dyn Pipe>,
) -> Result<usize> {
    let mut written = 0usize;
    while let Some(record) = rx.recv().await {
        pipe.write(record)
            .await
            .with_context(|| format!("writing {} record", kind.as_str()))?;
        RECORDS_WRITTEN_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        written += 1;
    }
    debug!(kind = kind.as_str(), count = written, "finished sending records");
    Ok(written)
}

impl Drains {
    /// Waits for every drain. Call after [`Emitter::close`].
    pub async fn finish(self) -> Result<BTreeMap<RecordKind, usize>> {
        let errors = ErrorSlot::new();
        let mut written = BTreeMap::new();
        for (kind, handle) in self.handles {
            match handle.await {
                Ok(Ok(count)) => {
                    written.insert(kind, count);
                }
                Ok(Err(err)) => {
                    errors.record(err);
                }
                Err(err) => {
                    errors.record(anyhow!("{} drain failed: {err}", kind.as_str()));
                }
            }
        }
        errors.into_result()?;
        Ok(written)
    }
}

/// Writes straight through to the pipe and counts what it wrote.
pub struct DirectSink {
    pipe: Arc<dyn Pipe>,
    written: AtomicUsize,
}

impl DirectSink {
    pub fn new(pipe: Arc<dyn Pipe>) -> Self {
        Self {
            pipe,
            written: AtomicUsize::new(0),
        }
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for DirectSink {
    async fn emit(&self, record: Record) -> Result<()> {
        let kind = record.kind();
        self.pipe
            .write(record)
            .await
            .with_context(|| format!("writing {} record", kind.as_str()))?;
        RECORDS_WRITTEN_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
