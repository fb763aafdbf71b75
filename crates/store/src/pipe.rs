use std::path::Path;

use async_trait::async_trait;
use normalizer::{Record, RecordKind};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::{Result, StoreError};

/// Write-only sink for normalized records.
#[async_trait]
pub trait Pipe: Send + Sync {
    async fn write(&self, record: Record) -> Result<()>;
    async fn flush(&self) -> Result<()>;

    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}

/// Keeps every record in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPipe {
    records: Mutex<Vec<Record>>,
    flushes: Mutex<usize>,
}

impl MemoryPipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }

    pub async fn count(&self, kind: RecordKind) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.kind() == kind)
            .count()
    }

    pub async fn flush_count(&self) -> usize {
        *self.flushes.lock().await
    }
}

#[async_trait]
impl Pipe for MemoryPipe {
    async fn write(&self, record: Record) -> Result<()> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        *self.flushes.lock().await += 1;
        Ok(())
    }
}

type BoxedWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Writes one JSON object per line to a file or stdout.
pub struct JsonLinesPipe {
    writer: Mutex<Option<BoxedWriter>>,
}

impl JsonLinesPipe {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(Some(BufWriter::new(writer))),
        }
    }

    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        debug!(path = %path.display(), "writing records as json lines");
        Ok(Self::new(Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }
}

#[async_trait]
impl Pipe for JsonLinesPipe {
    async fn write(&self, record: Record) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(StoreError::Closed)?;
        writer.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(StoreError::Closed)?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
