//! Record sinks: where analytics records are persisted.
//!
//! The engine hands every record to exactly one [`RecordSink`]. Text sinks
//! buffer up to `batch_size` records before writing. The sled sink stores
//! each record kind in its own tree, keyed by identity then timestamp, so a
//! prefix scan returns one signal's history in chronological order.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::line_protocol;
use crate::config::{SinkConfig, SinkFormat};
use crate::types::{AnalyticsRecord, SignalIdentity};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("sink configuration error: {0}")]
    Config(String),
}

/// Destination of analytics records.
#[async_trait]
pub trait RecordSink: Send + 'static {
    async fn write(&mut self, record: &AnalyticsRecord) -> Result<(), SinkError>;

    /// Persist anything buffered.
    async fn flush(&mut self) -> Result<(), SinkError>;

    fn sink_name(&self) -> &str;
}

#[async_trait]
impl RecordSink for Box<dyn RecordSink> {
    async fn write(&mut self, record: &AnalyticsRecord) -> Result<(), SinkError> {
        (**self).write(record).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush().await
    }

    fn sink_name(&self) -> &str {
        (**self).sink_name()
    }
}

/// Open the sink described by `config`. An empty path means stdout for the
/// text formats.
pub async fn open_sink(config: &SinkConfig) -> Result<Box<dyn RecordSink>, SinkError> {
    let batch_size = config.batch_size.max(1);
    let sink: Box<dyn RecordSink> = match config.format {
        SinkFormat::Sled => {
            if config.path.is_empty() {
                return Err(SinkError::Config("sled sink requires a path".to_string()));
            }
            Box::new(SledSink::open(&config.path, batch_size)?)
        }
        SinkFormat::JsonLines => open_text_sink(&config.path, TextFormat::JsonLines, batch_size).await?,
        SinkFormat::LineProtocol => {
            open_text_sink(&config.path, TextFormat::LineProtocol, batch_size).await?
        }
    };
    info!(sink = sink.sink_name(), path = %config.path, batch_size, "Record sink opened");
    Ok(sink)
}

async fn open_text_sink(
    path: &str,
    format: TextFormat,
    batch_size: usize,
) -> Result<Box<dyn RecordSink>, SinkError> {
    if path.is_empty() {
        return Ok(Box::new(WriterSink::new(tokio::io::stdout(), format, batch_size)));
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(Box::new(WriterSink::new(file, format, batch_size)))
}

// ============================================================================
// Text sinks (JSON lines / line protocol)
// ============================================================================

/// Encoding used by [`WriterSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    JsonLines,
    LineProtocol,
}

/// Writes one encoded record per line to any async writer.
pub struct WriterSink<W> {
    writer: W,
    format: TextFormat,
    buffer: Vec<u8>,
    pending: usize,
    batch_size: usize,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W, format: TextFormat, batch_size: usize) -> Self {
        Self {
            writer,
            format,
            buffer: Vec::with_capacity(4096),
            pending: 0,
            batch_size: batch_size.max(1),
        }
    }

    /// Records encoded but not yet written.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Give back the writer. Unflushed records are lost.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> RecordSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&mut self, record: &AnalyticsRecord) -> Result<(), SinkError> {
        match self.format {
            TextFormat::JsonLines => serde_json::to_writer(&mut self.buffer, record)?,
            TextFormat::LineProtocol => self
                .buffer
                .extend_from_slice(line_protocol::encode(record).as_bytes()),
        }
        self.buffer.push(b'\n');
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
            self.pending = 0;
        }
        self.writer.flush().await?;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        match self.format {
            TextFormat::JsonLines => "json_lines",
            TextFormat::LineProtocol => "line_protocol",
        }
    }
}

// ============================================================================
// Sled sink
// ============================================================================

/// Key of a record: `line/machine/signal/` followed by the timestamp and a
/// write sequence number, both big-endian. Keys of one identity sort
/// chronologically, and records sharing a timestamp keep their write order
/// instead of replacing each other.
pub fn record_key(identity: &SignalIdentity, timestamp_millis: u64, sequence: u64) -> Vec<u8> {
    let prefix = identity_prefix(identity);
    let mut key = Vec::with_capacity(prefix.len() + 16);
    key.extend_from_slice(&prefix);
    key.extend_from_slice(&timestamp_millis.to_be_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

/// Common prefix of every key of `identity`.
pub fn identity_prefix(identity: &SignalIdentity) -> Vec<u8> {
    let mut prefix = identity.storage_key().into_bytes();
    prefix.push(b'/');
    prefix
}

/// Stores records in a sled database, one tree per record kind.
///
/// Writes are batched per tree and applied on `flush` or when `batch_size`
/// records are pending. sled flushes to disk in the background; `flush`
/// also forces a durable write.
pub struct SledSink {
    db: sled::Db,
    batches: HashMap<&'static str, sled::Batch>,
    pending: usize,
    batch_size: usize,
}

impl SledSink {
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self, SinkError> {
        let db = sled::open(path)?;
        Ok(Self::with_db(db, batch_size))
    }

    pub fn with_db(db: sled::Db, batch_size: usize) -> Self {
        Self {
            db,
            batches: HashMap::new(),
            pending: 0,
            batch_size: batch_size.max(1),
        }
    }

    /// Handle to the underlying database.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Stored records of one kind and identity, oldest first.
    pub fn history(
        &self,
        kind: &str,
        identity: &SignalIdentity,
    ) -> Result<Vec<AnalyticsRecord>, SinkError> {
        let tree = self.db.open_tree(kind)?;
        let mut records = Vec::new();
        for entry in tree.scan_prefix(identity_prefix(identity)) {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn apply_batches(&mut self) -> Result<(), SinkError> {
        for (kind, batch) in self.batches.drain() {
            self.db.open_tree(kind)?.apply_batch(batch)?;
        }
        debug!(records = self.pending, "Applied sled batches");
        self.pending = 0;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for SledSink {
    async fn write(&mut self, record: &AnalyticsRecord) -> Result<(), SinkError> {
        // Monotonic across restarts of the same database
        let sequence = self.db.generate_id()?;
        let key = record_key(record.identity(), record.timestamp_millis(), sequence);
        let value = serde_json::to_vec(record)?;
        self.batches
            .entry(record.kind())
            .or_default()
            .insert(key, value);
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.apply_batches()?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.apply_batches()?;
        self.db.flush()?;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "sled"
    }
}

// ============================================================================
// Memory sink
// ============================================================================

/// Keeps every record in memory. For tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<AnalyticsRecord>,
    pub flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write(&mut self, record: &AnalyticsRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateRecord;

    fn state(ts: u64, value: i64) -> AnalyticsRecord {
        AnalyticsRecord::State(StateRecord {
            identity: SignalIdentity::new("L1", "Oven", "door"),
            value,
            timestamp_millis: ts,
        })
    }

    #[tokio::test]
    async fn test_writer_sink_batches() {
        let mut sink = WriterSink::new(Vec::new(), TextFormat::JsonLines, 2);
        sink.write(&state(1, 0)).await.unwrap();
        assert_eq!(sink.pending(), 1);
        sink.write(&state(2, 1)).await.unwrap();
        assert_eq!(sink.pending(), 0);
        sink.write(&state(3, 0)).await.unwrap();
        sink.flush().await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: AnalyticsRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, state(1, 0));
    }

    #[tokio::test]
    async fn test_line_protocol_sink() {
        let mut sink = WriterSink::new(Vec::new(), TextFormat::LineProtocol, 10);
        sink.write(&state(7, 2)).await.unwrap();
        sink.flush().await.unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "GenericState,line=L1,machine=Oven,signal=door value=2i 7\n");
    }

    #[test]
    fn test_keys_sort_by_time_within_identity() {
        let id = SignalIdentity::new("L1", "Oven", "door");
        let early = record_key(&id, 255, 9);
        let late = record_key(&id, 256, 0);
        assert!(early < late);
        assert!(record_key(&id, 256, 0) < record_key(&id, 256, 1));
        assert!(early.starts_with(&identity_prefix(&id)));
    }

    #[tokio::test]
    async fn test_sled_sink_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SledSink::open(dir.path().join("records.db"), 100).unwrap();
        sink.write(&state(20, 1)).await.unwrap();
        sink.write(&state(10, 0)).await.unwrap();
        sink.flush().await.unwrap();

        let id = SignalIdentity::new("L1", "Oven", "door");
        let history = sink.history("state", &id).unwrap();
        assert_eq!(history, vec![state(10, 0), state(20, 1)]);
        assert!(sink.history("decision", &id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sled_sink_keeps_records_with_equal_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let id = SignalIdentity::new("L1", "Oven", "door");
        {
            let mut sink = SledSink::open(&path, 100).unwrap();
            sink.write(&state(10, 0)).await.unwrap();
            sink.write(&state(10, 1)).await.unwrap();
            sink.flush().await.unwrap();
            assert_eq!(sink.history("state", &id).unwrap(), vec![state(10, 0), state(10, 1)]);
        }

        // A second run writing the same timestamp appends as well
        let mut sink = SledSink::open(&path, 100).unwrap();
        sink.write(&state(10, 2)).await.unwrap();
        sink.flush().await.unwrap();
        let history = sink.history("state", &id).unwrap();
        assert_eq!(history, vec![state(10, 0), state(10, 1), state(10, 2)]);
    }
}
