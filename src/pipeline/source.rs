//! Message source abstraction for sensor data ingestion.
//!
//! Sources yield decoded [`Message`]s one at a time. Lines that fail to
//! decode are logged and skipped so a single bad record never stops a stream.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::types::Message;

/// Events produced by a message source.
#[derive(Debug)]
pub enum MessageEvent {
    /// A decoded sensor message.
    Message(Message),
    /// No more data.
    Eof,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot read replay file {}: {source}", path.display())]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where sensor messages come from.
///
/// The processing loop calls [`MessageSource::next_message`] inside a
/// `select!` with cancellation, so implementations must be cancel-safe at
/// message boundaries.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Read the next message. Returns `MessageEvent::Eof` when exhausted and
    /// `Err` only on unrecoverable read errors.
    async fn next_message(&mut self) -> Result<MessageEvent, SourceError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;

    /// Lines skipped because they did not decode.
    fn malformed_lines(&self) -> u64 {
        0
    }
}

/// Why a single input line was skipped.
#[derive(Debug, Error)]
enum LineError {
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one raw line. `None` for blank lines.
fn decode_line(raw: &[u8]) -> Option<Result<Message, LineError>> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => return Some(Err(e.into())),
    };
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str::<Message>(line).map_err(LineError::from))
}

// ============================================================================
// JSON Lines Source (stdin / any async reader)
// ============================================================================

/// Reads JSON messages, one per line, from an async reader.
///
/// Used with the simulation harness:
/// `simulation | linewatch --stdin`
pub struct JsonLinesSource<R> {
    reader: R,
    name: String,
    line_buffer: Vec<u8>,
    line_number: u64,
    malformed: u64,
}

impl JsonLinesSource<tokio::io::BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line_buffer: Vec::with_capacity(1024),
            line_number: 0,
            malformed: 0,
        }
    }
}

#[async_trait]
impl<R> MessageSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_message(&mut self) -> Result<MessageEvent, SourceError> {
        loop {
            self.line_buffer.clear();
            // Raw bytes, so one corrupt line is skipped instead of failing the read
            let bytes = self.reader.read_until(b'\n', &mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(MessageEvent::Eof);
            }
            self.line_number += 1;
            match decode_line(&self.line_buffer) {
                None => continue,
                Some(Ok(msg)) => return Ok(MessageEvent::Message(msg)),
                Some(Err(e)) => {
                    self.malformed += 1;
                    warn!(source = %self.name, line = self.line_number, "Skipping malformed message: {}", e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    fn malformed_lines(&self) -> u64 {
        self.malformed
    }
}

// ============================================================================
// Replay Source (pre-loaded file)
// ============================================================================

/// Replays pre-loaded messages with optional inter-message delay.
pub struct ReplaySource {
    messages: std::vec::IntoIter<Message>,
    delay_ms: u64,
    yielded_first: bool,
    malformed: u64,
}

impl ReplaySource {
    pub fn new(messages: Vec<Message>, delay_ms: u64) -> Self {
        Self {
            messages: messages.into_iter(),
            delay_ms,
            yielded_first: false,
            malformed: 0,
        }
    }

    /// Load a JSON-lines file into memory. Malformed lines are skipped.
    pub fn from_file(path: &Path, delay_ms: u64) -> Result<Self, SourceError> {
        let content = std::fs::read(path).map_err(|source| SourceError::Replay {
            path: path.to_path_buf(),
            source,
        })?;
        let (messages, malformed) = parse_json_bytes(&content);
        info!(
            file = %path.display(),
            messages = messages.len(),
            malformed,
            "Loaded replay file"
        );
        let mut source = Self::new(messages, delay_ms);
        source.malformed = malformed;
        Ok(source)
    }
}

/// Decode every line of `content`. Returns the messages and the number of
/// lines that failed to decode.
pub fn parse_json_lines(content: &str) -> (Vec<Message>, u64) {
    parse_json_bytes(content.as_bytes())
}

/// Like [`parse_json_lines`] for raw bytes. Lines that are not valid UTF-8
/// count as malformed.
pub fn parse_json_bytes(content: &[u8]) -> (Vec<Message>, u64) {
    let mut messages = Vec::new();
    let mut malformed = 0;
    for (index, line) in content.split(|&b| b == b'\n').enumerate() {
        match decode_line(line) {
            None => {}
            Some(Ok(msg)) => messages.push(msg),
            Some(Err(e)) => {
                malformed += 1;
                warn!(line = index + 1, "Skipping malformed message: {}", e);
            }
        }
    }
    (messages, malformed)
}

#[async_trait]
impl MessageSource for ReplaySource {
    async fn next_message(&mut self) -> Result<MessageEvent, SourceError> {
        // No delay before the first message
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.messages.next() {
            Some(msg) => {
                self.yielded_first = true;
                Ok(MessageEvent::Message(msg))
            }
            None => Ok(MessageEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }

    fn malformed_lines(&self) -> u64 {
        self.malformed
    }
}
