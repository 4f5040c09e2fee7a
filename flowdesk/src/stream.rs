//! Streaming run interpreter
//!
//! The backend answers a run with newline-delimited JSON. Bytes are pulled
//! from a [`ChunkSource`], decoded and split into lines by [`LineFramer`], and
//! each complete line is turned into a [`BoardUpdate`] and applied to the
//! [`RunBoard`]. Chunk boundaries carry no meaning: a line or even a UTF-8
//! sequence may be split across any number of chunks.

use crate::api::ApiError;
use crate::board::{BoardUpdate, RunBoard};
use crate::selection::Step;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pull-based source of raw body bytes
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `None` at end of stream
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError>;
}

/// Chunks held in memory, handed out in order
#[derive(Debug, Clone, Default)]
pub struct MemoryChunks {
    chunks: VecDeque<Vec<u8>>,
}

impl MemoryChunks {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }

    /// Split `body` at the given byte offsets
    pub fn split_at(body: &[u8], cuts: &[usize]) -> Self {
        let mut chunks = VecDeque::new();
        let mut start = 0;
        for &cut in cuts {
            let cut = cut.clamp(start, body.len());
            chunks.push_back(body[start..cut].to_vec());
            start = cut;
        }
        chunks.push_back(body[start..].to_vec());
        Self { chunks }
    }
}

#[async_trait]
impl ChunkSource for MemoryChunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        Ok(self.chunks.pop_front())
    }
}

/// One message of the run stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub step: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub final_output: Option<String>,
}

impl StreamEvent {
    /// Board change carried by this message, if any.
    ///
    /// Non-empty errors win over everything else and need no step. Otherwise a step in
    /// 1..=3 is required, and status `started` takes precedence over a chunk,
    /// which takes precedence over status `completed`.
    pub fn into_update(self) -> Option<BoardUpdate> {
        if let Some(error) = self.error.filter(|e| !e.is_empty()) {
            let message = match self.details {
                Some(details) if !details.is_empty() => details,
                _ => error,
            };
            return Some(BoardUpdate::Failed { message });
        }

        if self.status.as_deref() == Some("workflow_completed") {
            return Some(BoardUpdate::WorkflowCompleted {
                run_id: self.run_id,
            });
        }

        let step = Step::from_number(self.step?)?;
        match (self.status.as_deref(), self.chunk) {
            (Some("started"), _) => Some(BoardUpdate::StepStarted(step)),
            (_, Some(text)) if !text.is_empty() => Some(BoardUpdate::Chunk { step, text }),
            (Some("completed"), _) => Some(BoardUpdate::StepCompleted(step)),
            (Some("retrying"), _) => Some(BoardUpdate::StepRetrying {
                step,
                reason: self.reason,
            }),
            _ => None,
        }
    }
}

/// Parse one line; blank lines yield `Ok(None)`
pub fn parse_line(line: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Incremental UTF-8 decoder and newline splitter
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes of a UTF-8 sequence cut off by a chunk boundary
    undecoded: Vec<u8>,
    /// Decoded text after the last newline
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line it completed
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.undecoded.extend_from_slice(bytes);
        self.decode();

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            lines.push(line[..line.len() - 1].to_string());
        }
        lines
    }

    /// Text left over after the final newline
    pub fn finish(mut self) -> Option<String> {
        if !self.undecoded.is_empty() {
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        (!self.buffer.is_empty()).then_some(self.buffer)
    }

    fn decode(&mut self) {
        let mut consumed = 0;
        loop {
            let rest = &self.undecoded[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.undecoded.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + bad;
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.undecoded.drain(..consumed);
    }
}

/// Receives board changes as they are applied
pub trait RunObserver: Send {
    fn on_update(&mut self, _board: &RunBoard, _update: &BoardUpdate) {}

    fn on_malformed_line(&mut self, _line: &str) {}
}

impl RunObserver for () {}

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// End of stream reached
    Finished,
    /// An error message arrived; nothing after it is read
    Failed(String),
    /// The cancellation token fired
    Cancelled,
}

/// Counters for one interpreted stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: usize,
    pub lines: usize,
    pub malformed: usize,
    pub ignored: usize,
}

/// Drains a run stream into a [`RunBoard`]
#[derive(Debug, Default)]
pub struct StreamInterpreter {
    framer: LineFramer,
    stats: StreamStats,
}

impl StreamInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Read `source` until it ends, an error message arrives, or `cancel`
    /// fires.
    pub async fn interpret<S, O>(
        &mut self,
        source: &mut S,
        board: &mut RunBoard,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, ApiError>
    where
        S: ChunkSource + ?Sized,
        O: RunObserver + ?Sized,
    {
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(stats = ?self.stats, "Stream cancelled");
                    return Ok(StreamOutcome::Cancelled);
                }
                chunk = source.next_chunk() => chunk?,
            };

            let Some(bytes) = chunk else { break };
            self.stats.chunks += 1;

            for line in self.framer.push(&bytes) {
                if let Some(outcome) = self.dispatch(&line, board, observer) {
                    return Ok(outcome);
                }
            }
        }

        if let Some(rest) = std::mem::take(&mut self.framer).finish() {
            warn!(len = rest.len(), "Stream ended inside a line, discarding it");
        }
        debug!(stats = ?self.stats, "Stream finished");
        Ok(StreamOutcome::Finished)
    }

    fn dispatch<O: RunObserver + ?Sized>(
        &mut self,
        line: &str,
        board: &mut RunBoard,
        observer: &mut O,
    ) -> Option<StreamOutcome> {
        let event = match parse_line(line) {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, line, "Skipping malformed stream line");
                self.stats.malformed += 1;
                observer.on_malformed_line(line);
                return None;
            }
        };
        self.stats.lines += 1;

        let Some(update) = event.clone().into_update() else {
            debug!(?event, "Ignoring stream message");
            self.stats.ignored += 1;
            return None;
        };

        board.apply(&update);
        observer.on_update(board, &update);

        match update {
            BoardUpdate::Failed { message } => Some(StreamOutcome::Failed(message)),
            _ => None,
        }
    }
}
