//! Upstream event stream → OpenAI chat-completion translation
//!
//! The upstream body is newline-delimited `data: {json}` records. Each record
//! decodes into zero or more events:
//!
//! - `{"error": ..}` (truthy) → `Error`, nothing else from that record
//! - `{"content": "text"}` (non-empty) → `Content`
//! - `{"cost": ..}` (key present, any value) → `Cost`, after any `Content`
//!
//! A `Cost` marks the end of the turn: the serving account's balance is
//! re-probed and persisted. Streaming mode stops at the first `Cost` or
//! `Error`; the collector reads to the end of the body.
//!
//! Both modes run on a spawned task so a caller disconnect never abandons
//! the upstream read or the balance refresh halfway.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use freeplay_client::Account;
use freeplay_pool::{EPSILON, Pool};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::openai::{ChunkFactory, DONE_FRAME, error_frame};

/// Frames buffered between the translator task and the response body
const CHANNEL_CAPACITY: usize = 64;

/// One decoded upstream signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Error(String),
    Content(String),
    Cost(f64),
}

/// Splits a byte stream into trimmed lines.
///
/// Splits on `\n` before decoding so a multi-byte character cut across two
/// reads is reassembled. A trailing partial line stays buffered until more
/// bytes arrive or `finish` is called.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Feed bytes, returning every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        lines
    }

    /// Flush the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Decode one trimmed line into events.
///
/// Lines without the `data:` prefix, the `[DONE]` marker and malformed JSON
/// all yield nothing.
pub fn parse_record(line: &str) -> Vec<Event> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Vec::new();
    };
    let payload = payload.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return Vec::new();
    }

    let record: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "skipping malformed upstream record");
            return Vec::new();
        }
    };

    if let Some(error) = record.get("error").filter(|e| is_truthy(e)) {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return vec![Event::Error(message)];
    }

    let mut events = Vec::new();
    if let Some(text) = record.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        events.push(Event::Content(text.to_string()));
    }
    if let Some(cost) = record.get("cost") {
        events.push(Event::Cost(cost.as_f64().unwrap_or(0.0)));
    }
    events
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// What a translation run needs to know about the turn it serves.
#[derive(Clone)]
pub struct Turn {
    pub pool: Arc<Pool>,
    pub account: Account,
    pub chunks: ChunkFactory,
}

impl Turn {
    /// End-of-turn bookkeeping: re-probe the account and persist.
    async fn settle(&self, cost: f64) {
        info!(account = %self.account.email, cost, "turn finished, refreshing balance");
        self.pool.refresh_balance(&self.account).await;
        self.pool.persist().await;
        if let Some(balance) = self.pool.balance_of(&self.account).await
            && balance <= EPSILON
        {
            info!(
                account = %self.account.email,
                balance,
                "balance exhausted, next request will rotate"
            );
        }
    }
}

/// Translate an upstream body into SSE frames on a spawned task.
///
/// The receiver yields complete `data: ...\n\n` frames. Send failures (the
/// caller went away) are ignored so the task still reaches the end of turn.
pub fn spawn_stream<S, E>(body: S, turn: Turn) -> mpsc::Receiver<String>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let emit = |frame: String| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(frame).await;
            }
        };

        emit(turn.chunks.role()).await;

        let mut body = std::pin::pin!(body);
        let mut decoder = LineDecoder::default();
        let mut finished = false;

        'read: while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(account = %turn.account.email, error = %e, "upstream stream read failed");
                    emit(error_frame(&format!("stream read error: {e}"), "internal_error")).await;
                    break 'read;
                }
            };
            for line in decoder.push(&bytes) {
                if stream_line(&line, &turn, &emit).await {
                    finished = true;
                    break 'read;
                }
            }
        }

        if !finished {
            if let Some(line) = decoder.finish()
                && stream_line(&line, &turn, &emit).await
            {
                return;
            }
            debug!(account = %turn.account.email, "upstream ended without cost record");
            emit(turn.chunks.stop()).await;
            emit(DONE_FRAME.to_string()).await;
        }
    });
    rx
}

/// Emit the frames for one line. Returns true once the stream is complete.
async fn stream_line<F, Fut>(line: &str, turn: &Turn, emit: &F) -> bool
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    for event in parse_record(line) {
        match event {
            Event::Error(message) => {
                warn!(account = %turn.account.email, error = %message, "upstream reported error");
                emit(error_frame(&message, "api_error")).await;
                return true;
            }
            Event::Content(text) => emit(turn.chunks.content(&text)).await,
            Event::Cost(cost) => {
                turn.settle(cost).await;
                emit(turn.chunks.stop()).await;
                emit(DONE_FRAME.to_string()).await;
                return true;
            }
        }
    }
    false
}

/// Response body over the translator's frames.
pub fn body_stream(mut rx: mpsc::Receiver<String>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok(Bytes::from(frame));
        }
    }
}

/// Frames for a stream that failed before any upstream bytes were read.
pub fn failed_stream_frames(err: &ApiError, chunks: &ChunkFactory) -> Vec<String> {
    vec![
        error_frame(&err.to_string(), err.error_type()),
        chunks.stop(),
        DONE_FRAME.to_string(),
    ]
}

/// Read the whole upstream body into one completion object.
///
/// Content fragments are concatenated; the balance refresh happens once
/// after the body ends, and only if a cost record was seen.
pub async fn collect<S, E>(body: S, turn: Turn) -> Result<Value, ApiError>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut body = std::pin::pin!(body);
        let mut decoder = LineDecoder::default();
        let mut content = String::new();
        let mut cost = None;

        let mut apply = |line: String| -> Result<(), ApiError> {
            for event in parse_record(&line) {
                match event {
                    Event::Error(message) => return Err(ApiError::Upstream(message)),
                    Event::Content(text) => content.push_str(&text),
                    Event::Cost(c) => cost = Some(c),
                }
            }
            Ok(())
        };

        while let Some(next) = body.next().await {
            let bytes = next.map_err(|e| ApiError::Internal(format!("stream read error: {e}")))?;
            for line in decoder.push(&bytes) {
                apply(line)?;
            }
        }
        if let Some(line) = decoder.finish() {
            apply(line)?;
        }

        if let Some(cost) = cost {
            turn.settle(cost).await;
        } else {
            debug!(account = %turn.account.email, "upstream ended without cost record");
        }
        Ok::<_, ApiError>(turn.chunks.completion(content))
    });

    task.await
        .map_err(|e| ApiError::Internal(format!("completion task failed: {e}")))?
}
