//! Retry protocol and per-attempt streaming supervision.
//!
//! Each attempt spawns one worker task that drives the provider stream and
//! forwards events over a bounded channel. The supervisor drains the channel
//! under the first-chunk and total deadlines and the caller's token. When the
//! supervisor gives up, dropping the worker handle aborts the task, so a late
//! result is discarded rather than leaked.

use super::config::GeneratorConfig;
use super::error::GenerateError;
use super::TurnOptions;
use crate::provider::{ChatMessage, Provider, ProviderError};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

enum AttemptEvent {
    Chunk(String),
    Failed(ProviderError),
    /// The stream ended cleanly. A channel that closes without this means
    /// the worker died.
    Finished,
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Text from the successful attempt and the number of retries it took.
pub(crate) struct RetryOutcome {
    pub text: String,
    pub retries: u32,
}

/// Run attempts until one succeeds, the policy is exhausted, or the caller
/// cancels.
pub(crate) async fn generate_with_retry(
    provider: Arc<dyn Provider>,
    messages: Arc<Vec<ChatMessage>>,
    config: &GeneratorConfig,
    options: &TurnOptions,
) -> Result<RetryOutcome, GenerateError> {
    let attempts = config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = config.backoff_delay(attempt);
            debug!(attempt, ?delay, "backing off before retry");
            tokio::select! {
                biased;
                reason = options.cancel.cancelled() => return Err(reason.into()),
                _ = time::sleep(delay) => {}
            }
        }
        if let Some(reason) = options.cancel.check() {
            return Err(reason.into());
        }

        match stream_attempt(Arc::clone(&provider), Arc::clone(&messages), attempt, config, options).await {
            Ok(text) => {
                return Ok(RetryOutcome {
                    text,
                    retries: attempt,
                })
            }
            Err(err) if err.is_retryable() => {
                warn!(attempt, provider = provider.name(), error = %err, "generation attempt failed");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(GenerateError::RetriesExhausted {
        attempts,
        last: Box::new(last_error.unwrap_or(GenerateError::EmptyResponse)),
    })
}

fn spawn_stream_worker(
    provider: Arc<dyn Provider>,
    messages: Arc<Vec<ChatMessage>>,
    tx: mpsc::Sender<AttemptEvent>,
) -> AbortOnDrop {
    AbortOnDrop(tokio::spawn(async move {
        let mut stream = match provider.stream(&messages).await {
            Ok(stream) => stream,
            Err(err) => {
                let _ = tx.send(AttemptEvent::Failed(err)).await;
                return;
            }
        };

        while let Some(item) = stream.next().await {
            let (event, last) = match item {
                Ok(chunk) => (AttemptEvent::Chunk(chunk), false),
                Err(err) => (AttemptEvent::Failed(err), true),
            };
            if tx.send(event).await.is_err() || last {
                return;
            }
        }
        let _ = tx.send(AttemptEvent::Finished).await;
    }))
}

/// One streamed attempt. Partial text is dropped on any failure.
async fn stream_attempt(
    provider: Arc<dyn Provider>,
    messages: Arc<Vec<ChatMessage>>,
    attempt: u32,
    config: &GeneratorConfig,
    options: &TurnOptions,
) -> Result<String, GenerateError> {
    let (tx, mut rx) = mpsc::channel(config.chunk_buffer.max(1));
    let started = Instant::now();
    let worker = spawn_stream_worker(provider, messages, tx);

    let first_chunk_deadline = started + config.first_chunk_timeout;
    let total_deadline = started + config.total_timeout;
    let mut text = String::new();
    let mut received = false;

    loop {
        let (deadline, expired) = if !received && first_chunk_deadline < total_deadline {
            (
                first_chunk_deadline,
                GenerateError::FirstChunkTimeout(config.first_chunk_timeout),
            )
        } else {
            (total_deadline, GenerateError::AttemptDeadline(config.total_timeout))
        };

        tokio::select! {
            biased;
            reason = options.cancel.cancelled() => return Err(reason.into()),
            event = rx.recv() => match event {
                Some(AttemptEvent::Chunk(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    if !received {
                        received = true;
                        debug!(attempt, latency = ?started.elapsed(), "first chunk received");
                    }
                    if let Some(on_chunk) = &options.on_chunk {
                        on_chunk(attempt, &chunk);
                    }
                    text.push_str(&chunk);
                }
                Some(AttemptEvent::Failed(err)) => return Err(err.into()),
                Some(AttemptEvent::Finished) => break,
                None => {
                    warn!(attempt, "stream worker ended without finishing");
                    return Err(GenerateError::Provider(ProviderError::Other(
                        "stream worker ended unexpectedly".to_string(),
                    )));
                }
            },
            _ = time::sleep_until(deadline) => return Err(expired),
        }
    }

    drop(worker);
    if text.trim().is_empty() {
        return Err(GenerateError::EmptyResponse);
    }
    debug!(attempt, elapsed = ?started.elapsed(), bytes = text.len(), "attempt complete");
    Ok(text)
}
