//! Testing utilities.
//!
//! This module provides deterministic stand-ins for the external
//! collaborators:
//! - `ScriptedProvider` replays scripted replies without any network access
//! - `RecordingPresenter` captures everything a session shows

use crate::provider::{ChatMessage, ChunkStream, Provider, ProviderError, ProviderResponse};
use crate::session::Presenter;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{self, Instant};
use typewriter::TypewriterState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One scripted provider call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream `chunks`, waiting `interval` before each one.
    Chunks { chunks: Vec<String>, interval: Duration },
    /// Fail the call before any output.
    Fail(ProviderError),
    /// Stream `chunks`, then fail.
    FailAfter { chunks: Vec<String>, error: ProviderError },
    /// Never produce anything.
    Stall,
    /// Wait `delay`, then reply with `text` in one chunk.
    Delayed { delay: Duration, text: String },
}

impl Reply {
    /// Reply immediately with the whole text.
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Chunks {
            chunks: vec![text.into()],
            interval: Duration::ZERO,
        }
    }

    pub fn chunks<I, S>(chunks: I, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::Chunks {
            chunks: chunks.into_iter().map(Into::into).collect(),
            interval,
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Reply::Fail(ProviderError::Network(message.into()))
    }

    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        Reply::Delayed {
            delay,
            text: text.into(),
        }
    }
}

/// A provider that replays scripted replies in order.
///
/// Once the script runs out every call gets the fallback reply.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: Reply::Fail(ProviderError::Other("no scripted reply".to_string())),
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    /// Add a reply to the end of the script.
    pub fn queue(&self, reply: Reply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// When each call started.
    pub fn call_times(&self) -> Vec<Instant> {
        lock(&self.calls).clone()
    }

    /// Messages received by each call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.requests).clone()
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> Reply {
        lock(&self.calls).push(Instant::now());
        lock(&self.requests).push(messages.to_vec());
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn send(&self, messages: &[ChatMessage]) -> Result<ProviderResponse, ProviderError> {
        match self.next_reply(messages) {
            Reply::Chunks { chunks, interval } => {
                for _ in &chunks {
                    time::sleep(interval).await;
                }
                Ok(ProviderResponse::new(chunks.concat()))
            }
            Reply::Fail(error) | Reply::FailAfter { error, .. } => Err(error),
            Reply::Stall => std::future::pending().await,
            Reply::Delayed { delay, text } => {
                time::sleep(delay).await;
                Ok(ProviderResponse::new(text))
            }
        }
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, ProviderError> {
        let stream: ChunkStream = match self.next_reply(messages) {
            Reply::Chunks { chunks, interval } => stream::iter(chunks)
                .then(move |chunk| async move {
                    time::sleep(interval).await;
                    Ok(chunk)
                })
                .boxed(),
            Reply::Fail(error) => return Err(error),
            Reply::FailAfter { chunks, error } => stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::once(async move { Err(error) }))
                .boxed(),
            Reply::Stall => stream::pending().boxed(),
            Reply::Delayed { delay, text } => stream::once(async move {
                time::sleep(delay).await;
                Ok(text)
            })
            .boxed(),
        };
        Ok(stream)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Everything a [`RecordingPresenter`] has been shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recording {
    /// Characters since the last discard.
    pub shown: String,
    pub completions: Vec<TypewriterState>,
    pub discards: usize,
}

/// A presenter that records characters, completions and discards.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    recording: Mutex<Recording>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording(&self) -> Recording {
        lock(&self.recording).clone()
    }

    pub fn shown(&self) -> String {
        lock(&self.recording).shown.clone()
    }
}

impl Presenter for RecordingPresenter {
    fn on_char(&self, c: char) {
        lock(&self.recording).shown.push(c);
    }

    fn on_complete(&self, state: TypewriterState) {
        lock(&self.recording).completions.push(state);
    }

    fn on_discard(&self) {
        let mut recording = lock(&self.recording);
        recording.shown.clear();
        recording.discards += 1;
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that the gaps between consecutive calls match `expected` within
/// `tolerance`.
#[track_caller]
pub fn assert_call_gaps(provider: &ScriptedProvider, expected: &[Duration], tolerance: Duration) {
    let times = provider.call_times();
    assert_eq!(
        times.len(),
        expected.len() + 1,
        "Expected {} calls, got {}",
        expected.len() + 1,
        times.len()
    );
    for (i, (pair, want)) in times.windows(2).zip(expected).enumerate() {
        let gap = pair[1] - pair[0];
        assert!(
            gap + tolerance >= *want && gap <= *want + tolerance,
            "Gap before call {} was {gap:?}, expected {want:?}",
            i + 1
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_script_then_fallback() {
        let provider = ScriptedProvider::new(vec![Reply::chunks(["a", "b"], Duration::from_millis(10))]);
        let chunks: Vec<_> = provider.stream(&[]).await.unwrap().collect().await;
        assert_eq!(chunks, vec![Ok("a".to_string()), Ok("b".to_string())]);

        let err = provider.stream(&[]).await.err();
        assert_eq!(err, Some(ProviderError::Other("no scripted reply".into())));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_after_yields_error_last() {
        let provider = ScriptedProvider::new(vec![Reply::FailAfter {
            chunks: vec!["partial".into()],
            error: ProviderError::Network("reset".into()),
        }]);
        let items: Vec<_> = provider.stream(&[]).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_concatenates_chunks() {
        let provider = ScriptedProvider::new(vec![Reply::chunks(["x", "y"], Duration::ZERO)]);
        let response = provider.send(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(response.text, "xy");
        assert_eq!(provider.requests()[0][0].content, "hi");
    }

    #[test]
    fn test_recording_presenter_discard_clears_text() {
        let presenter = RecordingPresenter::new();
        presenter.on_char('a');
        presenter.on_discard();
        presenter.on_char('b');
        presenter.on_complete(TypewriterState::Done);
        let recording = presenter.recording();
        assert_eq!(recording.shown, "b");
        assert_eq!(recording.discards, 1);
        assert_eq!(recording.completions, vec![TypewriterState::Done]);
    }
}
