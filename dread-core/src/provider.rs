//! Text-generation provider seam.
//!
//! The orchestrator depends only on this shape: an ordered list of
//! role-tagged messages in, text out (whole or streamed). Vendor clients
//! live outside this crate and implement [`Provider`].

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a provider can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("{0}")]
    Other(String),
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Metadata returned alongside a complete response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
}

/// A complete, non-streamed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
    pub metadata: ResponseMetadata,
}

impl ProviderResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Incremental text chunks. The stream ends on success; an `Err` item ends
/// the call with that failure.
pub type ChunkStream = BoxStream<'static, Result<String, ProviderError>>;

/// A text-generation capability.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Request a complete response.
    async fn send(&self, messages: &[ChatMessage]) -> Result<ProviderResponse, ProviderError>;

    /// Request a streamed response.
    ///
    /// The default performs [`send`](Provider::send) and yields the whole
    /// text as a single chunk.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, ProviderError> {
        let response = self.send(messages).await?;
        Ok(Box::pin(stream::once(async move { Ok(response.text) })))
    }

    /// Short name for logs.
    fn name(&self) -> &str {
        "provider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        async fn send(&self, messages: &[ChatMessage]) -> Result<ProviderResponse, ProviderError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ProviderResponse::new(last))
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_single_chunk() {
        let provider = Echo;
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hello")];
        let chunks: Vec<_> = provider.stream(&messages).await.unwrap().collect().await;
        assert_eq!(chunks, vec![Ok("hello".to_string())]);
        assert_eq!(provider.name(), "provider");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
