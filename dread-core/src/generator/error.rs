//! Generation errors.

use super::cancel::CancelReason;
use crate::provider::ProviderError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`StoryGenerator`](super::StoryGenerator).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("No provider configured")]
    NoProvider,

    #[error("No output within {0:?} of the request")]
    FirstChunkTimeout(Duration),

    #[error("Attempt exceeded its {0:?} deadline")]
    AttemptDeadline(Duration),

    #[error("Provider returned no text")]
    EmptyResponse,

    #[error("Provider error: {0}")]
    Provider(#[source] ProviderError),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<GenerateError>,
    },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Generation deadline exceeded")]
    DeadlineExceeded,
}

impl GenerateError {
    /// Whether the retry policy may try again after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerateError::FirstChunkTimeout(_)
                | GenerateError::AttemptDeadline(_)
                | GenerateError::EmptyResponse
                | GenerateError::Provider(_)
        )
    }

    /// Whether the caller's own cancellation signal ended the call.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GenerateError::Cancelled | GenerateError::DeadlineExceeded)
    }

    /// The underlying failure, looking through retry exhaustion.
    pub fn root_cause(&self) -> &GenerateError {
        match self {
            GenerateError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<ProviderError> for GenerateError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => GenerateError::Cancelled,
            ProviderError::DeadlineExceeded => GenerateError::DeadlineExceeded,
            other => GenerateError::Provider(other),
        }
    }
}

impl From<CancelReason> for GenerateError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => GenerateError::Cancelled,
            CancelReason::DeadlineExceeded => GenerateError::DeadlineExceeded,
        }
    }
}
