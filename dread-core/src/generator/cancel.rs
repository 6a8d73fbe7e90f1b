//! Caller-side cancellation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};

/// Why a [`CancelToken`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

/// Cloneable cancellation signal with an optional absolute deadline.
///
/// Clones share the same flag; cancelling one cancels all of them.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
            deadline: None,
        }
    }

    /// Token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    /// Same flag, with an absolute deadline.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Reason the token has fired, if it has.
    pub fn check(&self) -> Option<CancelReason> {
        if self.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.flag.subscribe();
        let flagged = async move {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = flagged => CancelReason::Cancelled,
                _ = time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
            None => {
                flagged.await;
                CancelReason::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let remote = token.clone();
        let waiter = tokio::spawn(async move { remote.cancelled().await });

        tokio::task::yield_now().await;
        assert!(token.check().is_none());
        token.cancel();
        assert_eq!(waiter.await.unwrap(), CancelReason::Cancelled);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let token = CancelToken::with_timeout(Duration::from_secs(2));
        let started = Instant::now();
        assert_eq!(token.cancelled().await, CancelReason::DeadlineExceeded);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2010));
        assert_eq!(token.check(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_resolves_immediately() {
        let token = CancelToken::with_timeout(Duration::from_secs(60));
        token.cancel();
        assert_eq!(token.cancelled().await, CancelReason::Cancelled);
    }
}
