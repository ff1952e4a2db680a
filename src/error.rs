//! Server Error Taxonomy
//!
//! One aggregator error type for everything outside the deterministic `game/`
//! module (which never returns `Result` — invalid input there is silently
//! rejected at the validation boundary instead). Transport, matchmaking, and
//! persistence code converges on [`ServerError`].

use std::time::Duration;

use thiserror::Error;

use crate::network::auth::AuthError;

/// Malformed or out-of-protocol client input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message didn't parse against the wire schema.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// Message arrived in a state that doesn't accept it (e.g. `Input` before `Authenticate`).
    #[error("unexpected message for current session state")]
    UnexpectedMessage,
    /// Client is on an unsupported protocol version.
    #[error("unsupported client version")]
    VersionMismatch,
}

/// A value failed domain validation before it could affect state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Movement or fire input failed [`crate::game::input`] validation.
    #[error("input rejected: {0:?}")]
    Input(crate::game::input::InputRejection),
    /// Requested match mode or parameters are not supported.
    #[error("invalid matchmaking request: {0}")]
    Matchmaking(String),
}

/// A resource limit was hit; the caller should back off rather than retry immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceExhausted {
    /// Session exceeded its input or fire rate limit.
    #[error("rate limit exceeded")]
    RateLimited,
    /// Server is at its connection or match capacity.
    #[error("server at capacity")]
    Overloaded,
    /// Outbound queue for a session is full and the session missed its degraded grace window.
    #[error("outbound queue saturated")]
    QueueSaturated,
}

/// A lookup failed to find the requested entity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    /// No session with this id.
    #[error("session not found")]
    Session,
    /// No match with this id.
    #[error("match not found")]
    Match,
    /// No user with this id.
    #[error("user not found")]
    User,
}

/// A failure that is expected to be transient and worth retrying with backoff.
#[derive(Debug, Error, Clone)]
pub enum TransientError {
    /// The backing store (repository or ephemeral KV) did not respond in time.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// The auth provider could not be reached.
    #[error("auth provider unavailable")]
    AuthUnavailable,
}

/// A failure serious enough that the caller should not retry and should surface it.
#[derive(Debug, Error, Clone)]
pub enum FatalError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
    /// An invariant the server depends on was violated.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// The server-wide error type. Every fallible operation outside `game/`
/// eventually converges here.
#[derive(Debug, Error, Clone)]
pub enum ServerError {
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Malformed or out-of-sequence protocol message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A resource limit was exceeded.
    #[error(transparent)]
    ResourceExhausted(#[from] ResourceExhausted),
    /// Entity lookup failed.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    /// Likely transient; retry with backoff.
    #[error(transparent)]
    Transient(#[from] TransientError),
    /// Not retryable.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Retry policy for [`TransientError`]s: exponential backoff starting at
/// `base`, doubling each attempt, capped at `max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied to the delay after each attempt.
    pub factor: u32,
    /// Total attempts including the first, non-retried one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base: Duration::from_millis(100), factor: 2, max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Delay before the attempt numbered `attempt` (0-indexed, 0 = first retry).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base * self.factor.saturating_pow(attempt)
    }

    /// Run `op`, retrying on [`TransientError`] up to `max_attempts` times with
    /// backoff between attempts. Any other error, or exhausting attempts,
    /// returns immediately.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T, ServerError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServerError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(ServerError::Transient(e)) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(ServerError::Transient(e));
                    }
                    tokio::time::sleep(self.delay_for(attempt - 1)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn retry_delay_doubles_each_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy { base: Duration::from_millis(1), factor: 1, max_attempts: 3 };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), ServerError> = policy
            .retry(|| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ServerError::Transient(TransientError::AuthUnavailable))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_immediately_on_non_transient_error() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), ServerError> = policy
            .retry(|| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ServerError::NotFound(NotFoundError::Match))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
