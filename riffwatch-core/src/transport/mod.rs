//! Telemetry transports
//!
//! A transport yields one raw payload per [`TelemetryTransport::fetch`] call
//! or a [`TransportError`]. Two strategies sit behind the same trait:
//!
//! | Strategy | Module | Connection |
//! |----------|--------|------------|
//! | Stateless request | [`http`] | fresh GET per fetch, own timeout per call |
//! | Persistent socket | [`socket`] | connect once, newline-delimited JSON frames |
//!
//! Both share the bounded connect loop in [`connect_with_retry`]: at most
//! `max_retries` attempts, sleeping `base * 2^attempt` (capped) between them.
//! Every fetch is bounded by the configured timeouts, so the polling loop
//! never blocks indefinitely.

pub mod http;
pub mod socket;

use std::future::Future;
use std::time::Duration;

use crate::config::{TelemetryConfig, TransportMode};
use crate::error::{Result, TransportError};

pub use http::HttpTransport;
pub use socket::SocketTransport;

/// Raw bytes of one telemetry payload, not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(Vec<u8>);

impl RawPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Connection lifecycle of a transport.
///
/// `Disconnected → Connecting → Connected → (Faulted → Disconnected)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

/// Source of raw telemetry payloads.
pub trait TelemetryTransport: Send {
    /// Fetch the next payload.
    ///
    /// Connects first when disconnected. A dead connection is dropped before
    /// returning, so the next call starts from a fresh connect.
    fn fetch(&mut self) -> impl Future<Output = std::result::Result<RawPayload, TransportError>> + Send;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Release any held connection
    fn close(&mut self);

    /// Human-readable endpoint description for logs
    fn describe(&self) -> String;
}

/// Bounded exponential backoff for connect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay slept after failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

/// Outcome of a single failed connect attempt.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Counts toward the retry budget
    Retryable(String),
    /// Stop retrying and surface this error
    Fatal(TransportError),
}

/// Run `attempt` until it succeeds, fails fatally, or the budget is spent.
///
/// Exhausting the budget yields [`TransportError::Unreachable`].
pub(crate) async fn connect_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    mut attempt: F,
) -> std::result::Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    for n in 0..policy.max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Retryable(reason)) => {
                tracing::debug!(
                    target_addr = %target,
                    attempt = n + 1,
                    max_attempts = policy.max_attempts,
                    reason = %reason,
                    "Telemetry connect attempt failed"
                );
                if n + 1 < policy.max_attempts {
                    let delay = policy.delay_for(n);
                    tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    tracing::warn!(
        target_addr = %target,
        attempts = policy.max_attempts,
        "Telemetry source unreachable"
    );
    Err(TransportError::Unreachable {
        attempts: policy.max_attempts,
    })
}

/// Connection state holder that logs every transition.
#[derive(Debug)]
pub(crate) struct StateTracker {
    state: ConnectionState,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::info!(from = ?self.state, to = ?next, "Telemetry connection state changed");
            self.state = next;
        }
    }
}

/// Transport selected at runtime from [`TelemetryConfig::mode`].
pub enum Transport {
    Http(HttpTransport),
    Socket(SocketTransport),
}

impl Transport {
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        match config.mode {
            TransportMode::Http => Ok(Transport::Http(HttpTransport::new(config)?)),
            TransportMode::Socket => Ok(Transport::Socket(SocketTransport::new(config))),
        }
    }
}

impl TelemetryTransport for Transport {
    async fn fetch(&mut self) -> std::result::Result<RawPayload, TransportError> {
        match self {
            Transport::Http(t) => t.fetch().await,
            Transport::Socket(t) => t.fetch().await,
        }
    }

    fn state(&self) -> ConnectionState {
        match self {
            Transport::Http(t) => t.state(),
            Transport::Socket(t) => t.state(),
        }
    }

    fn close(&mut self) {
        match self {
            Transport::Http(t) => t.close(),
            Transport::Socket(t) => t.close(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Transport::Http(t) => t.describe(),
            Transport::Socket(t) => t.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
        // huge exponents saturate instead of overflowing
        assert_eq!(policy.delay_for(64), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_unreachable() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            connect_with_retry(&fast_policy(5), "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::Retryable("refused".to_string())) }
            })
            .await;

        assert_eq!(result, Err(TransportError::Unreachable { attempts: 5 }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let result = connect_with_retry(&fast_policy(5), "test", |n| async move {
            if n < 2 {
                Err(AttemptError::Retryable("not yet".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_retrying() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            connect_with_retry(&fast_policy(5), "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AttemptError::Fatal(TransportError::ConnectionLost(
                        "HTTP 500".to_string(),
                    )))
                }
            })
            .await;

        assert!(matches!(result, Err(TransportError::ConnectionLost(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_tracker_starts_disconnected() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.get(), ConnectionState::Disconnected);
        tracker.set(ConnectionState::Connecting);
        assert_eq!(tracker.get(), ConnectionState::Connecting);
    }

    #[test]
    fn test_transport_from_config_selects_mode() {
        let mut config = TelemetryConfig::default();
        config.mode = TransportMode::Socket;
        let transport = Transport::from_config(&config).unwrap();
        assert!(matches!(transport, Transport::Socket(_)));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }
}
