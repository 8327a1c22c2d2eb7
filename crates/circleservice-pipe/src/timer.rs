//! Sleep/backoff abstraction for the pipe state machine.
//!
//! The pipe never calls `tokio::time::sleep` directly; it goes through
//! [`SleepTimer`] so tests can substitute a deterministic timer and step
//! the reconnect/keepalive schedule without waiting wall-clock time.

use std::time::Duration;

use async_trait::async_trait;

/// Asynchronous sleep used for reconnect backoff and the keepalive
/// schedule.
#[async_trait]
pub trait SleepTimer: Send + Sync {
    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Production timer backed by the tokio clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleepTimer;

#[async_trait]
impl SleepTimer for TokioSleepTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
