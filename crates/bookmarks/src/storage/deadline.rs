//! Per-request deadlines and cancellation for store operations

use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, DropGuard};

use super::IndexError;

/// Deadline threaded through every store operation
///
/// Carries an optional expiry instant and a cancellation token. Clones share
/// the token, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    token: CancellationToken,
}

impl Deadline {
    /// A deadline that never expires (startup, tests, maintenance)
    pub fn none() -> Self {
        Self::default()
    }

    /// A deadline expiring `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            token: CancellationToken::new(),
        }
    }

    /// Cancel this deadline and all of its clones
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the operation should stop now
    pub fn is_expired(&self) -> bool {
        self.is_cancelled() || self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry; `None` means unbounded
    pub fn remaining(&self) -> Option<Duration> {
        if self.is_cancelled() {
            return Some(Duration::ZERO);
        }
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail with [`IndexError::DeadlineExceeded`] once expired or cancelled
    pub fn check(&self) -> Result<(), IndexError> {
        if self.is_expired() {
            Err(IndexError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Guard that cancels the deadline when dropped
    ///
    /// Hold it in the future serving a request: if the client goes away and the
    /// future is dropped, blocking work still running against the deadline stops
    /// at its next checkpoint.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}
