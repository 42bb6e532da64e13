//! Interruptible waits.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How an interruptible wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Elapsed,
    Cancelled,
}

impl WaitResult {
    #[must_use]
    pub fn is_cancelled(self) -> bool {
        self == Self::Cancelled
    }
}

/// Sleeps for `duration` unless `cancel` fires first.
///
/// An already cancelled token returns immediately, even for a zero duration.
pub async fn wait_or_cancel(cancel: &CancellationToken, duration: Duration) -> WaitResult {
    if cancel.is_cancelled() {
        return WaitResult::Cancelled;
    }
    if duration.is_zero() {
        return WaitResult::Elapsed;
    }

    tokio::select! {
        () = cancel.cancelled() => WaitResult::Cancelled,
        () = tokio::time::sleep(duration) => WaitResult::Elapsed,
    }
}
