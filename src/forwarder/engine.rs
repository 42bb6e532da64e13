//! One forwarding pass over an account's targets.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::wait::wait_or_cancel;
use crate::targets::{TargetParseError, parse_target};
use crate::telegram::{FailureClass, MessagingClient, SelfMessage, TelegramError};

/// Characters of the forwarded message shown in logs.
const PREVIEW_LEN: usize = 50;

/// Per-target counters of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub success: usize,
    pub failed: usize,
}

impl PassOutcome {
    #[must_use]
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

#[derive(Debug, Error)]
enum TargetError {
    #[error(transparent)]
    Parse(#[from] TargetParseError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

/// Forwards the newest Saved Messages entry to a list of targets.
#[derive(Debug, Clone)]
pub struct ForwardingEngine {
    pacing_delay: Duration,
}

impl ForwardingEngine {
    #[must_use]
    pub const fn new(pacing_delay: Duration) -> Self {
        Self { pacing_delay }
    }

    /// Runs one pass.
    ///
    /// Targets are handled strictly in order, one at a time. A failing
    /// target is counted and skipped; only the initial fetch of the message
    /// can fail the pass as a whole. Whenever it returns `Ok`,
    /// `success + failed == targets.len()`.
    pub async fn run_pass<C: MessagingClient>(
        &self,
        client: &C,
        targets: &[String],
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, TelegramError> {
        debug!("Fetching latest message from Saved Messages...");

        let Some(message) = client.fetch_last_self_message().await? else {
            warn!("No messages found in Saved Messages");
            return Ok(PassOutcome {
                success: 0,
                failed: targets.len(),
            });
        };

        info!(
            targets = targets.len(),
            "Forwarding \"{}\"",
            message.preview(PREVIEW_LEN)
        );

        let mut outcome = PassOutcome::default();

        for (position, raw) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                let skipped = targets.len() - position;
                debug!(skipped, "Pass cancelled, skipping remaining targets");
                outcome.failed += skipped;
                break;
            }

            let index = position + 1;
            match self.forward_one(client, &message, raw).await {
                Ok(()) => {
                    outcome.success += 1;
                    debug!("[{index}] Forwarded to {raw}");
                    if index < targets.len() {
                        wait_or_cancel(cancel, self.pacing_delay).await;
                    }
                }
                Err(err) => {
                    outcome.failed += 1;
                    self.handle_failure(index, raw, &err, cancel).await;
                }
            }
        }

        Ok(outcome)
    }

    async fn forward_one<C: MessagingClient>(
        &self,
        client: &C,
        message: &SelfMessage,
        raw: &str,
    ) -> Result<(), TargetError> {
        let target = parse_target(raw)?;
        let peer = client.resolve_target(&target).await?;
        client.forward(message, &peer, target.topic_id).await?;
        Ok(())
    }

    async fn handle_failure(
        &self,
        index: usize,
        raw: &str,
        err: &TargetError,
        cancel: &CancellationToken,
    ) {
        let telegram = match err {
            TargetError::Parse(e) => {
                warn!("[{index}] Invalid target {raw}: {e}");
                return;
            }
            TargetError::Telegram(e) => e,
        };

        match telegram.class() {
            FailureClass::RateLimited(seconds) => {
                warn!("[{index}] Flood wait for {raw}, waiting {seconds}s");
                let wait = Duration::from_secs(u64::from(seconds) + 1);
                wait_or_cancel(cancel, wait).await;
            }
            FailureClass::AccessDenied => {
                warn!("[{index}] Access denied for {raw}: {telegram}");
            }
            FailureClass::FatalAuth | FailureClass::Other => {
                warn!("[{index}] Failed to forward to {raw}: {telegram}");
            }
        }
    }
}

impl Default for ForwardingEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
