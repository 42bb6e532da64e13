//! Per-account forwarding worker.
//!
//! The worker follows a simple state machine:
//! 1. Idle gate: forwarding disabled or no targets → exit without error
//! 2. Starting: open the account's client (failure → Failed, no retry)
//! 3. Authenticating: the stored session must already be signed in
//! 4. Running: pass, report, wait `delay - elapsed`, repeat
//!    - fatal auth errors → Failed immediately
//!    - other failed passes → exponential backoff, Failed at the ceiling
//! 5. Shutdown: the client is always closed once it was opened
//!
//! Every wait races the worker's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::engine::ForwardingEngine;
use super::state::{
    FailureReason, IdleReason, RetryDecision, WorkerExit, WorkerOutcome, WorkerPhase,
    WorkerPolicy, WorkerState,
};
use super::wait::wait_or_cancel;
use crate::config::AccountConfig;
use crate::report::{Alert, Reporter, RunSummary};
use crate::telegram::{ClientFactory, MessagingClient, TelegramError, mask_phone};

/// Background task driving the pass loop of one account.
pub struct AccountWorker<F: ClientFactory> {
    config: AccountConfig,
    factory: Arc<F>,
    reporter: Reporter,
    policy: WorkerPolicy,
    engine: ForwardingEngine,
    cancel: CancellationToken,
    state: WorkerState,
}

impl<F: ClientFactory> AccountWorker<F> {
    #[must_use]
    pub fn new(
        config: AccountConfig,
        factory: Arc<F>,
        reporter: Reporter,
        policy: WorkerPolicy,
        cancel: CancellationToken,
    ) -> Self {
        let engine = ForwardingEngine::new(policy.pacing_delay);
        Self {
            config,
            factory,
            reporter,
            policy,
            engine,
            cancel,
            state: WorkerState::new(),
        }
    }

    /// Runs the worker until it is cancelled, idles out or fails.
    pub async fn run(mut self) -> WorkerExit {
        let span = info_span!("worker", account = %mask_phone(&self.config.account_key));
        let outcome = self.run_inner().instrument(span).await;
        WorkerExit {
            outcome,
            state: self.state,
        }
    }

    async fn run_inner(&mut self) -> WorkerOutcome {
        if !self.config.forwarding_enabled {
            debug!("Auto forwarding is off, worker not started");
            self.state.phase = WorkerPhase::Terminated;
            return WorkerOutcome::Idle(IdleReason::ForwardingDisabled);
        }
        if self.config.targets.is_empty() {
            debug!("No targets configured, worker not started");
            self.state.phase = WorkerPhase::Terminated;
            return WorkerOutcome::Idle(IdleReason::NoTargets);
        }

        self.state.phase = WorkerPhase::Starting;
        let opened = tokio::select! {
            () = self.cancel.cancelled() => None,
            result = self.factory.open(&self.config.credentials, &self.config.account_key) => Some(result),
        };

        let client = match opened {
            None => {
                self.state.phase = WorkerPhase::Terminated;
                return WorkerOutcome::Stopped;
            }
            Some(Err(e)) => {
                error!(error = %e, "Failed to open client");
                self.reporter
                    .alert(&Alert::startup(&self.config.account_key, &e.to_string()))
                    .await;
                self.state.phase = WorkerPhase::Terminated;
                return WorkerOutcome::Failed(FailureReason::Startup(e.to_string()));
            }
            Some(Ok(client)) => client,
        };

        let outcome = self.drive(&client).await;

        self.state.phase = if outcome.is_failure() {
            WorkerPhase::Failed
        } else {
            WorkerPhase::Stopping
        };
        debug!("Disconnecting client...");
        client.close().await;
        self.state.phase = WorkerPhase::Terminated;

        outcome
    }

    async fn drive(&mut self, client: &F::Client) -> WorkerOutcome {
        self.state.phase = WorkerPhase::Authenticating;
        match client.is_authorized().await {
            Ok(true) => {}
            Ok(false) => {
                error!("Session is not authorized, run the login command for this account");
                self.reporter
                    .alert(&Alert::authentication(
                        &self.config.account_key,
                        "session is not authorized",
                    ))
                    .await;
                return WorkerOutcome::Failed(FailureReason::Unauthorized);
            }
            Err(e) if e.is_fatal() => return self.fail_authentication(&e).await,
            Err(e) => {
                error!(error = %e, "Failed to check authorization");
                self.reporter
                    .alert(&Alert::startup(&self.config.account_key, &e.to_string()))
                    .await;
                return WorkerOutcome::Failed(FailureReason::Startup(e.to_string()));
            }
        }

        self.state.phase = WorkerPhase::Running;
        let delay = Duration::from_secs(self.config.effective_delay_secs());
        info!(
            targets = self.config.targets.len(),
            delay_secs = delay.as_secs(),
            "Worker started"
        );

        loop {
            if self.cancel.is_cancelled() {
                return WorkerOutcome::Stopped;
            }

            self.state.loop_iteration += 1;
            let started = Instant::now();

            match self
                .engine
                .run_pass(client, &self.config.targets, &self.cancel)
                .await
            {
                Ok(pass) => {
                    if self.cancel.is_cancelled() {
                        debug!(success = pass.success, "Pass interrupted, not reported");
                        return WorkerOutcome::Stopped;
                    }

                    let elapsed = started.elapsed();
                    info!(
                        iteration = self.state.loop_iteration,
                        success = pass.success,
                        failed = pass.failed,
                        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "Pass finished"
                    );

                    let summary = RunSummary::now(
                        &self.config.account_key,
                        self.config.targets.len(),
                        pass.success,
                        pass.failed,
                    );
                    self.reporter
                        .run_summary(&summary, self.config.log_channel)
                        .await;

                    self.state.record_success();

                    let wait = delay.saturating_sub(elapsed);
                    if wait_or_cancel(&self.cancel, wait).await.is_cancelled() {
                        return WorkerOutcome::Stopped;
                    }
                }
                Err(e) if e.is_fatal() => return self.fail_authentication(&e).await,
                Err(e) => match self.state.record_failure(&self.policy) {
                    RetryDecision::GiveUp => {
                        let attempts = self.state.consecutive_failures;
                        error!(attempts, error = %e, "Too many consecutive errors, stopping worker");
                        self.reporter
                            .alert(&Alert::too_many_failures(
                                &self.config.account_key,
                                attempts,
                                &e.to_string(),
                            ))
                            .await;
                        return WorkerOutcome::Failed(FailureReason::TooManyFailures {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                    RetryDecision::Retry(backoff) => {
                        warn!(
                            attempt = self.state.consecutive_failures,
                            max = self.policy.max_consecutive_failures,
                            error = %e,
                            "Pass failed, retrying in {}s",
                            backoff.as_secs()
                        );
                        if wait_or_cancel(&self.cancel, backoff).await.is_cancelled() {
                            return WorkerOutcome::Stopped;
                        }
                    }
                },
            }
        }
    }

    async fn fail_authentication(&self, err: &TelegramError) -> WorkerOutcome {
        error!(error = %err, "Authentication error");
        self.reporter
            .alert(&Alert::authentication(
                &self.config.account_key,
                &err.to_string(),
            ))
            .await;
        WorkerOutcome::Failed(FailureReason::Authentication(err.to_string()))
    }
}

impl<F: ClientFactory> std::fmt::Debug for AccountWorker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountWorker")
            .field("account", &mask_phone(&self.config.account_key))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
