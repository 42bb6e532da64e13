//! Worker state, outcomes and retry policy.

use std::fmt;
use std::time::Duration;

/// Tunables of a worker's pass loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPolicy {
    /// Failed passes in a row after which the worker gives up.
    pub max_consecutive_failures: u32,
    /// Backoff unit; the n-th failure in a row waits `base * 2^n`.
    pub backoff_base: Duration,
    /// Upper bound of a single backoff wait.
    pub backoff_cap: Duration,
    /// Pause after each successful forward.
    pub pacing_delay: Duration,
}

impl Default for WorkerPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            backoff_base: Duration::from_secs(10),
            backoff_cap: Duration::from_secs(300),
            pacing_delay: Duration::from_millis(100),
        }
    }
}

impl WorkerPolicy {
    /// Backoff after `consecutive_failures` failed passes in a row.
    #[must_use]
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(consecutive_failures);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }
}

/// Lifecycle phase of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerPhase {
    #[default]
    Starting,
    Authenticating,
    Running,
    Stopping,
    Failed,
    Terminated,
}

/// What to do after a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

/// Mutable state owned by exactly one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerState {
    /// Whole-pass failures in a row; reset by any completed pass.
    pub consecutive_failures: u32,
    /// Number of passes attempted so far.
    pub loop_iteration: u64,
    pub phase: WorkerPhase,
}

impl WorkerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed pass.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Records a failed pass and decides whether to try again.
    pub fn record_failure(&mut self, policy: &WorkerPolicy) -> RetryDecision {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= policy.max_consecutive_failures {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(policy.backoff_delay(self.consecutive_failures))
        }
    }
}

/// Why a worker exited without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    ForwardingDisabled,
    NoTargets,
}

/// Why a worker failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The client could not be opened.
    Startup(String),
    /// The stored session is not signed in.
    Unauthorized,
    /// The session expired, was revoked, or needs a 2FA password.
    Authentication(String),
    /// Whole passes kept failing.
    TooManyFailures { attempts: u32, last_error: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup(e) => write!(f, "could not open client: {e}"),
            Self::Unauthorized => f.write_str("session is not authorized"),
            Self::Authentication(e) => write!(f, "authentication error: {e}"),
            Self::TooManyFailures {
                attempts,
                last_error,
            } => write!(f, "{attempts} failed passes in a row, last: {last_error}"),
        }
    }
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Nothing to do for this account.
    Idle(IdleReason),
    /// Cancelled by the supervisor.
    Stopped,
    Failed(FailureReason),
}

impl WorkerOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Final result of a worker task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub outcome: WorkerOutcome,
    pub state: WorkerState,
}
