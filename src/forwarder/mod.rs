//! Forwarding supervisor module.
//!
//! A [`Supervisor`] polls the account store and keeps one
//! [`AccountWorker`] running per enabled account. Each worker repeatedly
//! runs a [`ForwardingEngine`] pass that forwards the newest Saved Messages
//! entry to the account's targets.

mod engine;
mod state;
mod supervisor;
mod wait;
mod worker;

#[cfg(test)]
mod testing;

pub use engine::{ForwardingEngine, PassOutcome};
pub use state::{
    FailureReason, IdleReason, RetryDecision, WorkerExit, WorkerOutcome, WorkerPhase,
    WorkerPolicy, WorkerState,
};
pub use supervisor::{
    ReconcileReport, Supervisor, SupervisorControl, SupervisorPolicy, SupervisorState,
};
pub use wait::{WaitResult, wait_or_cancel};
pub use worker::AccountWorker;
