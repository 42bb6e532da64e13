//! Keeps the set of running workers in line with the account store.
//!
//! Each poll:
//! 1. List accounts; stop workers whose account disappeared
//! 2. For every listed account, fetch its record and (re)start the worker
//!    when the record changed since the worker started, or its task ended
//! 3. Wait for the poll interval or shutdown, whichever comes first
//!
//! A worker that ended on its own (idle or failed) is restarted once
//! `restart_delay` has passed; a task that panicked or was aborted is
//! restarted on the next poll. A failing fetch of one account's record
//! only skips that account for the current poll.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{WorkerExit, WorkerOutcome, WorkerPolicy};
use super::wait::wait_or_cancel;
use super::worker::AccountWorker;
use crate::config::AccountConfig;
use crate::report::{Alert, Reporter};
use crate::store::{AccountStore, StoreError};
use crate::telegram::{ClientFactory, mask_phone};

/// Timing and error limits of the supervisor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorPolicy {
    pub poll_interval: Duration,
    /// Grace period for a single worker being stopped during a poll.
    pub worker_stop_timeout: Duration,
    /// Total grace period for all workers on shutdown.
    pub shutdown_timeout: Duration,
    /// Failed polls in a row after which the supervisor stops itself.
    pub max_consecutive_poll_errors: u32,
    /// How long a worker that ended on its own waits before it is restarted.
    pub restart_delay: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            worker_stop_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            max_consecutive_poll_errors: 10,
            restart_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum WorkerSlot {
    Running(JoinHandle<WorkerExit>),
    Finished {
        outcome: WorkerOutcome,
        at: Instant,
    },
    /// The task panicked or was aborted; its handle is already consumed.
    Crashed,
}

#[derive(Debug)]
struct LiveWorker {
    slot: WorkerSlot,
    cancel: CancellationToken,
    applied: AccountConfig,
}

impl LiveWorker {
    /// Moves a task that already ended out of the `Running` slot.
    ///
    /// The handle is awaited at most once.
    async fn collect(&mut self, key: &str) {
        let WorkerSlot::Running(task) = &mut self.slot else {
            return;
        };
        if !task.is_finished() {
            return;
        }

        let result = task.await;
        self.slot = match result {
            Ok(exit) => {
                match &exit.outcome {
                    WorkerOutcome::Failed(reason) => {
                        warn!(account = %mask_phone(key), "Worker failed: {reason}");
                    }
                    outcome => debug!(account = %mask_phone(key), ?outcome, "Worker finished"),
                }
                WorkerSlot::Finished {
                    outcome: exit.outcome,
                    at: Instant::now(),
                }
            }
            Err(e) => {
                error!(account = %mask_phone(key), error = %e, "Worker task died");
                WorkerSlot::Crashed
            }
        };
    }

    /// Whether the task ended and is due to be started again.
    fn restart_due(&self, restart_delay: Duration) -> bool {
        match &self.slot {
            WorkerSlot::Running(_) => false,
            WorkerSlot::Finished { at, .. } => at.elapsed() >= restart_delay,
            WorkerSlot::Crashed => true,
        }
    }
}

/// Bookkeeping of the workers a supervisor started.
#[derive(Debug, Default)]
pub struct SupervisorState {
    live: HashMap<String, LiveWorker>,
}

impl SupervisorState {
    /// Accounts whose worker task is still running, sorted.
    #[must_use]
    pub fn running_accounts(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .live
            .iter()
            .filter(|(_, w)| matches!(&w.slot, WorkerSlot::Running(task) if !task.is_finished()))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Config the account's current worker was started with.
    #[must_use]
    pub fn applied_config(&self, key: &str) -> Option<&AccountConfig> {
        self.live.get(key).map(|w| &w.applied)
    }

    /// Outcome of a worker that ended on its own and awaits its restart.
    #[must_use]
    pub fn finished_outcome(&self, key: &str) -> Option<&WorkerOutcome> {
        match &self.live.get(key)?.slot {
            WorkerSlot::Finished { outcome, .. } => Some(outcome),
            WorkerSlot::Running(_) | WorkerSlot::Crashed => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Changes made by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

/// Reconciles stored accounts against live workers.
pub struct Supervisor<F: ClientFactory> {
    store: Arc<dyn AccountStore>,
    factory: Arc<F>,
    reporter: Reporter,
    policy: SupervisorPolicy,
    worker_policy: WorkerPolicy,
    state: SupervisorState,
    shutdown: CancellationToken,
}

impl<F: ClientFactory> Supervisor<F> {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, factory: Arc<F>, reporter: Reporter) -> Self {
        Self {
            store,
            factory,
            reporter,
            policy: SupervisorPolicy::default(),
            worker_policy: WorkerPolicy::default(),
            state: SupervisorState::default(),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SupervisorPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_worker_policy(mut self, policy: WorkerPolicy) -> Self {
        self.worker_policy = policy;
        self
    }

    /// Token that stops the supervisor and, through child tokens, every worker.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    #[must_use]
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Runs the poll loop until shutdown or too many failed polls, then
    /// stops every worker.
    pub async fn run(&mut self) {
        info!(
            poll_secs = self.policy.poll_interval.as_secs(),
            "Forwarder supervisor started"
        );

        let mut consecutive_errors = 0u32;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.reconcile().await {
                Ok(report) => {
                    consecutive_errors = 0;
                    if !report.is_empty() {
                        info!(
                            started = report.started.len(),
                            stopped = report.stopped.len(),
                            running = self.state.len(),
                            "Workers reconciled"
                        );
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    error!(
                        attempt = consecutive_errors,
                        max = self.policy.max_consecutive_poll_errors,
                        error = %e,
                        "Reconciliation failed"
                    );
                    if consecutive_errors >= self.policy.max_consecutive_poll_errors {
                        error!("Too many consecutive reconciliation errors, stopping supervisor");
                        self.reporter
                            .alert(&Alert::supervisor_stopped(
                                consecutive_errors,
                                &e.to_string(),
                            ))
                            .await;
                        break;
                    }
                }
            }

            if wait_or_cancel(&self.shutdown, self.policy.poll_interval)
                .await
                .is_cancelled()
            {
                break;
            }
        }

        self.shutdown_workers().await;
        info!("Forwarder supervisor stopped");
    }

    /// Performs one diff-and-converge step against the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the account list cannot be read. A record that
    /// cannot be fetched is logged and skipped until the next poll.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport, StoreError> {
        let accounts = self.store.list_accounts().await?;
        let listed: HashSet<&str> = accounts.iter().map(|a| a.key.as_str()).collect();
        let mut report = ReconcileReport::default();

        let removed: Vec<String> = self
            .state
            .live
            .keys()
            .filter(|key| !listed.contains(key.as_str()))
            .cloned()
            .collect();
        for key in removed {
            if let Some(worker) = self.state.live.remove(&key) {
                info!(account = %mask_phone(&key), "Account removed, stopping worker");
                self.stop_worker(&key, worker).await;
                report.stopped.push(key);
            }
        }

        let restart_delay = self.policy.restart_delay;

        for summary in &accounts {
            let key = summary.key.as_str();

            // Nothing to start and nothing to stop.
            if !summary.forwarding_enabled && !self.state.live.contains_key(key) {
                continue;
            }

            let config = match self.store.get_account(key).await {
                Ok(Some(config)) => config,
                Ok(None) => {
                    // Deleted between the listing and the fetch.
                    if let Some(worker) = self.state.live.remove(key) {
                        self.stop_worker(key, worker).await;
                        report.stopped.push(key.to_owned());
                    }
                    continue;
                }
                Err(e) => {
                    warn!(account = %mask_phone(key), error = %e, "Failed to fetch account, skipping");
                    continue;
                }
            };

            let up_to_date = match self.state.live.get_mut(key) {
                Some(worker) => {
                    worker.collect(key).await;
                    worker.applied == config && !worker.restart_due(restart_delay)
                }
                None => false,
            };
            if up_to_date {
                continue;
            }

            if let Some(worker) = self.state.live.remove(key) {
                match &worker.slot {
                    WorkerSlot::Crashed => {
                        info!(account = %mask_phone(key), "Restarting dead worker");
                    }
                    WorkerSlot::Finished { .. } if worker.applied == config => {
                        info!(account = %mask_phone(key), "Restarting finished worker");
                    }
                    _ => {
                        info!(account = %mask_phone(key), "Account config changed, restarting worker");
                    }
                }
                self.stop_worker(key, worker).await;
                report.stopped.push(key.to_owned());
            }

            if config.forwarding_enabled {
                self.start_worker(config);
                report.started.push(key.to_owned());
            }
        }

        Ok(report)
    }

    fn start_worker(&mut self, config: AccountConfig) {
        info!(
            account = %mask_phone(&config.account_key),
            targets = config.targets.len(),
            "Starting worker"
        );

        let cancel = self.shutdown.child_token();
        let worker = AccountWorker::new(
            config.clone(),
            Arc::clone(&self.factory),
            self.reporter.clone(),
            self.worker_policy.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(worker.run());

        self.state.live.insert(
            config.account_key.clone(),
            LiveWorker {
                slot: WorkerSlot::Running(task),
                cancel,
                applied: config,
            },
        );
    }

    async fn stop_worker(&self, key: &str, worker: LiveWorker) {
        worker.cancel.cancel();
        let WorkerSlot::Running(mut task) = worker.slot else {
            return;
        };

        match timeout(self.policy.worker_stop_timeout, &mut task).await {
            Ok(Ok(exit)) => debug!(account = %mask_phone(key), outcome = ?exit.outcome, "Worker stopped"),
            Ok(Err(e)) => warn!(account = %mask_phone(key), error = %e, "Worker task died while stopping"),
            Err(_) => {
                warn!(account = %mask_phone(key), "Worker did not stop in time, aborting");
                task.abort();
            }
        }
    }

    async fn shutdown_workers(&mut self) {
        if self.state.live.is_empty() {
            return;
        }

        info!(workers = self.state.live.len(), "Stopping all workers...");
        let workers: Vec<(String, LiveWorker)> = self.state.live.drain().collect();
        for (_, worker) in &workers {
            worker.cancel.cancel();
        }

        let deadline = Instant::now() + self.policy.shutdown_timeout;
        for (key, worker) in workers {
            let WorkerSlot::Running(mut task) = worker.slot else {
                continue;
            };
            if timeout_at(deadline, &mut task).await.is_err() {
                warn!(account = %mask_phone(&key), "Worker still running at shutdown deadline, aborting");
                task.abort();
            }
        }
    }
}

impl<F: ClientFactory> std::fmt::Debug for Supervisor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

enum ControlState<F: ClientFactory> {
    Ready(Box<Supervisor<F>>),
    Running(JoinHandle<()>),
    Stopped,
}

/// Start/stop surface owning the process's single supervisor.
pub struct SupervisorControl<F: ClientFactory> {
    inner: Mutex<ControlState<F>>,
    shutdown: CancellationToken,
    grace: Duration,
}

impl<F: ClientFactory> SupervisorControl<F> {
    #[must_use]
    pub fn new(supervisor: Supervisor<F>) -> Self {
        let shutdown = supervisor.shutdown_token();
        // Workers get the shutdown timeout, the supervisor a little more.
        let grace = supervisor.policy().shutdown_timeout + Duration::from_secs(2);
        Self {
            inner: Mutex::new(ControlState::Ready(Box::new(supervisor))),
            shutdown,
            grace,
        }
    }

    /// Spawns the supervisor task. Returns `false` if it was already started.
    pub async fn start(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match std::mem::replace(&mut *inner, ControlState::Stopped) {
            ControlState::Ready(mut supervisor) => {
                *inner = ControlState::Running(tokio::spawn(async move {
                    supervisor.run().await;
                }));
                true
            }
            other => {
                *inner = other;
                false
            }
        }
    }

    /// Signals shutdown and waits a bounded time for the supervisor to finish.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let mut inner = self.inner.lock().await;
        let ControlState::Running(mut task) = std::mem::replace(&mut *inner, ControlState::Stopped)
        else {
            return;
        };

        match timeout(self.grace, &mut task).await {
            Ok(Ok(())) => debug!("Supervisor task finished"),
            Ok(Err(e)) => error!(error = %e, "Supervisor task died"),
            Err(_) => {
                warn!("Supervisor did not stop in time, aborting");
                task.abort();
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.inner.lock().await, ControlState::Running(task) if !task.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::{AccountSummary, Credentials};
    use crate::forwarder::state::{FailureReason, IdleReason};
    use crate::forwarder::testing::{MockClient, MockFactory, account};
    use crate::report::testing::RecordingSink;
    use crate::store::MemoryAccountStore;
    use crate::telegram::TelegramError;

    const ADMIN: i64 = -100;

    struct Harness {
        store: Arc<MemoryAccountStore>,
        factory: Arc<MockFactory>,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        fn new(accounts: Vec<AccountConfig>) -> Self {
            Self::with_factory(accounts, MockFactory::default())
        }

        fn with_factory(accounts: Vec<AccountConfig>, factory: MockFactory) -> Self {
            Self {
                store: Arc::new(MemoryAccountStore::new(accounts)),
                factory: Arc::new(factory),
                sink: Arc::new(RecordingSink::default()),
            }
        }

        fn supervisor(&self) -> Supervisor<MockFactory> {
            Supervisor::new(
                self.store.clone(),
                Arc::clone(&self.factory),
                Reporter::new(self.sink.clone(), Some(ADMIN)),
            )
        }
    }

    /// Store that is always unreachable.
    #[derive(Default)]
    struct DownStore {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AccountStore for DownStore {
        async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io(std::io::Error::other("connection refused")))
        }

        async fn get_account(&self, _key: &str) -> Result<Option<AccountConfig>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("connection refused")))
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_on_enabled_accounts() {
        let harness = Harness::new(vec![
            account("A", &["@a"], 5, true),
            account("B", &["@b"], 5, false),
            account("C", &["@c"], 5, true),
        ]);
        let mut supervisor = harness.supervisor();

        let report = supervisor.reconcile().await.unwrap();

        assert_eq!(report.started, vec!["A".to_owned(), "C".to_owned()]);
        assert!(report.stopped.is_empty());
        assert_eq!(supervisor.state().running_accounts(), vec!["A", "C"]);
        assert!(supervisor.state().applied_config("B").is_none());

        // Nothing changed, nothing to do.
        let report = supervisor.reconcile().await.unwrap();
        assert!(report.is_empty());

        supervisor.shutdown.cancel();
        supervisor.shutdown_workers().await;
        assert!(supervisor.state().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_change_restarts_worker() {
        let harness = Harness::new(vec![account("A", &["@a"], 5, true)]);
        let mut supervisor = harness.supervisor();
        supervisor.reconcile().await.unwrap();
        settle().await;

        harness.store.upsert(account("A", &["@a"], 10, true)).await;
        let report = supervisor.reconcile().await.unwrap();

        assert_eq!(report.stopped, vec!["A".to_owned()]);
        assert_eq!(report.started, vec!["A".to_owned()]);
        assert_eq!(
            supervisor.state().applied_config("A").map(|c| c.delay_seconds),
            Some(10)
        );
        assert_eq!(supervisor.state().running_accounts(), vec!["A"]);

        settle().await;
        assert_eq!(harness.factory.opened(), 2);
        assert_eq!(harness.factory.client("A").unwrap().close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_and_removal_stop_workers() {
        let harness = Harness::new(vec![
            account("A", &["@a"], 5, true),
            account("C", &["@c"], 5, true),
        ]);
        let mut supervisor = harness.supervisor();
        supervisor.reconcile().await.unwrap();

        harness.store.upsert(account("A", &["@a"], 5, false)).await;
        harness.store.remove("C").await;
        let report = supervisor.reconcile().await.unwrap();

        let mut stopped = report.stopped.clone();
        stopped.sort();
        assert_eq!(stopped, vec!["A".to_owned(), "C".to_owned()]);
        assert!(report.started.is_empty());
        assert!(supervisor.state().running_accounts().is_empty());
        assert!(supervisor.state().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_is_restarted_after_delay() {
        let harness = Harness::new(vec![account("A", &[], 5, true)]);
        let mut supervisor = harness.supervisor();
        let restart_delay = supervisor.policy().restart_delay;

        supervisor.reconcile().await.unwrap();
        settle().await;
        let report = supervisor.reconcile().await.unwrap();

        assert!(report.is_empty());
        assert_eq!(
            supervisor.state().finished_outcome("A"),
            Some(&WorkerOutcome::Idle(IdleReason::NoTargets))
        );
        assert!(supervisor.state().running_accounts().is_empty());

        tokio::time::sleep(restart_delay).await;
        let report = supervisor.reconcile().await.unwrap();

        assert_eq!(report.stopped, vec!["A".to_owned()]);
        assert_eq!(report.started, vec!["A".to_owned()]);
        assert_eq!(harness.factory.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_change_restarts_finished_worker_at_once() {
        let harness = Harness::new(vec![account("A", &[], 5, true)]);
        let mut supervisor = harness.supervisor();
        supervisor.reconcile().await.unwrap();
        settle().await;

        harness.store.upsert(account("A", &["@a"], 5, true)).await;
        let report = supervisor.reconcile().await.unwrap();

        assert_eq!(report.started, vec!["A".to_owned()]);
        assert_eq!(supervisor.state().running_accounts(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_worker_is_restarted_after_delay() {
        let harness = Harness::with_factory(
            vec![account("A", &["@a"], 5, true)],
            MockFactory::failing(TelegramError::Connection("no route".to_owned())),
        );
        let mut supervisor = harness.supervisor();
        let restart_delay = supervisor.policy().restart_delay;

        supervisor.reconcile().await.unwrap();
        settle().await;
        assert!(supervisor.reconcile().await.unwrap().is_empty());
        assert!(matches!(
            supervisor.state().finished_outcome("A"),
            Some(WorkerOutcome::Failed(FailureReason::Startup(_)))
        ));
        assert_eq!(harness.factory.opened(), 1);

        tokio::time::sleep(restart_delay).await;
        let report = supervisor.reconcile().await.unwrap();
        settle().await;

        assert_eq!(report.started, vec!["A".to_owned()]);
        assert_eq!(harness.factory.opened(), 2);
        assert_eq!(supervisor.state().running_accounts(), vec!["A"]);
        // Only the first attempt failed.
        let alerts: Vec<String> = harness
            .sink
            .to(ADMIN)
            .await
            .into_iter()
            .filter(|text| text.contains("Critical Worker Error"))
            .collect();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_worker_is_restarted() {
        let harness = Harness::new(vec![account("A", &["@a"], 5, true)]);
        let mut supervisor = harness.supervisor();
        supervisor.reconcile().await.unwrap();

        if let Some(LiveWorker {
            slot: WorkerSlot::Running(task),
            ..
        }) = supervisor.state.live.get("A")
        {
            task.abort();
        }
        settle().await;

        let report = supervisor.reconcile().await.unwrap();
        assert_eq!(report.stopped, vec!["A".to_owned()]);
        assert_eq!(report.started, vec!["A".to_owned()]);
        assert_eq!(supervisor.state().running_accounts(), vec!["A"]);

        // The replacement is an ordinary worker again.
        settle().await;
        assert!(supervisor.reconcile().await.unwrap().is_empty());
    }

    /// Panics on the first `open`, then behaves like `MockFactory`.
    #[derive(Default)]
    struct PanicOnceFactory {
        inner: MockFactory,
        panicked: AtomicBool,
    }

    #[async_trait]
    impl ClientFactory for PanicOnceFactory {
        type Client = MockClient;

        async fn open(
            &self,
            credentials: &Credentials,
            account_key: &str,
        ) -> Result<MockClient, TelegramError> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("session database is corrupt");
            }
            self.inner.open(credentials, account_key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_worker_is_restarted_on_next_poll() {
        let store = Arc::new(MemoryAccountStore::new(vec![account("A", &["@a"], 5, true)]));
        let factory = Arc::new(PanicOnceFactory::default());
        let mut supervisor = Supervisor::new(
            store,
            Arc::clone(&factory),
            Reporter::new(Arc::new(RecordingSink::default()), None),
        );

        supervisor.reconcile().await.unwrap();
        settle().await;
        assert!(supervisor.state().running_accounts().is_empty());

        let report = supervisor.reconcile().await.unwrap();
        settle().await;

        assert_eq!(report.started, vec!["A".to_owned()]);
        assert_eq!(supervisor.state().running_accounts(), vec!["A"]);
        assert_eq!(factory.inner.opened(), 1);
    }

    /// Store whose record lookup fails for one key.
    struct BrokenRecordStore {
        inner: MemoryAccountStore,
        broken: &'static str,
        fetched: std::sync::Mutex<Vec<String>>,
    }

    impl BrokenRecordStore {
        fn new(accounts: Vec<AccountConfig>, broken: &'static str) -> Self {
            Self {
                inner: MemoryAccountStore::new(accounts),
                broken,
                fetched: std::sync::Mutex::default(),
            }
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AccountStore for BrokenRecordStore {
        async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StoreError> {
            self.inner.list_accounts().await
        }

        async fn get_account(&self, key: &str) -> Result<Option<AccountConfig>, StoreError> {
            self.fetched.lock().unwrap().push(key.to_owned());
            if key == self.broken {
                return Err(StoreError::Io(std::io::Error::other("row locked")));
            }
            self.inner.get_account(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_unreadable_record_does_not_block_others() {
        let store = Arc::new(BrokenRecordStore::new(
            vec![
                account("A", &["@a"], 5, true),
                account("B", &["@b"], 5, true),
                account("C", &["@c"], 5, true),
            ],
            "B",
        ));
        let mut supervisor = Supervisor::new(
            store,
            Arc::new(MockFactory::default()),
            Reporter::new(Arc::new(RecordingSink::default()), None),
        );

        let report = supervisor.reconcile().await.unwrap();

        assert_eq!(report.started, vec!["A".to_owned(), "C".to_owned()]);
        assert_eq!(supervisor.state().running_accounts(), vec!["A", "C"]);
        assert!(supervisor.state().applied_config("B").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_accounts_without_worker_are_not_fetched() {
        let store = Arc::new(BrokenRecordStore::new(
            vec![
                account("A", &["@a"], 5, true),
                account("B", &["@b"], 5, false),
            ],
            "B",
        ));
        let mut supervisor = Supervisor::new(
            Arc::clone(&store) as Arc<dyn AccountStore>,
            Arc::new(MockFactory::default()),
            Reporter::new(Arc::new(RecordingSink::default()), None),
        );

        let report = supervisor.reconcile().await.unwrap();

        assert_eq!(report.started, vec!["A".to_owned()]);
        assert_eq!(store.fetched(), vec!["A".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_store_stops_supervisor() {
        let store = Arc::new(DownStore::default());
        let sink = Arc::new(RecordingSink::default());
        let mut supervisor = Supervisor::new(
            store.clone(),
            Arc::new(MockFactory::default()),
            Reporter::new(sink.clone(), Some(ADMIN)),
        );
        let start = Instant::now();

        supervisor.run().await;

        assert_eq!(store.calls.load(Ordering::SeqCst), 10);
        // Nine poll intervals between ten attempts.
        assert!(start.elapsed() >= Duration::from_secs(27));
        assert!(start.elapsed() < Duration::from_secs(30));

        let alerts = sink.to(ADMIN).await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("Supervisor Stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_start_is_idempotent_and_stop_closes_workers() {
        let harness = Harness::new(vec![account("A", &["@a"], 60, true)]);
        let control = SupervisorControl::new(harness.supervisor());

        assert!(control.start().await);
        assert!(!control.start().await);
        assert!(control.is_running().await);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let stopped_at = Instant::now();
        control.stop().await;

        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert!(!control.is_running().await);
        assert!(!control.start().await);

        let client = harness.factory.client("A").unwrap();
        assert_eq!(client.forwarded().len(), 1);
        assert_eq!(client.close_calls(), 1);
    }
}
