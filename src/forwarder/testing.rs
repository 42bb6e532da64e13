//! Scripted messaging client and factory for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{AccountConfig, Credentials};
use crate::targets::TargetDescriptor;
use crate::telegram::{ClientFactory, MessagingClient, SelfMessage, TelegramError};

#[derive(Debug)]
pub struct MockState {
    pub authorized: bool,
    pub message: Option<SelfMessage>,
    /// Results handed out by `fetch_last_self_message` before falling
    /// back to `message`.
    pub fetch_script: Mutex<VecDeque<Result<Option<SelfMessage>, TelegramError>>>,
    /// One entry per `forward` call; `None` (or an empty script) succeeds.
    pub forward_script: Mutex<VecDeque<Option<TelegramError>>>,
    pub unresolvable: HashSet<String>,
    pub forwarded: Mutex<Vec<(String, Option<i32>)>>,
    pub fetch_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

/// Cheaply clonable handle; clones share state.
#[derive(Debug, Clone)]
pub struct MockClient(pub Arc<MockState>);

impl MockClient {
    pub fn new() -> Self {
        Self::build(true, Some(message()), Vec::new(), Vec::new(), &[])
    }

    pub fn build(
        authorized: bool,
        message: Option<SelfMessage>,
        fetch_script: Vec<Result<Option<SelfMessage>, TelegramError>>,
        forward_script: Vec<Option<TelegramError>>,
        unresolvable: &[&str],
    ) -> Self {
        Self(Arc::new(MockState {
            authorized,
            message,
            fetch_script: Mutex::new(fetch_script.into()),
            forward_script: Mutex::new(forward_script.into()),
            unresolvable: unresolvable.iter().map(|s| (*s).to_owned()).collect(),
            forwarded: Mutex::default(),
            fetch_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }))
    }

    pub fn forwarded(&self) -> Vec<(String, Option<i32>)> {
        self.0.forwarded.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.0.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.0.close_calls.load(Ordering::SeqCst)
    }
}

pub fn message() -> SelfMessage {
    SelfMessage {
        id: 7,
        text: "Hello from Saved Messages".to_owned(),
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    type Peer = String;

    async fn is_authorized(&self) -> Result<bool, TelegramError> {
        Ok(self.0.authorized)
    }

    async fn fetch_last_self_message(&self) -> Result<Option<SelfMessage>, TelegramError> {
        self.0.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.0.fetch_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.0.message.clone()))
    }

    async fn resolve_target(&self, target: &TargetDescriptor) -> Result<String, TelegramError> {
        if self.0.unresolvable.contains(&target.identifier) {
            return Err(TelegramError::Resolution(format!(
                "{} not found",
                target.identifier
            )));
        }
        Ok(target.identifier.clone())
    }

    async fn forward(
        &self,
        _message: &SelfMessage,
        peer: &String,
        topic_id: Option<i32>,
    ) -> Result<(), TelegramError> {
        let scripted = self.0.forward_script.lock().unwrap().pop_front().flatten();
        if let Some(err) = scripted {
            return Err(err);
        }
        self.0
            .forwarded
            .lock()
            .unwrap()
            .push((peer.clone(), topic_id));
        Ok(())
    }

    async fn close(&self) {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out one shared `MockClient` per account key.
#[derive(Debug, Default)]
pub struct MockFactory {
    clients: Mutex<HashMap<String, MockClient>>,
    open_error: Mutex<Option<TelegramError>>,
    pub opened: AtomicUsize,
}

impl MockFactory {
    pub fn with_client(account_key: &str, client: MockClient) -> Self {
        let factory = Self::default();
        factory.insert(account_key, client);
        factory
    }

    pub fn failing(err: TelegramError) -> Self {
        let factory = Self::default();
        *factory.open_error.lock().unwrap() = Some(err);
        factory
    }

    pub fn insert(&self, account_key: &str, client: MockClient) {
        self.clients
            .lock()
            .unwrap()
            .insert(account_key.to_owned(), client);
    }

    pub fn client(&self, account_key: &str) -> Option<MockClient> {
        self.clients.lock().unwrap().get(account_key).cloned()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    type Client = MockClient;

    async fn open(
        &self,
        _credentials: &Credentials,
        account_key: &str,
    ) -> Result<MockClient, TelegramError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.open_error.lock().unwrap().take() {
            return Err(err);
        }
        let mut clients = self.clients.lock().unwrap();
        Ok(clients
            .entry(account_key.to_owned())
            .or_insert_with(MockClient::new)
            .clone())
    }
}

pub fn account(key: &str, targets: &[&str], delay_seconds: u64, enabled: bool) -> AccountConfig {
    let mut account = AccountConfig::new(key, Credentials::new(1, "hash".to_owned()));
    account.targets = targets.iter().map(|t| (*t).to_owned()).collect();
    account.delay_seconds = delay_seconds;
    account.forwarding_enabled = enabled;
    account
}
