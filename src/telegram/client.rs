//! grammers-backed messaging client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
pub use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::{Client, InvocationError, SenderPool, SignInError, sender};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use tl::enums::InputPeer;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::from_rpc;
use super::{ClientFactory, MessagingClient, SelfMessage, TelegramError};
use crate::config::Credentials;
use crate::targets::{TargetDescriptor, TargetLookup};

/// How many dialogs are scanned when a numeric target has to be looked up.
const DIALOG_SCAN_LIMIT: i32 = 200;

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Rpc(rpc) => {
                let message = rpc.to_string();
                from_rpc(&rpc.name, rpc.value, message)
            }
            other => Self::Invocation(other.to_string()),
        }
    }
}

/// Opens one grammers client per account, each with its own session file.
#[derive(Debug, Clone)]
pub struct GrammersFactory {
    sessions_dir: PathBuf,
}

impl GrammersFactory {
    #[must_use]
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    /// Session file used for an account.
    #[must_use]
    pub fn session_path(&self, account_key: &str) -> PathBuf {
        let name: String = account_key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '+')
            .collect();
        self.sessions_dir.join(format!("{name}.session"))
    }

    /// Deletes the account's session file and its `SQLite` side files.
    ///
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub async fn remove_session(&self, account_key: &str) -> std::io::Result<bool> {
        let path = self.session_path(account_key);
        let mut removed = false;

        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            match tokio::fs::remove_file(&file).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl ClientFactory for GrammersFactory {
    type Client = GrammersClient;

    async fn open(
        &self,
        credentials: &Credentials,
        account_key: &str,
    ) -> Result<GrammersClient, TelegramError> {
        tokio::fs::create_dir_all(&self.sessions_dir)
            .await
            .map_err(|e| TelegramError::Session(e.to_string()))?;

        GrammersClient::connect(
            &self.session_path(account_key),
            credentials.api_id,
            account_key,
        )
        .await
    }
}

/// Telegram client for one account.
pub struct GrammersClient {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Masked account key, for logs.
    account: String,

    /// Set once the sender pool was asked to quit.
    closed: AtomicBool,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl GrammersClient {
    /// Connects using the session stored at `session_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened or the connection fails.
    pub async fn connect(
        session_path: &Path,
        api_id: i32,
        account_key: &str,
    ) -> Result<Self, TelegramError> {
        let account = mask_phone(account_key);
        info!(account = %account, "Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates: _updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), api_id);

        let client = Client::new(handle.clone());

        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let bot = Self {
            client,
            handle: handle.thin,
            account,
            closed: AtomicBool::new(false),
            _pool_task: pool_task,
        };

        // Probe the connection; dropping `bot` on failure stops the pool.
        let authorized = bot
            .client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;
        info!(account = %bot.account, authorized, "Connected to Telegram");

        Ok(bot)
    }

    /// Requests a login code to be sent to the phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_login_code(
        &self,
        phone: &str,
        api_hash: &str,
    ) -> Result<LoginToken, TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        self.client
            .request_login_code(phone, api_hash)
            .await
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Signs in with the login code.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails.
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<(), TelegramError> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                Err(TelegramError::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => {
                Err(TelegramError::SignInFailed("Invalid code".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Checks the 2FA password.
    ///
    /// # Errors
    ///
    /// Returns an error if the password is invalid.
    pub async fn check_password(
        &self,
        password_token: PasswordToken,
        password: &str,
    ) -> Result<(), TelegramError> {
        info!("Checking 2FA password...");

        match self.client.check_password(password_token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => Err(TelegramError::InvalidPassword(token)),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Disconnects from Telegram. Safe to call repeatedly.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(account = %self.account, "Disconnecting from Telegram...");
        self.handle.quit();
    }

    async fn resolve_username(&self, username: &str) -> Result<InputPeer, TelegramError> {
        let request = tl::functions::contacts::ResolveUsername {
            username: username.to_owned(),
            referer: None,
        };
        let tl::enums::contacts::ResolvedPeer::Peer(resolved) = self.client.invoke(&request).await?;

        match resolved.peer {
            tl::enums::Peer::Channel(p) => find_chat(&resolved.chats, p.channel_id),
            tl::enums::Peer::Chat(p) => find_chat(&resolved.chats, p.chat_id),
            tl::enums::Peer::User(p) => find_user(&resolved.users, p.user_id),
        }
    }

    async fn resolve_invite(&self, hash: &str) -> Result<InputPeer, TelegramError> {
        let request = tl::functions::messages::CheckChatInvite {
            hash: hash.to_owned(),
        };

        match self.client.invoke(&request).await? {
            tl::enums::ChatInvite::Already(invite) => {
                find_chat(std::slice::from_ref(&invite.chat), chat_id(&invite.chat))
            }
            tl::enums::ChatInvite::Peek(peek) => {
                find_chat(std::slice::from_ref(&peek.chat), chat_id(&peek.chat))
            }
            tl::enums::ChatInvite::Invite(_) => Err(TelegramError::AccessDenied(
                "account has not joined the invite link's chat".to_owned(),
            )),
        }
    }

    /// Looks a numeric id up among the account's recent dialogs, which is
    /// where the access hash of a channel or user comes from.
    async fn resolve_from_dialogs(&self, lookup: &TargetLookup<'_>) -> Result<InputPeer, TelegramError> {
        let request = tl::functions::messages::GetDialogs {
            exclude_pinned: false,
            folder_id: None,
            offset_date: 0,
            offset_id: 0,
            offset_peer: InputPeer::Empty,
            limit: DIALOG_SCAN_LIMIT,
            hash: 0,
        };

        let (chats, users) = match self.client.invoke(&request).await? {
            tl::enums::messages::Dialogs::Dialogs(d) => (d.chats, d.users),
            tl::enums::messages::Dialogs::Slice(d) => (d.chats, d.users),
            tl::enums::messages::Dialogs::NotModified(_) => (Vec::new(), Vec::new()),
        };

        match *lookup {
            TargetLookup::Channel(id) | TargetLookup::Chat(id) => find_chat(&chats, id),
            TargetLookup::User(id) => find_user(&users, id),
            TargetLookup::Username(_) | TargetLookup::Invite(_) => Err(TelegramError::Resolution(
                "dialog lookup needs a numeric id".to_owned(),
            )),
        }
    }
}

#[async_trait]
impl MessagingClient for GrammersClient {
    type Peer = InputPeer;

    async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    async fn fetch_last_self_message(&self) -> Result<Option<SelfMessage>, TelegramError> {
        let request = tl::functions::messages::GetHistory {
            peer: InputPeer::PeerSelf,
            offset_id: 0,
            offset_date: 0,
            add_offset: 0,
            limit: 1,
            max_id: 0,
            min_id: 0,
            hash: 0,
        };

        let messages = match self.client.invoke(&request).await? {
            tl::enums::messages::Messages::Messages(m) => m.messages,
            tl::enums::messages::Messages::Slice(m) => m.messages,
            tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
            tl::enums::messages::Messages::NotModified(_) => Vec::new(),
        };

        Ok(messages.into_iter().find_map(|message| match message {
            tl::enums::Message::Message(m) => Some(SelfMessage {
                id: m.id,
                text: m.message,
            }),
            tl::enums::Message::Service(_) | tl::enums::Message::Empty(_) => None,
        }))
    }

    async fn resolve_target(&self, target: &TargetDescriptor) -> Result<InputPeer, TelegramError> {
        match target.lookup() {
            TargetLookup::Username(name) => self.resolve_username(name).await,
            TargetLookup::Invite(hash) => self.resolve_invite(hash).await,
            TargetLookup::Chat(id) => Ok(InputPeer::Chat(tl::types::InputPeerChat { chat_id: id })),
            lookup @ (TargetLookup::Channel(_) | TargetLookup::User(_)) => {
                self.resolve_from_dialogs(&lookup).await
            }
        }
    }

    async fn forward(
        &self,
        message: &SelfMessage,
        peer: &InputPeer,
        topic_id: Option<i32>,
    ) -> Result<(), TelegramError> {
        let request = tl::functions::messages::ForwardMessages {
            silent: false,
            background: false,
            with_my_score: false,
            drop_author: false,
            drop_media_captions: false,
            noforwards: false,
            allow_paid_floodskip: false,
            from_peer: InputPeer::PeerSelf,
            id: vec![message.id],
            random_id: vec![rand::random::<i64>()],
            to_peer: peer.clone(),
            top_msg_id: topic_id,
            reply_to: None,
            schedule_date: None,
            schedule_repeat_period: None,
            send_as: None,
            quick_reply_shortcut: None,
            effect: None,
            video_timestamp: None,
            allow_paid_stars: None,
            suggested_post: None,
        };

        self.client.invoke(&request).await?;
        Ok(())
    }

    async fn close(&self) {
        self.disconnect();
    }
}

impl Drop for GrammersClient {
    fn drop(&mut self) {
        // Aborted workers never reach `close`.
        if !self.closed.load(Ordering::SeqCst) {
            warn!(account = %self.account, "Client dropped without close, stopping sender pool");
            self.disconnect();
        }
    }
}

impl std::fmt::Debug for GrammersClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammersClient")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

fn chat_id(chat: &tl::enums::Chat) -> i64 {
    match chat {
        tl::enums::Chat::Empty(c) => c.id,
        tl::enums::Chat::Chat(c) => c.id,
        tl::enums::Chat::Forbidden(c) => c.id,
        tl::enums::Chat::Channel(c) => c.id,
        tl::enums::Chat::ChannelForbidden(c) => c.id,
    }
}

fn find_chat(chats: &[tl::enums::Chat], id: i64) -> Result<InputPeer, TelegramError> {
    let chat = chats
        .iter()
        .find(|chat| chat_id(chat) == id)
        .ok_or_else(|| TelegramError::Resolution(format!("chat {id} not found")))?;

    match chat {
        tl::enums::Chat::Chat(c) => Ok(InputPeer::Chat(tl::types::InputPeerChat { chat_id: c.id })),
        tl::enums::Chat::Channel(c) => c
            .access_hash
            .map(|access_hash| {
                InputPeer::Channel(tl::types::InputPeerChannel {
                    channel_id: c.id,
                    access_hash,
                })
            })
            .ok_or_else(|| TelegramError::AccessDenied(format!("no access to channel {id}"))),
        tl::enums::Chat::Forbidden(_) | tl::enums::Chat::ChannelForbidden(_) => {
            Err(TelegramError::AccessDenied(format!("chat {id} is forbidden")))
        }
        tl::enums::Chat::Empty(_) => Err(TelegramError::AccessDenied(format!(
            "chat {id} no longer exists"
        ))),
    }
}

fn find_user(users: &[tl::enums::User], id: i64) -> Result<InputPeer, TelegramError> {
    users
        .iter()
        .find_map(|user| match user {
            tl::enums::User::User(u) if u.id == id => u.access_hash.map(|access_hash| {
                InputPeer::User(tl::types::InputPeerUser {
                    user_id: u.id,
                    access_hash,
                })
            }),
            _ => None,
        })
        .ok_or_else(|| TelegramError::Resolution(format!("user {id} not found")))
}

/// Masks a phone number for logging (shows last 4 digits).
pub fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}
