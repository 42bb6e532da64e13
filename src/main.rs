//! Saved Messages Forwarder - Main Entry Point
//!
//! Runs the forwarding supervisor for every registered account, and
//! provides the commands to register accounts, sign them in and edit
//! their forwarding settings.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use saved_forwarder::config::{AccountConfig, BotApiConfig, Credentials, ForwarderSettings};
use saved_forwarder::forwarder::{Supervisor, SupervisorControl, SupervisorPolicy};
use saved_forwarder::report::{BotApiSink, Reporter};
use saved_forwarder::store::{AccountStore, JsonAccountStore};
use saved_forwarder::targets::parse_target;
use saved_forwarder::telegram::{
    ClientFactory, GrammersClient, GrammersFactory, MessagingClient, TelegramError, mask_phone,
};

/// Forwards the newest Saved Messages entry of each account to its targets.
#[derive(Parser, Debug)]
#[command(name = "forwarder_bot")]
#[command(about = "Forward your latest Saved Messages entry to a list of chats")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env", global = true)]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Accounts JSON file (overrides `ACCOUNTS_PATH`).
    #[arg(long, global = true)]
    accounts: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the forwarding supervisor until Ctrl+C (default).
    Run,
    /// Sign an account in and store its session.
    Login {
        #[arg(long)]
        phone: String,
    },
    /// Register an account, or replace its credentials.
    AddAccount {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        api_id: i32,
        #[arg(long)]
        api_hash: String,
    },
    /// Replace the forwarding targets of an account.
    SetTargets {
        #[arg(long)]
        phone: String,
        /// Target links, @usernames or chat ids.
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Set the seconds between two forwarding passes.
    SetDelay {
        #[arg(long)]
        phone: String,
        seconds: u64,
    },
    /// Set (or clear, when omitted) the account's own report chat.
    SetLogChannel {
        #[arg(long)]
        phone: String,
        #[arg(allow_hyphen_values = true)]
        chat_id: Option<i64>,
    },
    /// Turn auto forwarding on.
    Enable {
        #[arg(long)]
        phone: String,
    },
    /// Turn auto forwarding off.
    Disable {
        #[arg(long)]
        phone: String,
    },
    /// Unregister an account; its worker stops on the next poll.
    RemoveAccount {
        #[arg(long)]
        phone: String,
        /// Also delete the account's session file.
        #[arg(long)]
        delete_session: bool,
    },
    /// List registered accounts.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let mut settings = ForwarderSettings::from_env_with_defaults();
    if let Some(path) = args.accounts {
        settings.accounts_path = path;
    }
    let store = JsonAccountStore::new(&settings.accounts_path);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(settings, store).await,
        Command::Login { phone } => login(&settings, &store, &phone).await,
        Command::AddAccount {
            phone,
            api_id,
            api_hash,
        } => {
            let credentials = Credentials::new(api_id, api_hash);
            let file = store.load().await?;
            let account = match file.accounts.into_iter().find(|a| a.account_key == phone) {
                Some(mut existing) => {
                    existing.credentials = credentials;
                    existing
                }
                None => AccountConfig::new(phone.clone(), credentials),
            };
            store.upsert(account).await?;
            println!("✓ Account {} saved", mask_phone(&phone));
            println!("  Next: forwarder_bot login --phone {phone}");
            Ok(())
        }
        Command::SetTargets { phone, targets } => {
            for target in &targets {
                parse_target(target).with_context(|| format!("Invalid target {target}"))?;
            }
            let account = store
                .update(&phone, |a| a.targets = targets)
                .await?;
            println!("✓ {} targets set", account.targets.len());
            Ok(())
        }
        Command::SetDelay { phone, seconds } => {
            if seconds < 1 {
                bail!("Delay must be at least 1 second");
            }
            store.update(&phone, |a| a.delay_seconds = seconds).await?;
            println!("✓ Delay set to {seconds}s");
            Ok(())
        }
        Command::SetLogChannel { phone, chat_id } => {
            store.update(&phone, |a| a.log_channel = chat_id).await?;
            match chat_id {
                Some(id) => println!("✓ Log channel set to {id}"),
                None => println!("✓ Log channel cleared"),
            }
            Ok(())
        }
        Command::Enable { phone } => set_forwarding(&store, &phone, true).await,
        Command::Disable { phone } => set_forwarding(&store, &phone, false).await,
        Command::RemoveAccount {
            phone,
            delete_session,
        } => remove_account(&settings, &store, &phone, delete_session).await,
        Command::List => list(&store).await,
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(settings: ForwarderSettings, store: JsonAccountStore) -> Result<()> {
    let bot_config =
        BotApiConfig::from_env().context("Failed to load Bot API configuration from environment")?;

    // Fail early on a broken accounts file instead of on the first poll.
    let accounts = store
        .load()
        .await
        .context("Failed to load accounts file")?
        .accounts;
    info!(
        accounts = accounts.len(),
        active = accounts.iter().filter(|a| a.is_active()).count(),
        path = %settings.accounts_path.display(),
        "Loaded accounts"
    );
    if bot_config.admin_log_channel.is_none() {
        warn!("ADMIN_LOG_CHANNEL is not set, alerts will only be logged");
    }

    let reporter = Reporter::new(
        Arc::new(BotApiSink::new(bot_config.token.clone())),
        bot_config.admin_log_channel,
    );
    let factory = Arc::new(GrammersFactory::new(&settings.sessions_dir));
    let policy = SupervisorPolicy {
        poll_interval: settings.poll_interval(),
        ..SupervisorPolicy::default()
    };
    let supervisor = Supervisor::new(Arc::new(store), factory, reporter).with_policy(policy);

    let control = SupervisorControl::new(supervisor);
    control.start().await;

    info!("Forwarder is running. Use Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    control.stop().await;

    Ok(())
}

async fn set_forwarding(store: &JsonAccountStore, phone: &str, enabled: bool) -> Result<()> {
    let account = store
        .update(phone, |a| a.forwarding_enabled = enabled)
        .await?;
    if enabled && account.targets.is_empty() {
        println!("⚠ Auto forwarding enabled, but no targets are set");
    } else {
        println!(
            "✓ Auto forwarding {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

async fn remove_account(
    settings: &ForwarderSettings,
    store: &JsonAccountStore,
    phone: &str,
    delete_session: bool,
) -> Result<()> {
    if !store.remove(phone).await? {
        bail!("Account {} is not registered", mask_phone(phone));
    }
    println!("✓ Account {} removed", mask_phone(phone));

    if delete_session {
        let factory = GrammersFactory::new(&settings.sessions_dir);
        if factory
            .remove_session(phone)
            .await
            .context("Failed to delete session file")?
        {
            println!("✓ Session file deleted");
        }
    }
    Ok(())
}

async fn list(store: &JsonAccountStore) -> Result<()> {
    let accounts = store.list_accounts().await?;
    if accounts.is_empty() {
        println!("No accounts registered in {}", store.path().display());
        return Ok(());
    }

    for account in &accounts {
        println!(
            "{} (api_id {}): {} targets, forwarding {}",
            mask_phone(&account.key),
            account.api_id,
            account.target_count,
            if account.forwarding_enabled { "on" } else { "off" }
        );
    }
    Ok(())
}

/// Signs a registered account in, creating its session file.
async fn login(settings: &ForwarderSettings, store: &JsonAccountStore, phone: &str) -> Result<()> {
    let account = store
        .load()
        .await?
        .accounts
        .into_iter()
        .find(|a| a.account_key == phone)
        .with_context(|| format!("Account {} is not registered", mask_phone(phone)))?;

    let factory = GrammersFactory::new(&settings.sessions_dir);
    let client = factory
        .open(&account.credentials, phone)
        .await
        .context("Failed to connect to Telegram")?;

    let result = if client
        .is_authorized()
        .await
        .context("Failed to check authorization")?
    {
        info!("Account is already signed in");
        Ok(())
    } else {
        authenticate(&client, phone, &account.credentials.api_hash).await
    };

    client.disconnect();
    result
}

/// Handles Telegram authentication.
async fn authenticate(client: &GrammersClient, phone: &str, api_hash: &str) -> Result<()> {
    info!("Authentication required");

    let token = client
        .request_login_code(phone, api_hash)
        .await
        .context("Failed to request login code")?;

    info!("Login code sent to your Telegram app");

    let code: String = Input::new()
        .with_prompt("Enter the login code")
        .interact_text()?;

    match client.sign_in(&token, &code).await {
        Ok(()) => {
            info!("Successfully signed in!");
            Ok(())
        }
        Err(TelegramError::PasswordRequired(password_token)) => {
            info!("Two-factor authentication is enabled");

            let hint = password_token.hint().unwrap_or("no hint");
            info!("Password hint: {}", hint);

            let password: String = Password::new()
                .with_prompt("Enter your 2FA password")
                .interact()?;

            client
                .check_password(password_token, &password)
                .await
                .context("2FA authentication failed")?;

            info!("Successfully signed in with 2FA!");
            Ok(())
        }
        Err(e) => Err(e).context("Authentication failed"),
    }
}
