//! Standalone validator for forwarder accounts files.
//!
//! This tool validates the accounts JSON file used by the forwarder,
//! checking every record's delay, key uniqueness and forwarding targets.

use std::process::ExitCode;

use clap::Parser;

use saved_forwarder::config::{AccountConfig, validate_accounts};
use saved_forwarder::store::JsonAccountStore;
use saved_forwarder::targets::parse_target;
use saved_forwarder::telegram::mask_phone;

/// Accounts file validator.
#[derive(Parser, Debug)]
#[command(name = "validate_accounts")]
#[command(about = "Validates the accounts file of the Saved Messages forwarder")]
#[command(version)]
struct Args {
    /// Path to the accounts JSON file to validate.
    #[arg(short, long, default_value = "accounts.json")]
    file: String,

    /// Show how every target was understood.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    println!("Validating: {}\n", args.file);

    let accounts = match JsonAccountStore::new(&args.file).load().await {
        Ok(file) => file.accounts,
        Err(e) => {
            eprintln!("✗ Failed to load accounts: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.verbose {
        for account in &accounts {
            print_account(account);
        }
        println!();
    }

    let errors = validate_accounts(&accounts);
    for error in &errors {
        println!("  ✗ Error: {error}");
    }
    if !errors.is_empty() {
        println!();
    }

    let total = accounts.len();
    let enabled = accounts.iter().filter(|a| a.forwarding_enabled).count();

    if errors.is_empty() {
        println!("✓ All {total} accounts are valid! ({enabled} with auto forwarding on)");
        ExitCode::SUCCESS
    } else {
        println!(
            "✗ Validation failed: {} error(s) in {total} accounts",
            errors.len()
        );
        ExitCode::FAILURE
    }
}

fn print_account(account: &AccountConfig) {
    println!(
        "[{}] {} targets, every {}s, forwarding {}",
        mask_phone(&account.account_key),
        account.targets.len(),
        account.delay_seconds,
        if account.forwarding_enabled { "on" } else { "off" }
    );

    for raw in &account.targets {
        match parse_target(raw) {
            Ok(target) => match target.topic_id {
                Some(topic) => println!("  ✓ {raw} → {} {} (topic {topic})", target.kind, target.identifier),
                None => println!("  ✓ {raw} → {} {}", target.kind, target.identifier),
            },
            Err(e) => println!("  ✗ {raw}: {e}"),
        }
    }
}
