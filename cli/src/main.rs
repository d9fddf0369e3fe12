// smsbackup: command-line front end for the SMS backup engine
//
// Export messages from the local message store into a portable backup file
// and restore them back, skipping records that are already present.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use smsbackup_core::backup::{backup_file_name_now, FileLocation};
use smsbackup_core::{
    progress_channel, read_backup, BackupDate, BackupError, BackupService, MessageStore,
    SledMessageStore, Sms, SmsType, ThreadSelection,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "smsbackup")]
#[command(about = "Back up and restore SMS messages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show total messages and per-thread counts
    Status,
    /// List conversation threads
    Threads,
    /// Write a backup file
    Backup {
        /// Only include these addresses (repeatable); default is every thread
        #[arg(short, long = "thread")]
        threads: Vec<String>,
        /// Leave these addresses out (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
        /// Output file (defaults to sms-backup-<timestamp>.backup in backup_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore messages from a backup file
    Restore { file: PathBuf },
    /// Decode a backup file without touching the store
    Inspect { file: PathBuf },
    /// Add a single message to the store
    Add {
        address: String,
        body: String,
        #[arg(short, long, value_enum, default_value = "inbox")]
        kind: KindArg,
        /// Received timestamp in epoch millis (defaults to now)
        #[arg(long)]
        date: Option<i64>,
    },
    /// Delete every message in the store
    Clear {
        /// Confirm; there is no undo
        #[arg(long)]
        yes: bool,
    },
    /// Manage the default-handler role (write access to the store)
    Role {
        #[command(subcommand)]
        action: RoleAction,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum RoleAction {
    Grant,
    Revoke,
    Show,
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Inbox,
    Sent,
    Draft,
    Outbox,
    Failed,
    Queued,
}

impl From<KindArg> for SmsType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Inbox => SmsType::Inbox,
            KindArg::Sent => SmsType::Sent,
            KindArg::Draft => SmsType::Draft,
            KindArg::Outbox => SmsType::Outbox,
            KindArg::Failed => SmsType::Failed,
            KindArg::Queued => SmsType::Queued,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => cmd_status().await,
        Commands::Threads => cmd_threads().await,
        Commands::Backup {
            threads,
            exclude,
            output,
        } => cmd_backup(threads, exclude, output).await,
        Commands::Restore { file } => cmd_restore(file).await,
        Commands::Inspect { file } => cmd_inspect(file).await,
        Commands::Add {
            address,
            body,
            kind,
            date,
        } => cmd_add(address, body, kind.into(), date).await,
        Commands::Clear { yes } => cmd_clear(yes).await,
        Commands::Role { action } => cmd_role(action).await,
        Commands::Config { action } => cmd_config(action).await,
    }
}

fn open_service(config: &config::Config) -> Result<BackupService> {
    let path = config.store_path()?;
    tracing::debug!("Opening message store at {}", path.display());
    let store = SledMessageStore::open(&path)
        .with_context(|| format!("Failed to open message store at {}", path.display()))?
        .with_insert_capability(config.default_handler)
        .with_read_permission(config.read_permission);
    Ok(BackupService::new(Arc::new(store)))
}

async fn cmd_status() -> Result<()> {
    let config = config::Config::load()?;
    let service = open_service(&config)?;

    let total = service.total_count().await?;
    let threads = service.threads().await?;

    println!("{}", "SMS Backup Status".bold());
    println!();
    println!("Total SMS: {}", total.to_string().bright_cyan());
    println!("Threads:   {}", threads.len());
    println!(
        "Role:      {}",
        if service.store().supports_insert() {
            "default handler".green()
        } else {
            "read only".yellow()
        }
    );
    if !config.read_permission {
        println!("  {}", "(read permission not granted)".dimmed());
    }

    Ok(())
}

async fn cmd_threads() -> Result<()> {
    let config = config::Config::load()?;
    let service = open_service(&config)?;
    let threads = service.threads().await?;

    if threads.is_empty() {
        println!("{}", "No threads found.".dimmed());
        return Ok(());
    }

    println!("{} ({} total)", "Threads".bold(), threads.len());
    println!();
    for thread in threads {
        println!(
            "  {} {:<24} total sms: {}",
            "•".bright_green(),
            thread.address.bright_cyan(),
            thread.count
        );
    }

    Ok(())
}

async fn cmd_backup(
    include: Vec<String>,
    exclude: Vec<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = config::Config::load()?;
    let service = open_service(&config)?;

    let mut selection = ThreadSelection::new(service.threads().await?);
    if !include.is_empty() {
        selection.clear();
        for address in &include {
            if selection.threads().iter().any(|t| &t.address == address) {
                selection.toggle(address);
            } else {
                println!("{} Unknown thread: {}", "!".yellow(), address);
            }
        }
    }
    for address in &exclude {
        if selection.is_selected(address) {
            selection.toggle(address);
        }
    }

    let path = match output {
        Some(path) => path,
        None => config.backup_dir()?.join(backup_file_name_now()),
    };

    println!(
        "Backing up {} thread(s), {} message(s)...",
        selection.selected_count(),
        selection.selected_records()
    );

    let location = FileLocation::new(path);
    let meta = service
        .create_backup(selection.to_filter(), location.clone())
        .await
        .context("Failed to backup!")?;

    println!("{} Backup done", "✓".green());
    println!(
        "  File:     {}",
        location.path().display().to_string().bright_cyan()
    );
    println!("  Messages: {}", meta.total);
    println!("  Version:  {}", meta.version);

    Ok(())
}

async fn cmd_restore(file: PathBuf) -> Result<()> {
    let config = config::Config::load()?;
    let service = open_service(&config)?;

    if !service.store().supports_insert() {
        println!(
            "{} Not the default handler. Run {} first.",
            "✗".red(),
            "smsbackup role grant".bright_green()
        );
        anyhow::bail!(BackupError::CapabilityDenied);
    }

    let (tx, mut rx) = progress_channel();
    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            print!(
                "\r  Restoring {}/{} ({:.0}%)",
                progress.current,
                progress.total,
                progress.fraction() * 100.0
            );
            let _ = std::io::stdout().flush();
        }
    });

    let result = service.restore_from(FileLocation::new(&file), tx).await;
    let _ = printer.await;
    println!();

    let (decoded, report) = result.context("Failed to restore!")?;

    println!("{} Restore done", "✓".green());
    println!("  Inserted:        {}", report.inserted.to_string().bright_cyan());
    println!("  Already present: {}", report.skipped);
    if !decoded.errors.is_empty() {
        println!(
            "  Skipped entries: {}",
            decoded.errors.len().to_string().yellow()
        );
    }

    Ok(())
}

async fn cmd_inspect(file: PathBuf) -> Result<()> {
    let location = FileLocation::new(&file);
    let decoded = tokio::task::spawn_blocking(move || read_backup(&location))
        .await
        .context("Read task failed")?
        .with_context(|| format!("Failed to read backup {}", file.display()))?;

    println!("{}", "Backup File".bold());
    match &decoded.metadata {
        Some(meta) => {
            println!("  Version:  {}", meta.version);
            println!("  Created:  {}", format_backup_date(&meta.date));
            println!("  Total:    {}", meta.total);
        }
        None => println!("  {}", "(no metadata)".dimmed()),
    }
    println!("  Valid:    {}", decoded.messages.len().to_string().bright_cyan());
    if decoded.total_mismatch() {
        println!("  {}", "meta.total does not match the payload".yellow());
    }

    if !decoded.errors.is_empty() {
        println!();
        println!("{} ({})", "Skipped entries".bold(), decoded.errors.len());
        for error in &decoded.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    let mut kinds: BTreeMap<SmsType, usize> = BTreeMap::new();
    for sms in &decoded.messages {
        *kinds.entry(sms.kind).or_default() += 1;
    }
    if !kinds.is_empty() {
        println!();
        println!("{}", "Types".bold());
        for (kind, count) in kinds {
            println!("  {:<24} {}", kind.label(), count);
        }
    }

    let sizes = smsbackup_core::thread_sizes(&decoded.messages);
    if !sizes.is_empty() {
        println!();
        println!("{}", "Threads".bold());
        for (address, count) in sizes {
            println!("  {:<24} {}", address.bright_cyan(), count);
        }
    }

    Ok(())
}

async fn cmd_add(address: String, body: String, kind: SmsType, date: Option<i64>) -> Result<()> {
    let config = config::Config::load()?;
    let service = open_service(&config)?;

    let now = chrono::Utc::now().timestamp_millis();
    let received_at = date.unwrap_or(now);
    let sms = Sms::new(address, body, kind)
        .with_dates(received_at, received_at)
        .with_flags(kind != SmsType::Inbox, kind != SmsType::Inbox);

    let store = service.store();
    tokio::task::spawn_blocking(move || store.insert(&sms))
        .await
        .context("Insert task failed")?
        .context("Store rejected the message")?;

    println!("{} Message added", "✓".green());
    Ok(())
}

async fn cmd_clear(yes: bool) -> Result<()> {
    if !yes {
        println!("{}", "WARNING".red().bold());
        println!("This deletes every message in the store. There is no undo.");
        println!("Re-run with {} to confirm.", "--yes".bright_green());
        return Ok(());
    }

    let config = config::Config::load()?;
    let service = open_service(&config)?;
    let removed = service.clear_all().await.context("Failed to delete messages")?;

    println!("{} All SMS deleted ({})", "✓".green(), removed);
    Ok(())
}

async fn cmd_role(action: RoleAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        RoleAction::Grant => {
            config.default_handler = true;
            config.save()?;
            println!("{} Now the default handler; restore is enabled", "✓".green());
        }
        RoleAction::Revoke => {
            config.default_handler = false;
            config.save()?;
            println!("{} Default handler role released", "✓".green());
        }
        RoleAction::Show => {
            let state = if config.default_handler {
                "default handler".green()
            } else {
                "read only".yellow()
            };
            println!("Role: {}", state);
        }
    }

    Ok(())
}

async fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}

fn format_backup_date(date: &BackupDate) -> String {
    use chrono::{DateTime, Local, Utc};

    match date {
        BackupDate::Millis(millis) => {
            let dt = DateTime::from_timestamp_millis(*millis).unwrap_or_else(Utc::now);
            let local: DateTime<Local> = dt.into();
            local.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        BackupDate::Text(text) => text.clone(),
    }
}
