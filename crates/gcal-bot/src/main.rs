//! gcal-bot: guild calendar bot
//!
//! Usage:
//!   gcal-bot             - Connect to Discord and serve the calendar
//!   gcal-bot --help      - Show help
//!   gcal-bot --version   - Show version

use std::sync::Arc;

use gcal_core::store::open_pool;
use gcal_core::{
    Config, EventStore, JsonFileEventStore, MembershipMirror, SqliteEventStore,
    SqliteMemberStore, StorageBackend,
};
use gcal_discord::CalendarBot;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    Bot,
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("gcal-bot {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Bot => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    config
        .discord_token()
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting gcal-bot...");
    tracing::info!(
        "Calendar channel: #{}, access role: {}",
        config.calendar.channel_name,
        config.calendar.role_name
    );

    // One pool for the whole process; members always live in SQLite
    let pool = open_pool(&config.storage)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", config.storage.db_path, e))?;

    let store: Arc<dyn EventStore> = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(SqliteEventStore::new(pool.clone())),
        StorageBackend::Json => {
            tracing::warn!(
                "Using JSON event store at {} (events are removed by title)",
                config.storage.json_path
            );
            Arc::new(
                JsonFileEventStore::open(&config.storage.json_path)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", config.storage.json_path, e))?,
            )
        }
    };

    let mirror = if config.mirror.enabled {
        Some(Arc::new(MembershipMirror::new(
            Arc::new(SqliteMemberStore::new(pool.clone())),
            &config.mirror,
        )))
    } else {
        tracing::info!("Membership mirror is disabled");
        None
    };

    let bot = CalendarBot::new(config, store, mirror);
    let mut bot_handle = tokio::spawn(async move { bot.start().await });

    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down...");
            bot_handle.abort();
        }
        joined = &mut bot_handle => {
            match joined {
                Ok(Ok(())) => tracing::info!("Discord connection closed"),
                Ok(Err(e)) => {
                    tracing::error!("Discord bot error: {}", e);
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }
    RunMode::Bot
}

fn print_help() {
    println!("gcal-bot - Discord guild calendar");
    println!();
    println!("Usage:");
    println!("  gcal-bot             Connect to Discord and serve the calendar");
    println!("  gcal-bot --help      Show this help message");
    println!("  gcal-bot --version   Show version");
    println!();
    println!("Configuration is read from gcal.toml if present, otherwise from the");
    println!("environment (a .env file is loaded first).");
    println!();
    println!("Environment Variables:");
    println!("  DISCORD_BOT_TOKEN              Bot token (required, TOKEN also accepted)");
    println!("  COMMAND_PREFIX                 Prefix for text commands (default: $)");
    println!("  STORAGE_BACKEND                sqlite or json (default: sqlite)");
    println!("  DB_PATH                        SQLite database (default: data/gcal.db)");
    println!("  CALENDAR_JSON_PATH             JSON event file (default: data/calendar.json)");
    println!("  DB_POOL_SIZE                   Pooled connections (default: 8)");
    println!("  DB_POOL_TIMEOUT_SECS           Connection checkout timeout (default: 5)");
    println!("  DB_BUSY_TIMEOUT_SECS           SQLite lock wait per statement (default: 5)");
    println!("  CALENDAR_CHANNEL               Calendar channel name (default: kalender)");
    println!("  CALENDAR_ROLE                  Role allowed to edit (default: editaccess)");
    println!("  CALENDAR_SCAN_LIMIT            Messages scanned on rediscovery, 10-20 (default: 10)");
    println!("  CALENDAR_REQUEST_TIMEOUT_SECS  Deadline per calendar request (default: 10)");
    println!("  MIRROR_ENABLED                 Mirror guild members to SQLite (default: true)");
    println!("  MIRROR_MAX_RETRIES             Retries per mirror write (default: 3)");
    println!("  RUST_LOG                       Log filter (default: info)");
}
