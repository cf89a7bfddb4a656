mod config;
mod format;
mod health;
mod offset;
mod platform;
mod poller;
mod router;
mod scheduler;
mod session;
mod subscribers;
mod weather;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::offset::JsonOffsetStore;
use crate::platform::telegram::TelegramMessenger;
use crate::platform::Messenger;
use crate::poller::UpdatePoller;
use crate::router::CommandRouter;
use crate::scheduler::broadcast::Broadcaster;
use crate::scheduler::Scheduler;
use crate::session::MemorySessionStore;
use crate::subscribers::{SqliteSubscriberStore, SubscriberStore};
use crate::weather::openweather::OpenWeatherClient;
use crate::weather::WeatherProvider;

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials usually live in .env next to the binary
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,weatherbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let send_test = args.iter().any(|a| a == "--send-test");
    args.retain(|a| a != "--send-test");

    // Load configuration
    let config_path = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Default city: {}", config.weather.default_city);
    info!("  UTC offset: {}h", config.weather.utc_offset_hours);
    info!("  Poll interval: {}s", config.telegram.poll_interval_secs);
    info!("  Offset file: {}", config.storage.offset_path.display());
    info!("  Broadcast: {}", config.broadcast.enabled);

    let timeout = config.http.timeout();
    let messenger: Arc<dyn Messenger> =
        Arc::new(TelegramMessenger::new(&config.telegram.bot_token, timeout)?);

    if send_test {
        return send_test_message(&config, messenger.as_ref()).await;
    }

    let weather: Arc<dyn WeatherProvider> = Arc::new(OpenWeatherClient::new(
        &config.weather.base_url,
        &config.weather.api_key,
        timeout,
    )?);
    let subscribers: Arc<dyn SubscriberStore> =
        Arc::new(SqliteSubscriberStore::open(&config.storage.database_path)?);
    let sessions = Arc::new(MemorySessionStore::new(
        config.storage.session_capacity,
        Duration::from_secs(config.storage.session_idle_secs),
    ));
    let timezone = config.weather.timezone();

    let router = Arc::new(CommandRouter::new(
        weather.clone(),
        messenger.clone(),
        sessions,
        subscribers.clone(),
        &config.weather.default_city,
        timezone,
        config.alerts.clone(),
    ));

    let poller = Arc::new(
        UpdatePoller::new(
            messenger.clone(),
            router,
            Arc::new(JsonOffsetStore::new(config.storage.offset_path.clone())),
            config.telegram.seen_capacity,
            config.telegram.max_attempts,
        )
        .await,
    );

    // Background jobs
    let mut scheduler = Scheduler::new().await?;
    let broadcast = if config.broadcast.enabled {
        let broadcaster = Arc::new(Broadcaster::new(
            weather.clone(),
            messenger.clone(),
            subscribers.clone(),
            &config.weather.default_city,
            timezone,
            &config.broadcast,
            config.alerts.clone(),
        ));
        if let Err(e) = broadcaster.run_once(Utc::now()).await {
            warn!("Startup broadcast failed: {:#}", e);
        }
        Some((broadcaster, config.broadcast.cron.clone()))
    } else {
        None
    };
    scheduler::tasks::register_builtin_tasks(&scheduler, poller.clone(), broadcast).await?;
    scheduler.start().await?;

    // Health endpoint
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let health = if config.health.enabled {
        let mut rx = shutdown_rx.clone();
        let signal = async move {
            let _ = rx.changed().await;
        };
        let server = health::serve(config.health.bind, poller.clone(), subscribers.clone(), signal);
        Some(tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("{:#}", e);
            }
        }))
    } else {
        None
    };

    info!("Bot is starting...");
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };
    poller
        .clone()
        .run(
            Duration::from_secs(config.telegram.poll_interval_secs),
            ctrl_c,
        )
        .await;

    let _ = shutdown_tx.send(true);
    scheduler.shutdown().await?;
    if let Some(handle) = health {
        handle.await.ok();
    }

    info!("Stopped at update {}", poller.offset());
    Ok(())
}

/// Check delivery to the configured broadcast chats and exit.
async fn send_test_message(config: &Config, messenger: &dyn Messenger) -> Result<()> {
    if config.broadcast.chat_ids.is_empty() {
        anyhow::bail!("No chat to test: set broadcast.chat_ids or TELEGRAM_CHAT_ID");
    }
    for chat in &config.broadcast.chat_ids {
        messenger
            .send_text(*chat, format::TEST_MESSAGE)
            .await
            .with_context(|| format!("Test message to chat {} failed", chat))?;
        info!("Test message sent to chat {}", chat);
    }
    Ok(())
}
