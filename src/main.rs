mod bot;
mod config;
mod oauth;
mod quota;
mod status;
mod youtube;

use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use bot::{Bot, BotConfig, ResponseBook, Responder, SystemClock};
use config::Config;
use oauth::OAuthClient;
use youtube::YouTubeClient;

const KEEPALIVE_EVERY: Duration = Duration::from_secs(14 * 60);

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log dir {}: {e}", config.log_dir.display());
        std::process::exit(1);
    }
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join("chatpulse.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting chatpulse as {}", config.bot_name);
    info!("Owner: {}", config.owner_username);
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }
    if config.tokens.is_none() {
        warn!("No OAuth tokens configured, running read-only");
    }

    let book = match &config.responses_file {
        Some(path) => match ResponseBook::load(path) {
            Ok(book) => {
                info!("Loaded responses from {}", path.display());
                book
            }
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        },
        None => ResponseBook::default(),
    };

    let responder = match Responder::new(book, StdRng::from_entropy(), &config.owner_username, config.reply_delay) {
        Ok(responder) => responder,
        Err(e) => {
            error!("Invalid response keywords: {e}");
            std::process::exit(1);
        }
    };

    let oauth = config
        .tokens
        .clone()
        .map(|tokens| OAuthClient::new(config.client_id.clone(), config.client_secret.clone(), tokens));
    let api = YouTubeClient::new(config.api_key.clone(), oauth);

    let mut bot = Bot::new(BotConfig::from(&config), api, SystemClock, responder);

    let app_state = status::AppState::new(bot.status_handle(), Utc::now());
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = status::serve(port, app_state).await {
            error!("Status endpoint failed: {e}");
        }
    });

    let keepalive = config.keepalive_url.clone().map(|url| {
        info!("💓 Keep-alive ping to {url}");
        status::spawn_keepalive(url, KEEPALIVE_EVERY)
    });

    bot.run(shutdown_signal()).await;
    if let Some(handle) = keepalive {
        handle.abort();
    }
    info!("👋 Bye");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
