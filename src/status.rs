//! Status endpoint and keep-alive ping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bot::BotMode;

pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

/// What the bot loop last published about itself.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub bot_name: String,
    pub current_stream: Option<String>,
    pub is_monitoring: bool,
    pub quota_used: u32,
    pub quota_limit: u32,
    pub replies_this_hour: u32,
    pub replies_today: u32,
    pub mode: BotMode,
}

impl StatusSnapshot {
    pub fn new(bot_name: String, quota_limit: u32) -> Self {
        Self {
            bot_name,
            current_stream: None,
            is_monitoring: false,
            quota_used: 0,
            quota_limit,
            replies_this_hour: 0,
            replies_today: 0,
            mode: BotMode::Normal,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub bot_name: String,
    pub is_monitoring: bool,
    /// Video id, or `"none"`.
    pub current_stream: String,
    /// Seconds since startup.
    pub uptime: u64,
    pub quota_used: u32,
    pub quota_limit: u32,
    pub replies_this_hour: u32,
    pub replies_today: u32,
    pub mode: BotMode,
    pub timestamp: String,
}

#[derive(Clone)]
pub struct AppState {
    status: SharedStatus,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(status: SharedStatus, started_at: DateTime<Utc>) -> Self {
        Self { status, started_at }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.status.read().await.clone();
    let now = Utc::now();

    Json(StatusResponse {
        status: "running",
        bot_name: snapshot.bot_name,
        is_monitoring: snapshot.is_monitoring,
        current_stream: snapshot.current_stream.unwrap_or_else(|| "none".to_string()),
        uptime: (now - state.started_at).num_seconds().max(0) as u64,
        quota_used: snapshot.quota_used,
        quota_limit: snapshot.quota_limit,
        replies_this_hour: snapshot.replies_this_hour,
        replies_today: snapshot.replies_today,
        mode: snapshot.mode,
        timestamp: now.to_rfc3339(),
    })
}

pub async fn serve(port: u16, state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Status endpoint listening on {}", addr);
    axum::serve(listener, router(state)).await
}

/// Ping our own public URL so free hosting tiers don't put the process to sleep.
///
/// Runs until the returned handle is aborted.
pub fn spawn_keepalive(url: String, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let http = reqwest::Client::new();
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately; the server was just started
        interval.tick().await;
        loop {
            interval.tick().await;
            match http.get(&url).send().await {
                Ok(response) => debug!("💓 Keep-alive ping: {}", response.status()),
                Err(e) => warn!("Keep-alive ping failed: {e}"),
            }
        }
    })
}
