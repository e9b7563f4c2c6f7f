//! Bot engine - finds the live stream, polls its chat and sends replies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bot::clock::Clock;
use crate::bot::limits::RateLimiter;
use crate::bot::message::ChatMessage;
use crate::bot::responder::{BotMode, Reply, ReplyKind, Responder, StatusLine};
use crate::bot::session::StreamSession;
use crate::config::{Config, RateLimits, StreamingHours};
use crate::quota::{ApiCall, QuotaGovernor};
use crate::status::{SharedStatus, StatusSnapshot};
use crate::youtube::{Error, LiveChatApi, LiveVideo};

/// Longest message the platform accepts.
const MAX_MESSAGE_CHARS: usize = 200;

/// Bot engine configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub channel_id: String,
    pub bot_name: String,
    pub streaming_hours: Option<StreamingHours>,
    pub timezone: Tz,
    pub stream_check_interval: Duration,
    pub min_poll_interval: Duration,
    pub error_retry: Duration,
    pub rate_limits: RateLimits,
    pub daily_quota_limit: u32,
    /// False in dry-run mode or without OAuth tokens; replies are only logged.
    pub can_send: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            bot_name: String::new(),
            streaming_hours: None,
            timezone: Tz::UTC,
            stream_check_interval: Duration::from_secs(300),
            min_poll_interval: Duration::from_secs(10),
            error_retry: Duration::from_secs(30),
            rate_limits: RateLimits::default(),
            daily_quota_limit: 10_000,
            can_send: true,
        }
    }
}

impl From<&Config> for BotConfig {
    fn from(config: &Config) -> Self {
        Self {
            channel_id: config.channel_id.clone(),
            bot_name: config.bot_name.clone(),
            streaming_hours: config.streaming_hours,
            timezone: config.timezone,
            stream_check_interval: config.stream_check_interval,
            min_poll_interval: config.min_poll_interval,
            error_retry: config.error_retry,
            rate_limits: config.rate_limits,
            daily_quota_limit: config.daily_quota_limit,
            can_send: config.can_send(),
        }
    }
}

/// `now + duration`, saturating at the latest representable time.
fn later(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// The bot. Owns every piece of mutable state; one loop drives it.
pub struct Bot<A, C, R> {
    config: BotConfig,
    api: A,
    clock: C,
    responder: Responder<R>,
    quota: QuotaGovernor,
    limits: RateLimiter,
    session: Option<StreamSession>,
    /// Video whose chat closed; not re-adopted while search still lists it.
    finished_video: Option<String>,
    next_detection: DateTime<Utc>,
    next_poll: DateTime<Utc>,
    status: SharedStatus,
}

impl<A, C, R> Bot<A, C, R>
where
    A: LiveChatApi,
    C: Clock,
    R: Rng,
{
    pub fn new(config: BotConfig, api: A, clock: C, responder: Responder<R>) -> Self {
        let now = clock.now();
        let status = Arc::new(RwLock::new(StatusSnapshot::new(
            config.bot_name.clone(),
            config.daily_quota_limit,
        )));

        Self {
            quota: QuotaGovernor::new(config.daily_quota_limit, config.timezone, now),
            limits: RateLimiter::new(config.rate_limits, config.timezone, now),
            session: None,
            finished_video: None,
            next_detection: now,
            next_poll: now,
            status,
            config,
            api,
            clock,
            responder,
        }
    }

    pub fn status_handle(&self) -> SharedStatus {
        self.status.clone()
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn mode(&self) -> BotMode {
        self.responder.mode()
    }

    pub fn quota_used(&mut self) -> u32 {
        self.quota.used(self.clock.now())
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("👀 Watching channel {}", self.config.channel_id);
        if !self.config.can_send {
            info!("Read-only mode: replies will be logged, not posted");
        }

        loop {
            let wait = self.step().await;
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("🛑 Shutdown requested");
                    break;
                }
                _ = self.clock.sleep(wait) => {}
            }
        }

        if let Some(session) = self.session.take() {
            info!("Leaving stream {}", session.video_id);
        }
        self.publish_status().await;
    }

    /// Do whatever is due now and return how long to wait before the next step.
    pub async fn step(&mut self) -> Duration {
        if self.clock.now() >= self.next_detection {
            self.detect_stream().await;
            self.next_detection = later(self.clock.now(), self.config.stream_check_interval);
        }

        if self.is_polling() && self.clock.now() >= self.next_poll {
            let wait = self.poll_chat().await;
            self.next_poll = later(self.clock.now(), wait);
        }

        self.publish_status().await;

        let mut next = self.next_detection;
        if self.is_polling() {
            next = next.min(self.next_poll);
        }
        (next - self.clock.now()).to_std().unwrap_or_default()
    }

    fn is_polling(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_polling())
    }

    /// Look for a live broadcast on the channel and adopt or drop sessions.
    pub async fn detect_stream(&mut self) {
        let now = self.clock.now();

        if let Some(hours) = self.config.streaming_hours {
            let hour = now.with_timezone(&self.config.timezone).hour();
            if !hours.contains(hour) {
                debug!("Outside streaming hours ({}:00), skipping live check", hour);
                return;
            }
        }

        if let Err(e) = self.quota.try_spend(ApiCall::Search, now) {
            warn!("💸 Skipping live check: {e}");
            return;
        }

        let live = match self.api.find_live_video(&self.config.channel_id).await {
            Ok(live) => live,
            Err(Error::QuotaExhausted) => {
                warn!("💸 Platform reports quota exhausted during live check");
                self.quota.exhaust(now);
                return;
            }
            Err(e) => {
                warn!("Live check failed: {e}");
                return;
            }
        };

        match live {
            Some(video) if self.finished_video.as_deref() == Some(video.video_id.as_str()) => {
                debug!("Stream {} already ended, ignoring stale search result", video.video_id);
            }
            Some(video) => match self.session.as_ref() {
                Some(session) if session.video_id == video.video_id => {
                    if !session.is_polling() && !session.chat_disabled {
                        self.retry_chat_resolution().await;
                    }
                }
                _ => self.adopt(video).await,
            },
            None => {
                self.finished_video = None;
                if let Some(session) = self.session.take() {
                    info!("📴 \"{}\" ({}) is no longer live", session.title, session.video_id);
                } else {
                    debug!("No live stream on {}", self.config.channel_id);
                }
            }
        }
    }

    async fn adopt(&mut self, video: LiveVideo) {
        if let Some(previous) = self.session.take() {
            info!("🔄 Switching from {} to {}", previous.video_id, video.video_id);
        }
        info!("🔴 Live: \"{}\" ({})", video.title, video.video_id);

        self.finished_video = None;
        self.session = Some(StreamSession::new(video.video_id, video.title, self.clock.now()));
        self.retry_chat_resolution().await;
    }

    async fn retry_chat_resolution(&mut self) {
        let Some(video_id) = self.session.as_ref().map(|s| s.video_id.clone()) else {
            return;
        };

        let resolved = self.resolve_chat(&video_id).await;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match resolved {
            ChatResolution::Active(chat_id) => {
                info!("💬 Chat {} resolved for {}", chat_id, video_id);
                session.live_chat_id = Some(chat_id);
                session.running = true;
                self.next_poll = self.clock.now();
            }
            ChatResolution::Disabled => {
                info!("🚫 Chat is disabled for {}, staying idle", video_id);
                session.chat_disabled = true;
            }
            ChatResolution::Unavailable => {}
        }
    }

    /// Find the live chat id for a video.
    async fn resolve_chat(&mut self, video_id: &str) -> ChatResolution {
        let now = self.clock.now();
        if let Err(e) = self.quota.try_spend(ApiCall::VideoDetails, now) {
            warn!("💸 Skipping chat lookup: {e}");
            return ChatResolution::Unavailable;
        }

        match self.api.live_chat_id(video_id).await {
            Ok(Some(chat_id)) => ChatResolution::Active(chat_id),
            Ok(None) => ChatResolution::Disabled,
            Err(e) if e.ends_session() => {
                info!("Video {} has no usable chat: {e}", video_id);
                ChatResolution::Disabled
            }
            Err(Error::QuotaExhausted) => {
                self.quota.exhaust(now);
                ChatResolution::Unavailable
            }
            Err(e) => {
                warn!("Failed to resolve chat for {}: {e}", video_id);
                ChatResolution::Unavailable
            }
        }
    }

    /// Fetch and handle one page of chat. Returns the wait before the next page.
    pub async fn poll_chat(&mut self) -> Duration {
        let Some((chat_id, page_token)) = self
            .session
            .as_ref()
            .and_then(|s| s.live_chat_id.clone().map(|c| (c, s.page_token.clone())))
        else {
            return self.config.min_poll_interval;
        };

        let now = self.clock.now();
        if let Err(e) = self.quota.try_spend(ApiCall::ListMessages, now) {
            warn!("💸 Skipping chat poll: {e}");
            return self.config.error_retry;
        }

        let page = match self.api.list_messages(&chat_id, page_token.as_deref()).await {
            Ok(page) => page,
            Err(e) if e.ends_session() => {
                info!("📴 Chat closed: {e}");
                self.finish_session();
                return self.config.min_poll_interval;
            }
            Err(Error::QuotaExhausted) => {
                self.quota.exhaust(now);
                warn!("💸 Platform reports quota exhausted, pausing until {}", self.quota.resets_at());
                return self.config.error_retry;
            }
            Err(e) => {
                warn!("Chat poll failed, retrying in {:?}: {e}", self.config.error_retry);
                return self.config.error_retry;
            }
        };

        if !page.messages.is_empty() {
            debug!("📨 {} new message(s)", page.messages.len());
        }
        for msg in page.messages {
            self.handle_message(&chat_id, msg).await;
        }

        if let Some(session) = self.session.as_mut()
            && let Some(token) = page.next_page_token
        {
            session.page_token = Some(token);
        }

        if page.offline {
            info!("📴 Broadcast went offline");
            self.finish_session();
        }

        page.polling_interval
            .unwrap_or_default()
            .max(self.config.min_poll_interval)
    }

    /// Drop the session and remember its video so search lag can't revive it.
    fn finish_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.finished_video = Some(session.video_id);
        }
    }

    async fn handle_message(&mut self, chat_id: &str, msg: ChatMessage) {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if msg.is_from(&self.config.bot_name) || session.was_sent_by_bot(&msg.id) {
            debug!("Skipping own message {}", msg.id);
            return;
        }

        let record = session.track_author(&msg.author_channel_id, now);
        let first_message = record.is_first_message();
        if first_message {
            debug!("👤 New chatter {} (first seen {})", msg.author_name, record.first_seen_at);
        }

        if msg.published_at < session.started_at {
            debug!("Skipping backlog message {}", msg.id);
            return;
        }

        let badge = if msg.is_chat_owner {
            "👑 "
        } else if msg.is_moderator {
            "🛡️ "
        } else {
            ""
        };
        info!("💬 {}{}: \"{}\"", badge, msg.author_name, msg.preview());

        let mut reply = None;
        if self.responder.is_owner(&msg) && msg.text.trim_start().starts_with('!') {
            let status = self.status_line(now);
            reply = self
                .responder
                .admin_command(&msg.text, &status)
                .map(|text| Reply { text, kind: ReplyKind::Admin });
        }
        if reply.is_none() {
            reply = self.responder.scripted_reply(&msg, first_message);
        }
        let Some(reply) = reply else {
            return;
        };

        if let Err(refusal) = self.limits.check(now) {
            info!("⏳ Not replying to {}: {refusal}", msg.author_name);
            return;
        }

        self.send_reply(chat_id, reply).await;
    }

    async fn send_reply(&mut self, chat_id: &str, reply: Reply) {
        let delay = self.responder.human_delay();
        self.clock.sleep(delay).await;

        let text = truncate_chars(&reply.text, MAX_MESSAGE_CHARS);
        let now = self.clock.now();

        if !self.config.can_send {
            info!("[DRY RUN] Would reply ({:?}): {}", reply.kind, text);
            self.limits.record(now);
            return;
        }

        if let Err(e) = self.quota.try_spend(ApiCall::InsertMessage, now) {
            warn!("💸 Skipping reply: {e}");
            return;
        }

        match self.api.send_message(chat_id, &text).await {
            Ok(message_id) => {
                info!("📤 Replied ({:?}): {}", reply.kind, text);
                self.limits.record(now);
                if let Some(session) = self.session.as_mut() {
                    session.remember_sent(message_id);
                }
            }
            Err(Error::QuotaExhausted) => {
                warn!("💸 Platform reports quota exhausted, reply dropped");
                self.quota.exhaust(now);
            }
            Err(e) => warn!("Failed to send reply: {e}"),
        }
    }

    fn status_line(&mut self, now: DateTime<Utc>) -> StatusLine {
        StatusLine {
            replies_this_hour: self.limits.replies_this_hour(now),
            max_per_hour: self.limits.limits().max_per_hour,
            replies_today: self.limits.replies_today(now),
            quota_used: self.quota.used(now),
            quota_limit: self.quota.limit(),
            chatters: self.session.as_ref().map(|s| s.user_count()).unwrap_or(0),
        }
    }

    async fn publish_status(&mut self) {
        let now = self.clock.now();
        let snapshot = StatusSnapshot {
            bot_name: self.config.bot_name.clone(),
            current_stream: self.session.as_ref().map(|s| s.video_id.clone()),
            is_monitoring: self.is_polling(),
            quota_used: self.quota.used(now),
            quota_limit: self.quota.limit(),
            replies_this_hour: self.limits.replies_this_hour(now),
            replies_today: self.limits.replies_today(now),
            mode: self.responder.mode(),
        };
        *self.status.write().await = snapshot;
    }
}

enum ChatResolution {
    Active(String),
    Disabled,
    /// Lookup failed or was skipped; try again on a later tick.
    Unavailable,
}
