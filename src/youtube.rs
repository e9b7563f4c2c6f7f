//! YouTube Data API v3 client for the live chat calls the bot needs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bot::ChatMessage;
use crate::oauth::OAuthClient;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// A broadcast that is live right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveVideo {
    pub video_id: String,
    pub title: String,
}

/// One page of chat messages.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub next_page_token: Option<String>,
    /// Server-suggested wait before the next fetch.
    pub polling_interval: Option<Duration>,
    /// The broadcast went offline; no further pages will arrive.
    pub offline: bool,
}

/// The live chat operations, as seen by the bot.
#[allow(async_fn_in_trait)]
pub trait LiveChatApi {
    /// At most one live video on `channel_id`.
    async fn find_live_video(&self, channel_id: &str) -> Result<Option<LiveVideo>, Error>;

    /// The active chat id for a video, `None` when chat is disabled.
    async fn live_chat_id(&self, video_id: &str) -> Result<Option<String>, Error>;

    async fn list_messages(&self, live_chat_id: &str, page_token: Option<&str>) -> Result<MessagePage, Error>;

    /// Post a text message, returning the new message id.
    async fn send_message(&self, live_chat_id: &str, text: &str) -> Result<String, Error>;
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api { status: u16, message: String },
    Parse(String),
    Auth(String),
    ChatEnded,
    ChatDisabled,
    NotFound(String),
    QuotaExhausted,
}

impl Error {
    /// Errors meaning the current stream's chat is gone for good.
    pub fn ends_session(&self) -> bool {
        matches!(self, Error::ChatEnded | Error::ChatDisabled | Error::NotFound(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api { status, message } => write!(f, "API error {status}: {message}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Auth(e) => write!(f, "Auth error: {e}"),
            Error::ChatEnded => write!(f, "live chat has ended"),
            Error::ChatDisabled => write!(f, "live chat is disabled"),
            Error::NotFound(e) => write!(f, "not found: {e}"),
            Error::QuotaExhausted => write!(f, "daily API quota exhausted"),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Option<SearchSnippet>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct SearchSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    active_live_chat_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesResponse {
    next_page_token: Option<String>,
    polling_interval_millis: Option<u64>,
    offline_at: Option<String>,
    #[serde(default)]
    items: Vec<MessageItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageItem {
    id: String,
    snippet: MessageSnippet,
    author_details: AuthorDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSnippet {
    #[serde(rename = "type")]
    kind: String,
    published_at: DateTime<Utc>,
    display_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorDetails {
    channel_id: String,
    display_name: String,
    #[serde(default)]
    is_chat_owner: bool,
    #[serde(default)]
    is_chat_moderator: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRequest<'a> {
    snippet: InsertSnippet<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertSnippet<'a> {
    live_chat_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text_message_details: TextMessageDetails<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextMessageDetails<'a> {
    message_text: &'a str,
}

#[derive(Deserialize)]
struct InsertResponse {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Message types that carry chat text worth reacting to.
const TEXT_KINDS: &[&str] = &["textMessageEvent", "superChatEvent"];

impl MessagesResponse {
    fn into_page(self) -> MessagePage {
        let messages = self
            .items
            .into_iter()
            .filter(|item| TEXT_KINDS.contains(&item.snippet.kind.as_str()))
            .filter_map(|item| {
                let text = item.snippet.display_message?;
                Some(ChatMessage {
                    id: item.id,
                    author_channel_id: item.author_details.channel_id,
                    author_name: item.author_details.display_name,
                    text,
                    published_at: item.snippet.published_at,
                    is_chat_owner: item.author_details.is_chat_owner,
                    is_moderator: item.author_details.is_chat_moderator,
                })
            })
            .collect();

        MessagePage {
            messages,
            next_page_token: self.next_page_token,
            polling_interval: self.polling_interval_millis.map(Duration::from_millis),
            offline: self.offline_at.is_some(),
        }
    }
}

/// Map an unsuccessful response to an [`Error`].
fn classify_error(status: u16, body: &str) -> Error {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let reason = parsed
        .as_ref()
        .and_then(|e| e.error.errors.first())
        .map(|d| d.reason.clone())
        .unwrap_or_default();
    let message = match parsed {
        Some(e) if !e.error.message.is_empty() => e.error.message,
        _ => body.to_string(),
    };

    match reason.as_str() {
        "liveChatEnded" => Error::ChatEnded,
        "liveChatDisabled" => Error::ChatDisabled,
        "liveChatNotFound" | "videoNotFound" => Error::NotFound(message),
        "quotaExceeded" | "dailyLimitExceeded" => Error::QuotaExhausted,
        _ if status == 401 => Error::Auth(message),
        _ => Error::Api { status, message },
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(classify_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| Error::Parse(e.to_string()))
}

pub struct YouTubeClient {
    api_key: String,
    http: reqwest::Client,
    oauth: Option<OAuthClient>,
}

impl YouTubeClient {
    pub fn new(api_key: String, oauth: Option<OAuthClient>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { api_key, http, oauth }
    }

    async fn bearer(&self) -> Result<Option<String>, Error> {
        match &self.oauth {
            Some(oauth) => oauth
                .access_token()
                .await
                .map(Some)
                .map_err(|e| Error::Auth(e.to_string())),
            None => Ok(None),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&str, &str)],
        authorized: bool,
    ) -> Result<T, Error> {
        let mut request = self
            .http
            .get(format!("{API_BASE}/{resource}"))
            .query(query)
            .query(&[("key", self.api_key.as_str())]);

        if authorized && let Some(token) = self.bearer().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::Http(e.to_string()))?;
        read_json(response).await
    }
}

impl LiveChatApi for YouTubeClient {
    async fn find_live_video(&self, channel_id: &str) -> Result<Option<LiveVideo>, Error> {
        let response: SearchResponse = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("channelId", channel_id),
                    ("eventType", "live"),
                    ("type", "video"),
                    ("maxResults", "1"),
                ],
                false,
            )
            .await?;

        let live = response.items.into_iter().find_map(|item| {
            let video_id = item.id.video_id?;
            let title = item.snippet.map(|s| s.title).unwrap_or_default();
            Some(LiveVideo { video_id, title })
        });
        debug!("Live search for {channel_id}: {:?}", live);
        Ok(live)
    }

    async fn live_chat_id(&self, video_id: &str) -> Result<Option<String>, Error> {
        let response: VideosResponse = self
            .get("videos", &[("part", "liveStreamingDetails"), ("id", video_id)], false)
            .await?;

        let video = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("video {video_id}")))?;

        Ok(video.live_streaming_details.and_then(|d| d.active_live_chat_id))
    }

    async fn list_messages(&self, live_chat_id: &str, page_token: Option<&str>) -> Result<MessagePage, Error> {
        let mut query = vec![("liveChatId", live_chat_id), ("part", "snippet,authorDetails")];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: MessagesResponse = self.get("liveChat/messages", &query, true).await?;
        Ok(response.into_page())
    }

    async fn send_message(&self, live_chat_id: &str, text: &str) -> Result<String, Error> {
        let token = self
            .bearer()
            .await?
            .ok_or_else(|| Error::Auth("no OAuth tokens configured".into()))?;

        let request = InsertRequest {
            snippet: InsertSnippet {
                live_chat_id,
                kind: "textMessageEvent",
                text_message_details: TextMessageDetails { message_text: text },
            },
        };

        let response = self
            .http
            .post(format!("{API_BASE}/liveChat/messages"))
            .query(&[("part", "snippet")])
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        match read_json::<InsertResponse>(response).await {
            Ok(inserted) => {
                debug!("Posted message {}", inserted.id);
                Ok(inserted.id)
            }
            Err(Error::Auth(e)) => {
                warn!("Posting rejected, dropping cached access token");
                if let Some(ref oauth) = self.oauth {
                    oauth.invalidate().await;
                }
                Err(Error::Auth(e))
            }
            Err(e) => Err(e),
        }
    }
}
