//! State for the stream currently being watched.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

/// What the bot knows about one chatter during a stream.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub message_count: u32,
    pub first_seen_at: DateTime<Utc>,
}

impl UserRecord {
    /// True until the author's second message arrives.
    pub fn is_first_message(&self) -> bool {
        self.message_count == 1
    }
}

/// A live stream the bot has adopted.
///
/// Created when the locator finds a new live video and dropped when the stream
/// ends or its chat goes away. Per-author records live and die with it.
#[derive(Debug)]
pub struct StreamSession {
    pub video_id: String,
    pub title: String,
    /// `None` when the video has chat disabled; the session then stays idle.
    pub live_chat_id: Option<String>,
    /// Continuation token for the next page fetch.
    pub page_token: Option<String>,
    /// The platform said this video has no chat; don't ask again.
    pub chat_disabled: bool,
    pub running: bool,
    pub started_at: DateTime<Utc>,
    users: HashMap<String, UserRecord>,
    sent_ids: HashSet<String>,
}

impl StreamSession {
    pub fn new(video_id: String, title: String, started_at: DateTime<Utc>) -> Self {
        Self {
            video_id,
            title,
            live_chat_id: None,
            page_token: None,
            chat_disabled: false,
            running: false,
            started_at,
            users: HashMap::new(),
            sent_ids: HashSet::new(),
        }
    }

    /// Chat resolved and not stopped.
    pub fn is_polling(&self) -> bool {
        self.running && self.live_chat_id.is_some()
    }

    /// Count a message from `author` and return the updated record.
    pub fn track_author(&mut self, author: &str, now: DateTime<Utc>) -> &UserRecord {
        let record = self.users.entry(author.to_string()).or_insert(UserRecord {
            message_count: 0,
            first_seen_at: now,
        });
        record.message_count += 1;
        record
    }

    pub fn user(&self, author: &str) -> Option<&UserRecord> {
        self.users.get(author)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn remember_sent(&mut self, message_id: String) {
        self.sent_ids.insert(message_id);
    }

    pub fn was_sent_by_bot(&self, message_id: &str) -> bool {
        self.sent_ids.contains(message_id)
    }
}
