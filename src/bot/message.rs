//! Incoming chat message.

use chrono::{DateTime, Utc};

/// Max chars of message text shown in logs.
const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub author_channel_id: String,
    pub author_name: String,
    pub text: String,
    pub published_at: DateTime<Utc>,
    pub is_chat_owner: bool,
    pub is_moderator: bool,
}

impl ChatMessage {
    /// Message text cut at a char boundary for logging.
    pub fn preview(&self) -> String {
        let mut preview: String = self.text.chars().take(PREVIEW_CHARS).collect();
        if self.text.chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }
        preview
    }

    /// Written by the account with display name `name`.
    pub fn is_from(&self, name: &str) -> bool {
        normalize_name(&self.author_name) == normalize_name(name)
    }
}

/// Display names compare case-insensitively and without a leading `@`.
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}
