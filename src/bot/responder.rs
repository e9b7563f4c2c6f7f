//! Decides whether and how to answer a chat message.
//!
//! Priority: owner commands, then greetings for first-time chatters, then
//! keyword reactions, then FAQ answers, then the occasional ambient line.
//! At most one reply per message.

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::bot::message::{ChatMessage, normalize_name};
use crate::bot::phrases::{CompiledBook, ResponseBook};
use crate::config::ReplyDelay;

/// How chatty the bot is, switched by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    Normal,
    /// Greetings and FAQ answers only.
    Quiet,
    /// Keyword reactions fire twice as often.
    Hype,
}

impl BotMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BotMode::Normal => "normal",
            BotMode::Quiet => "quiet",
            BotMode::Hype => "hype",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Admin,
    Greeting,
    Keyword(String),
    Faq,
    Ambient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub kind: ReplyKind,
}

/// Counters reported by `!status`.
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    pub replies_this_hour: u32,
    pub max_per_hour: u32,
    pub replies_today: u32,
    pub quota_used: u32,
    pub quota_limit: u32,
    pub chatters: usize,
}

pub struct Responder<R> {
    book: CompiledBook,
    rng: R,
    mode: BotMode,
    owner: String,
    reply_delay: ReplyDelay,
}

impl<R: Rng> Responder<R> {
    pub fn new(
        book: ResponseBook,
        rng: R,
        owner_username: &str,
        reply_delay: ReplyDelay,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            book: book.compile()?,
            rng,
            mode: BotMode::Normal,
            owner: normalize_name(owner_username),
            reply_delay,
        })
    }

    pub fn mode(&self) -> BotMode {
        self.mode
    }

    /// The channel owner posting under the configured display name.
    ///
    /// Display names aren't unique, so the platform's owner flag is required too.
    pub fn is_owner(&self, msg: &ChatMessage) -> bool {
        msg.is_chat_owner && msg.is_from(&self.owner)
    }

    /// Run an owner command. `None` when `text` isn't a known command.
    ///
    /// Callers must check [`Responder::is_owner`] first.
    pub fn admin_command(&mut self, text: &str, status: &StatusLine) -> Option<String> {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let command = parts.next()?.to_lowercase();
        let rest = parts.next().map(str::trim).unwrap_or("");

        match command.as_str() {
            "!ping" => Some("🏓 Pong!".to_string()),
            "!status" => Some(format!(
                "📊 Mode: {} | Replies: {}/{} this hour, {} today | Quota: {}/{} | Chatters: {}",
                self.mode.as_str(),
                status.replies_this_hour,
                status.max_per_hour,
                status.replies_today,
                status.quota_used,
                status.quota_limit,
                status.chatters,
            )),
            "!echo" if !rest.is_empty() => Some(rest.to_string()),
            "!quiet" => {
                self.mode = BotMode::Quiet;
                Some("🤫 Quiet mode on: greetings and FAQ answers only.".to_string())
            }
            "!normal" => {
                self.mode = BotMode::Normal;
                Some("🙂 Back to normal mode.".to_string())
            }
            "!hype" => {
                self.mode = BotMode::Hype;
                Some("🔥 Hype mode on!".to_string())
            }
            "!help" => Some("🛠️ Commands: !status !ping !echo <text> !quiet !normal !hype".to_string()),
            _ => None,
        }
    }

    /// Pick a scripted reply for an ordinary message.
    pub fn scripted_reply(&mut self, msg: &ChatMessage, first_message: bool) -> Option<Reply> {
        let text = msg.text.as_str();
        let name = msg.author_name.as_str();

        if first_message
            && self.book.greeting.is_match(text)
            && let Some(greeting) = pick(&mut self.rng, &self.book.greetings, name)
        {
            return Some(Reply {
                text: greeting,
                kind: ReplyKind::Greeting,
            });
        }

        if self.mode != BotMode::Quiet
            && let Some(category) = self.book.categories.iter().find(|c| c.matcher.is_match(text))
        {
            let probability = match self.mode {
                BotMode::Hype => (category.probability * 2.0).min(1.0),
                _ => category.probability,
            };
            if self.rng.gen_bool(probability)
                && let Some(phrase) = pick(&mut self.rng, &category.phrases, name)
            {
                return Some(Reply {
                    text: phrase,
                    kind: ReplyKind::Keyword(category.name.clone()),
                });
            }
        }

        if let Some(faq) = self.book.faq.iter().find(|f| f.matcher.is_match(text)) {
            return Some(Reply {
                text: faq.answer.replace("{name}", name),
                kind: ReplyKind::Faq,
            });
        }

        if self.mode != BotMode::Quiet
            && self.rng.gen_bool(self.book.ambient_probability)
            && let Some(line) = pick(&mut self.rng, &self.book.ambient, name)
        {
            return Some(Reply {
                text: line,
                kind: ReplyKind::Ambient,
            });
        }

        None
    }

    /// Random pause before sending, so replies don't land instantly.
    pub fn human_delay(&mut self) -> Duration {
        let min = self.reply_delay.min.as_millis() as u64;
        let max = self.reply_delay.max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(self.rng.gen_range(min..=max))
    }
}

fn pick<R: Rng>(rng: &mut R, phrases: &[String], name: &str) -> Option<String> {
    phrases.choose(rng).map(|p| p.replace("{name}", name))
}
