//! Response book: keywords, trigger odds and phrase sets.
//!
//! The built-in book can be replaced by a JSON file with the same shape.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Keyword-triggered reactions with their own trigger probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
    pub probability: f64,
    pub phrases: Vec<String>,
}

/// Question with a fixed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub keywords: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBook {
    pub greeting_keywords: Vec<String>,
    /// `{name}` is replaced with the author's display name.
    pub greetings: Vec<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub faq: Vec<FaqEntry>,
    #[serde(default)]
    pub ambient_probability: f64,
    #[serde(default)]
    pub ambient: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ResponseBook {
    fn default() -> Self {
        Self {
            greeting_keywords: strings(&[
                "hi", "hello", "hey", "heya", "hiya", "yo", "sup", "hola", "howdy",
                "good morning", "good evening", "good afternoon",
            ]),
            greetings: strings(&[
                "Hey {name}, welcome to the stream! 👋",
                "Welcome in, {name}! 🎉",
                "Hi {name}! Glad you made it 😊",
                "{name} has arrived! Welcome 🙌",
            ]),
            categories: vec![
                Category {
                    name: "hype".into(),
                    keywords: strings(&["pog", "poggers", "let's go", "lets go", "hype", "clutch", "insane", "gg"]),
                    probability: 0.35,
                    phrases: strings(&["LET'S GOOO 🔥", "That was huge! 🚀", "Chat is on fire today 🔥", "GG! 🎮"]),
                },
                Category {
                    name: "funny".into(),
                    keywords: strings(&["lol", "lmao", "haha", "rofl", "😂", "🤣"]),
                    probability: 0.25,
                    phrases: strings(&["😂😂😂", "Chat is wild today 🤣", "I can't stop laughing 😆"]),
                },
                Category {
                    name: "love".into(),
                    keywords: strings(&["love this", "love you", "best stream", "<3", "❤️"]),
                    probability: 0.3,
                    phrases: strings(&["❤️❤️❤️", "Much love, {name}! 💜", "Appreciate you, {name}! 🙏"]),
                },
                Category {
                    name: "sad".into(),
                    keywords: strings(&["rip", "unlucky", "sad", "f in chat"]),
                    probability: 0.4,
                    phrases: strings(&["F 😔", "Unlucky! Next one's ours 💪", "Sending good vibes 🫂"]),
                },
            ],
            faq: vec![
                FaqEntry {
                    keywords: strings(&["schedule", "when do you stream", "what time is stream"]),
                    answer: "📅 Streams happen most days. Hit the bell so you don't miss the next one!".into(),
                },
                FaqEntry {
                    keywords: strings(&["discord"]),
                    answer: "💬 The Discord link is in the description below the stream!".into(),
                },
                FaqEntry {
                    keywords: strings(&["what game", "what are you playing"]),
                    answer: "🎮 Check the stream title for what we're playing today!".into(),
                },
                FaqEntry {
                    keywords: strings(&["pc specs", "your setup", "what specs"]),
                    answer: "🖥️ The full setup is listed on the channel's About page.".into(),
                },
                FaqEntry {
                    keywords: strings(&["are you a bot", "is this a bot"]),
                    answer: "🤖 Beep boop! I'm the chat helper bot.".into(),
                },
            ],
            ambient_probability: 0.03,
            ambient: strings(&[
                "Enjoying the stream? Don't forget to like 👍",
                "Chat is awesome today 💯",
                "Remember to stay hydrated 💧",
                "Thanks for hanging out, everyone! 🙌",
            ]),
        }
    }
}

impl ResponseBook {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::ReadFile { path: path.clone(), source: e })?;
        let book: ResponseBook = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: path.clone(), source: e })?;
        book.validate()?;
        Ok(book)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.greetings.is_empty() && !self.greeting_keywords.is_empty() {
            return Err(ConfigError::Validation("greeting_keywords need at least one greeting".into()));
        }
        for category in &self.categories {
            if category.phrases.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "category '{}' has no phrases",
                    category.name
                )));
            }
            if !(0.0..=1.0).contains(&category.probability) {
                return Err(ConfigError::Validation(format!(
                    "category '{}' probability must be between 0 and 1",
                    category.name
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.ambient_probability) {
            return Err(ConfigError::Validation("ambient_probability must be between 0 and 1".into()));
        }
        if self.ambient_probability > 0.0 && self.ambient.is_empty() {
            return Err(ConfigError::Validation("ambient_probability is set but ambient is empty".into()));
        }
        Ok(())
    }

    /// Build the keyword matchers.
    pub fn compile(self) -> Result<CompiledBook, regex::Error> {
        let greeting = KeywordMatcher::new(&self.greeting_keywords)?;
        let categories = self
            .categories
            .into_iter()
            .map(|c| {
                Ok(CompiledCategory {
                    matcher: KeywordMatcher::new(&c.keywords)?,
                    name: c.name,
                    probability: c.probability.clamp(0.0, 1.0),
                    phrases: c.phrases,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let faq = self
            .faq
            .into_iter()
            .map(|f| {
                Ok(CompiledFaq {
                    matcher: KeywordMatcher::new(&f.keywords)?,
                    answer: f.answer,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(CompiledBook {
            greeting,
            greetings: self.greetings,
            categories,
            faq,
            ambient_probability: self.ambient_probability.clamp(0.0, 1.0),
            ambient: self.ambient,
        })
    }
}

/// Case-insensitive keyword matcher.
///
/// Keywords that start or end with a word character only match on word
/// boundaries, so "hi" does not fire on "this".
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new(keywords: &[String]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(keyword_pattern)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { regex: None });
        }

        let regex = Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn keyword_pattern(keyword: &str) -> String {
    let start = if keyword.starts_with(is_word_char) { r"\b" } else { "" };
    let end = if keyword.ends_with(is_word_char) { r"\b" } else { "" };
    format!("{start}{}{end}", regex::escape(keyword))
}

#[derive(Debug)]
pub struct CompiledCategory {
    pub name: String,
    pub matcher: KeywordMatcher,
    pub probability: f64,
    pub phrases: Vec<String>,
}

#[derive(Debug)]
pub struct CompiledFaq {
    pub matcher: KeywordMatcher,
    pub answer: String,
}

#[derive(Debug)]
pub struct CompiledBook {
    pub greeting: KeywordMatcher,
    pub greetings: Vec<String>,
    pub categories: Vec<CompiledCategory>,
    pub faq: Vec<CompiledFaq>,
    pub ambient_probability: f64,
    pub ambient: Vec<String>,
}
