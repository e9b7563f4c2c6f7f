use chrono_tz::Tz;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::oauth::TokenSet;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is not set (or empty).
    Missing(&'static str),
    /// An environment variable is set but can't be used.
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    /// Failed to read a file referenced by the config.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse a JSON file referenced by the config.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// `YOUTUBE_TOKENS` is not a valid serialized token set.
    ParseTokens(serde_json::Error),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "missing required environment variable {}", var),
            Self::Invalid { var, value, reason } => {
                write!(f, "invalid value '{}' for {}: {}", value, var, reason)
            }
            Self::ReadFile { path, source } => {
                write!(f, "failed to read file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse file '{}': {}", path.display(), source)
            }
            Self::ParseTokens(source) => write!(f, "failed to parse YOUTUBE_TOKENS: {}", source),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::ParseTokens(source) => Some(source),
            Self::Missing(_) | Self::Invalid { .. } | Self::Validation(_) => None,
        }
    }
}

/// Daily window (in the configured timezone) during which streams are expected.
///
/// `start == end` means the whole day. A window with `start > end` wraps past
/// midnight, e.g. 22..2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingHours {
    pub start: u32,
    pub end: u32,
}

impl StreamingHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Reply rate ceilings.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub max_per_hour: u32,
    pub max_per_day: u32,
    pub min_gap: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_per_hour: 20,
            max_per_day: 150,
            min_gap: Duration::from_secs(30),
        }
    }
}

/// Bounds for the random pause before a reply is sent.
#[derive(Debug, Clone, Copy)]
pub struct ReplyDelay {
    pub min: Duration,
    pub max: Duration,
}

impl Default for ReplyDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(2000),
            max: Duration::from_millis(6000),
        }
    }
}

pub struct Config {
    pub api_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub channel_id: String,
    /// Display name the bot posts under. Messages from this name are ignored.
    pub bot_name: String,
    /// Display name of the owner, the only author allowed to run `!` commands.
    pub owner_username: String,
    pub port: u16,
    pub streaming_hours: Option<StreamingHours>,
    /// Timezone for the streaming window and the daily resets.
    pub timezone: Tz,
    /// OAuth token set. Without it the bot runs read-only.
    pub tokens: Option<TokenSet>,
    /// JSON file overriding the built-in response book.
    pub responses_file: Option<PathBuf>,
    pub stream_check_interval: Duration,
    /// Lower bound on the wait between chat page fetches.
    pub min_poll_interval: Duration,
    pub error_retry: Duration,
    pub rate_limits: RateLimits,
    pub reply_delay: ReplyDelay,
    pub daily_quota_limit: u32,
    /// Public URL to ping periodically so free hosting tiers don't idle the process.
    pub keepalive_url: Option<String>,
    pub dry_run: bool,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let api_key = env.required("YOUTUBE_API_KEY")?;
        let client_id = env.required("YOUTUBE_CLIENT_ID")?;
        let client_secret = env.required("YOUTUBE_CLIENT_SECRET")?;
        let channel_id = env.required("YOUTUBE_CHANNEL_ID")?;
        let bot_name = env.required("BOT_NAME")?;
        let owner_username = env.required("OWNER_USERNAME")?;

        let start = env.parsed::<u32>("STREAM_START_HOUR")?;
        let end = env.parsed::<u32>("STREAM_END_HOUR")?;
        let streaming_hours = match (start, end) {
            (Some(start), Some(end)) => {
                if start > 23 || end > 23 {
                    return Err(ConfigError::Validation(
                        "STREAM_START_HOUR and STREAM_END_HOUR must be between 0 and 23".into(),
                    ));
                }
                Some(StreamingHours { start, end })
            }
            (None, None) => None,
            _ => {
                return Err(ConfigError::Validation(
                    "STREAM_START_HOUR and STREAM_END_HOUR must be set together".into(),
                ));
            }
        };

        let timezone = match env.optional("BOT_TIMEZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| ConfigError::Invalid {
                var: "BOT_TIMEZONE",
                value: name.clone(),
                reason: e.to_string(),
            })?,
            None => Tz::UTC,
        };

        let tokens = match env.optional("YOUTUBE_TOKENS") {
            Some(raw) => Some(serde_json::from_str::<TokenSet>(&raw).map_err(ConfigError::ParseTokens)?),
            None => None,
        };
        if let Some(ref t) = tokens
            && t.access_token.is_none()
            && t.refresh_token.is_none()
        {
            return Err(ConfigError::Validation(
                "YOUTUBE_TOKENS needs an access_token or a refresh_token".into(),
            ));
        }

        let defaults = RateLimits::default();
        let rate_limits = RateLimits {
            max_per_hour: env.parsed("MAX_REPLIES_PER_HOUR")?.unwrap_or(defaults.max_per_hour),
            max_per_day: env.parsed("MAX_REPLIES_PER_DAY")?.unwrap_or(defaults.max_per_day),
            min_gap: env
                .parsed("MIN_REPLY_GAP_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.min_gap),
        };

        let delay_defaults = ReplyDelay::default();
        let reply_delay = ReplyDelay {
            min: env
                .parsed("REPLY_DELAY_MIN_MS")?
                .map(Duration::from_millis)
                .unwrap_or(delay_defaults.min),
            max: env
                .parsed("REPLY_DELAY_MAX_MS")?
                .map(Duration::from_millis)
                .unwrap_or(delay_defaults.max),
        };
        if reply_delay.min > reply_delay.max {
            return Err(ConfigError::Validation(
                "REPLY_DELAY_MIN_MS must not exceed REPLY_DELAY_MAX_MS".into(),
            ));
        }

        let stream_check_interval = Duration::from_secs(env.parsed("STREAM_CHECK_INTERVAL_SECS")?.unwrap_or(300));
        if stream_check_interval.is_zero() {
            return Err(ConfigError::Validation("STREAM_CHECK_INTERVAL_SECS must be positive".into()));
        }
        let min_poll_interval = Duration::from_millis(env.parsed("MIN_POLL_INTERVAL_MS")?.unwrap_or(10_000));
        if min_poll_interval.is_zero() {
            return Err(ConfigError::Validation("MIN_POLL_INTERVAL_MS must be positive".into()));
        }
        let error_retry = Duration::from_secs(env.parsed("ERROR_RETRY_SECS")?.unwrap_or(30));
        if error_retry.is_zero() {
            return Err(ConfigError::Validation("ERROR_RETRY_SECS must be positive".into()));
        }

        Ok(Self {
            api_key,
            client_id,
            client_secret,
            channel_id,
            bot_name,
            owner_username,
            port: env.parsed("PORT")?.unwrap_or(3000),
            streaming_hours,
            timezone,
            tokens,
            responses_file: env.optional("RESPONSES_FILE").map(PathBuf::from),
            stream_check_interval,
            min_poll_interval,
            error_retry,
            rate_limits,
            reply_delay,
            daily_quota_limit: env.parsed("DAILY_QUOTA_LIMIT")?.unwrap_or(10_000),
            keepalive_url: env.optional("KEEPALIVE_URL"),
            dry_run: env.flag("DRY_RUN")?,
            log_dir: env
                .optional("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
        })
    }

    /// Whether replies can actually be posted.
    pub fn can_send(&self) -> bool {
        !self.dry_run && self.tokens.is_some()
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing(var))
    }

    fn parsed<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(var) {
            Some(value) => value.parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
                var,
                value: value.clone(),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn flag(&self, var: &'static str) -> Result<bool, ConfigError> {
        match self.optional(var).map(|v| v.to_lowercase()) {
            None => Ok(false),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    var,
                    value: v,
                    reason: "expected true or false".into(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("YOUTUBE_API_KEY", "AIzaTestKey".to_string()),
            ("YOUTUBE_CLIENT_ID", "client-id".to_string()),
            ("YOUTUBE_CLIENT_SECRET", "client-secret".to_string()),
            ("YOUTUBE_CHANNEL_ID", "UC1234567890".to_string()),
            ("BOT_NAME", "PulseBot".to_string()),
            ("OWNER_USERNAME", "@StreamerSam".to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_minimal_config() {
        let config = load(&base_vars()).expect("should load minimal config");
        assert_eq!(config.channel_id, "UC1234567890");
        assert_eq!(config.port, 3000);
        assert_eq!(config.daily_quota_limit, 10_000);
        assert_eq!(config.timezone, Tz::UTC);
        assert!(config.streaming_hours.is_none());
        assert!(config.tokens.is_none());
        assert!(!config.can_send());
        assert_eq!(config.min_poll_interval, Duration::from_millis(10_000));
    }

    #[test]
    fn test_missing_required_var() {
        let mut vars = base_vars();
        vars.remove("YOUTUBE_CHANNEL_ID");
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Missing("YOUTUBE_CHANNEL_ID")));
        assert!(err.to_string().contains("YOUTUBE_CHANNEL_ID"));
    }

    #[test]
    fn test_blank_required_var_counts_as_missing() {
        let mut vars = base_vars();
        vars.insert("BOT_NAME", "   ".to_string());
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Missing("BOT_NAME")));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = base_vars();
        vars.insert("PORT", "eighty".to_string());
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn test_streaming_hours_need_both_bounds() {
        let mut vars = base_vars();
        vars.insert("STREAM_START_HOUR", "18".to_string());
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Validation(_)));

        vars.insert("STREAM_END_HOUR", "23".to_string());
        let config = load(&vars).unwrap();
        assert_eq!(config.streaming_hours, Some(StreamingHours { start: 18, end: 23 }));
    }

    #[test]
    fn test_streaming_hours_out_of_range() {
        let mut vars = base_vars();
        vars.insert("STREAM_START_HOUR", "18".to_string());
        vars.insert("STREAM_END_HOUR", "25".to_string());
        assert!(matches!(assert_err(load(&vars)), ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_poll_floor_rejected() {
        let mut vars = base_vars();
        vars.insert("MIN_POLL_INTERVAL_MS", "0".to_string());
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("MIN_POLL_INTERVAL_MS"));
    }

    #[test]
    fn test_zero_error_retry_rejected() {
        let mut vars = base_vars();
        vars.insert("ERROR_RETRY_SECS", "0".to_string());
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("ERROR_RETRY_SECS"));
    }

    #[test]
    fn test_streaming_hours_window() {
        let evening = StreamingHours { start: 18, end: 23 };
        assert!(evening.contains(18));
        assert!(evening.contains(22));
        assert!(!evening.contains(23));
        assert!(!evening.contains(9));

        let overnight = StreamingHours { start: 22, end: 2 };
        assert!(overnight.contains(23));
        assert!(overnight.contains(1));
        assert!(!overnight.contains(2));
        assert!(!overnight.contains(12));

        let all_day = StreamingHours { start: 5, end: 5 };
        assert!(all_day.contains(0));
        assert!(all_day.contains(17));
    }

    #[test]
    fn test_timezone() {
        let mut vars = base_vars();
        vars.insert("BOT_TIMEZONE", "America/Los_Angeles".to_string());
        assert_eq!(load(&vars).unwrap().timezone, chrono_tz::America::Los_Angeles);

        vars.insert("BOT_TIMEZONE", "Mars/Olympus".to_string());
        assert!(matches!(
            assert_err(load(&vars)),
            ConfigError::Invalid { var: "BOT_TIMEZONE", .. }
        ));
    }

    #[test]
    fn test_tokens_enable_sending() {
        let mut vars = base_vars();
        vars.insert(
            "YOUTUBE_TOKENS",
            r#"{"access_token":"ya29.abc","refresh_token":"1//xyz","expiry_date":1700000000000}"#.to_string(),
        );
        let config = load(&vars).unwrap();
        assert!(config.can_send());
        let tokens = config.tokens.unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//xyz"));
    }

    #[test]
    fn test_dry_run_disables_sending() {
        let mut vars = base_vars();
        vars.insert("YOUTUBE_TOKENS", r#"{"refresh_token":"1//xyz"}"#.to_string());
        vars.insert("DRY_RUN", "true".to_string());
        assert!(!load(&vars).unwrap().can_send());
    }

    #[test]
    fn test_invalid_tokens_json() {
        let mut vars = base_vars();
        vars.insert("YOUTUBE_TOKENS", "{ not json".to_string());
        assert!(matches!(assert_err(load(&vars)), ConfigError::ParseTokens(_)));
    }

    #[test]
    fn test_tokens_without_any_token() {
        let mut vars = base_vars();
        vars.insert("YOUTUBE_TOKENS", r#"{"scope":"youtube"}"#.to_string());
        assert!(matches!(assert_err(load(&vars)), ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_flag() {
        let mut vars = base_vars();
        vars.insert("DRY_RUN", "maybe".to_string());
        assert!(matches!(assert_err(load(&vars)), ConfigError::Invalid { var: "DRY_RUN", .. }));
    }

    #[test]
    fn test_reply_delay_bounds() {
        let mut vars = base_vars();
        vars.insert("REPLY_DELAY_MIN_MS", "5000".to_string());
        vars.insert("REPLY_DELAY_MAX_MS", "1000".to_string());
        assert!(matches!(assert_err(load(&vars)), ConfigError::Validation(_)));
    }

    #[test]
    fn test_rate_limit_overrides() {
        let mut vars = base_vars();
        vars.insert("MAX_REPLIES_PER_HOUR", "5".to_string());
        vars.insert("MIN_REPLY_GAP_SECS", "90".to_string());
        let config = load(&vars).unwrap();
        assert_eq!(config.rate_limits.max_per_hour, 5);
        assert_eq!(config.rate_limits.max_per_day, 150);
        assert_eq!(config.rate_limits.min_gap, Duration::from_secs(90));
    }
}
