//! Reply rate limiting.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::config::RateLimits;
use crate::quota::next_midnight;

/// Why a reply was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    HourlyCap(u32),
    DailyCap(u32),
    TooSoon,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::HourlyCap(cap) => write!(f, "hourly cap of {cap} replies reached"),
            Refusal::DailyCap(cap) => write!(f, "daily cap of {cap} replies reached"),
            Refusal::TooSoon => write!(f, "minimum gap between replies not elapsed"),
        }
    }
}

pub struct RateLimiter {
    limits: RateLimits,
    timezone: Tz,
    /// Reply times within the trailing hour, oldest first.
    recent: VecDeque<DateTime<Utc>>,
    today: u32,
    day_resets_at: DateTime<Utc>,
    last_reply: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits, timezone: Tz, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            timezone,
            recent: VecDeque::new(),
            today: 0,
            day_resets_at: next_midnight(now, timezone),
            last_reply: None,
        }
    }

    /// Whether a reply may be sent at `now`.
    pub fn check(&mut self, now: DateTime<Utc>) -> Result<(), Refusal> {
        self.expire(now);

        if self.today >= self.limits.max_per_day {
            return Err(Refusal::DailyCap(self.limits.max_per_day));
        }
        if self.recent.len() as u32 >= self.limits.max_per_hour {
            return Err(Refusal::HourlyCap(self.limits.max_per_hour));
        }
        if let Some(last) = self.last_reply {
            let elapsed = (now - last).to_std().unwrap_or_default();
            if elapsed < self.limits.min_gap {
                return Err(Refusal::TooSoon);
            }
        }
        Ok(())
    }

    /// Count a reply that was sent at `now`.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.expire(now);
        self.recent.push_back(now);
        self.today += 1;
        self.last_reply = Some(now);
    }

    pub fn replies_this_hour(&mut self, now: DateTime<Utc>) -> u32 {
        self.expire(now);
        self.recent.len() as u32
    }

    pub fn replies_today(&mut self, now: DateTime<Utc>) -> u32 {
        self.expire(now);
        self.today
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        let hour_ago = now - TimeDelta::hours(1);
        while self.recent.front().is_some_and(|t| *t <= hour_ago) {
            self.recent.pop_front();
        }
        if now >= self.day_resets_at {
            self.today = 0;
            self.day_resets_at = next_midnight(now, self.timezone);
        }
    }
}
