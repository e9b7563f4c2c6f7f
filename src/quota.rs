//! Daily API quota bookkeeping.
//!
//! Every outbound platform call has a fixed unit cost. Calls that would push
//! the day's total past the ceiling are refused up front instead of being
//! made and failing.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Outbound call types and their unit costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCall {
    Search,
    VideoDetails,
    ListMessages,
    InsertMessage,
}

impl ApiCall {
    pub fn cost(self) -> u32 {
        match self {
            ApiCall::Search => 100,
            ApiCall::VideoDetails => 1,
            ApiCall::ListMessages => 5,
            ApiCall::InsertMessage => 50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApiCall::Search => "search.list",
            ApiCall::VideoDetails => "videos.list",
            ApiCall::ListMessages => "liveChatMessages.list",
            ApiCall::InsertMessage => "liveChatMessages.insert",
        }
    }
}

/// Refusal returned when a call doesn't fit in the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub call: ApiCall,
    pub used: u32,
    pub limit: u32,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} costs {} units but only {} of {} remain today",
            self.call.as_str(),
            self.call.cost(),
            self.limit.saturating_sub(self.used),
            self.limit
        )
    }
}

impl std::error::Error for QuotaExceeded {}

pub struct QuotaGovernor {
    limit: u32,
    used: u32,
    timezone: Tz,
    resets_at: DateTime<Utc>,
}

impl QuotaGovernor {
    pub fn new(limit: u32, timezone: Tz, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            used: 0,
            timezone,
            resets_at: next_midnight(now, timezone),
        }
    }

    /// Reserve the cost of `call`, or refuse without touching the counter.
    pub fn try_spend(&mut self, call: ApiCall, now: DateTime<Utc>) -> Result<(), QuotaExceeded> {
        self.roll_over(now);
        let cost = call.cost();
        if self.used.saturating_add(cost) > self.limit {
            return Err(QuotaExceeded {
                call,
                used: self.used,
                limit: self.limit,
            });
        }
        self.used += cost;
        Ok(())
    }

    /// The platform reported the quota as spent; stop calling until the reset.
    pub fn exhaust(&mut self, now: DateTime<Utc>) {
        self.roll_over(now);
        self.used = self.limit;
    }

    pub fn used(&mut self, now: DateTime<Utc>) -> u32 {
        self.roll_over(now);
        self.used
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn resets_at(&self) -> DateTime<Utc> {
        self.resets_at
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        if now >= self.resets_at {
            self.used = 0;
            self.resets_at = next_midnight(now, self.timezone);
        }
    }
}

/// The first midnight in `timezone` strictly after `now`.
pub fn next_midnight(now: DateTime<Utc>, timezone: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&timezone);
    local
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| timezone.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now + TimeDelta::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_costs() {
        assert_eq!(ApiCall::Search.cost(), 100);
        assert_eq!(ApiCall::VideoDetails.cost(), 1);
        assert_eq!(ApiCall::ListMessages.cost(), 5);
        assert_eq!(ApiCall::InsertMessage.cost(), 50);
    }

    #[test]
    fn test_spend_accumulates() {
        let now = utc(2026, 3, 10, 12, 0);
        let mut quota = QuotaGovernor::new(10_000, Tz::UTC, now);
        quota.try_spend(ApiCall::Search, now).unwrap();
        quota.try_spend(ApiCall::ListMessages, now).unwrap();
        quota.try_spend(ApiCall::InsertMessage, now).unwrap();
        assert_eq!(quota.used(now), 155);
    }

    #[test]
    fn test_refuses_call_that_would_exceed_ceiling() {
        let now = utc(2026, 3, 10, 12, 0);
        let mut quota = QuotaGovernor::new(10_000, Tz::UTC, now);
        for _ in 0..99 {
            quota.try_spend(ApiCall::Search, now).unwrap();
        }
        for _ in 0..10 {
            quota.try_spend(ApiCall::ListMessages, now).unwrap();
        }
        assert_eq!(quota.used(now), 9950);

        let err = quota.try_spend(ApiCall::Search, now).unwrap_err();
        assert_eq!(err.call, ApiCall::Search);
        assert_eq!(err.used, 9950);
        assert_eq!(quota.used(now), 9950, "refusal must not change the counter");
        assert!(err.to_string().contains("50 of 10000"));

        // A cheaper call still fits exactly
        quota.try_spend(ApiCall::InsertMessage, now).unwrap();
        assert_eq!(quota.used(now), 10_000);
    }

    #[test]
    fn test_resets_after_midnight() {
        let evening = utc(2026, 3, 10, 23, 50);
        let mut quota = QuotaGovernor::new(200, Tz::UTC, evening);
        quota.try_spend(ApiCall::Search, evening).unwrap();
        quota.try_spend(ApiCall::Search, evening).unwrap();
        assert!(quota.try_spend(ApiCall::Search, evening).is_err());

        let after_midnight = utc(2026, 3, 11, 0, 1);
        assert_eq!(quota.used(after_midnight), 0);
        quota.try_spend(ApiCall::Search, after_midnight).unwrap();
        assert_eq!(quota.resets_at(), utc(2026, 3, 12, 0, 0));
    }

    #[test]
    fn test_exhaust_blocks_until_reset() {
        let now = utc(2026, 3, 10, 9, 0);
        let mut quota = QuotaGovernor::new(10_000, Tz::UTC, now);
        quota.exhaust(now);
        assert!(quota.try_spend(ApiCall::VideoDetails, now).is_err());
        assert!(quota.try_spend(ApiCall::VideoDetails, utc(2026, 3, 11, 0, 0)).is_ok());
    }

    #[test]
    fn test_next_midnight_in_timezone() {
        // 06:00 UTC is 23:00 the previous day in Los Angeles (PDT, UTC-7)
        let now = utc(2026, 7, 1, 6, 0);
        let midnight = next_midnight(now, chrono_tz::America::Los_Angeles);
        assert_eq!(midnight, utc(2026, 7, 1, 7, 0));
    }

    #[test]
    fn test_next_midnight_is_strictly_after_now() {
        let now = utc(2026, 3, 10, 0, 0);
        assert_eq!(next_midnight(now, Tz::UTC), utc(2026, 3, 11, 0, 0));
    }
}
