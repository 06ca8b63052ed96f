use chrono::{Datelike, Days, NaiveDate, Utc};

/// Range tokens understood by [`resolve_at`].
pub const RANGE_TOKENS: [&str; 5] = ["7d", "30d", "90d", "ytd", "all"];

/// Lower bound used for "all" and for any token that is not recognized.
pub fn epoch_floor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Source of "today" for the analyzer.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock pinned to a single day.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Maps a range token to the first day it covers, relative to `today`.
///
/// An `Nd` token covers the N most recent days ending with `today`, so a
/// record dated exactly N days back falls outside it. Unknown tokens never
/// fail; they fall back to the epoch floor.
pub fn resolve_at(token: &str, today: NaiveDate) -> NaiveDate {
    let last_days = |n: u64| {
        today
            .checked_sub_days(Days::new(n - 1))
            .unwrap_or_else(epoch_floor)
    };

    match token.to_lowercase().as_str() {
        "7d" => last_days(7),
        "30d" => last_days(30),
        "90d" => last_days(90),
        "ytd" => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        _ => epoch_floor(),
    }
}

pub fn resolve(token: &str) -> NaiveDate {
    resolve_at(token, SystemClock.today())
}
