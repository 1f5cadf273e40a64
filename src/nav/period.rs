use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::error::WindowError;

/// 基準日からの周期数。`reference + n * period` の `n`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DateKey(i64);

impl DateKey {
    #[must_use]
    pub const fn new(index: i64) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn offset(self, periods: i64) -> Self {
        Self(self.0.saturating_add(periods))
    }

    /// `self - other` を周期数で返す。
    #[must_use]
    pub const fn periods_since(self, other: Self) -> i64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 固定の基準日時と周期長による日付の区切り。UTC 固定で、夏時間は扱わない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePeriod {
    reference: DateTime<Utc>,
    period: TimeDelta,
}

impl DatePeriod {
    /// # Errors
    /// 周期長が1ミリ秒未満の場合は [`WindowError::InvalidSettings`] を返す。
    pub fn new(reference: DateTime<Utc>, period: TimeDelta) -> Result<Self, WindowError> {
        if period.num_milliseconds() <= 0 {
            return Err(WindowError::InvalidSettings(format!(
                "period must be positive, got {period}"
            )));
        }
        Ok(Self { reference, period })
    }

    #[must_use]
    pub fn reference(&self) -> DateTime<Utc> {
        self.reference
    }

    #[must_use]
    pub fn period(&self) -> TimeDelta {
        self.period
    }

    /// `instant` が属する区間のキー。基準日より前は負のキーになる（切り捨て）。
    #[must_use]
    pub fn key_for(&self, instant: DateTime<Utc>) -> DateKey {
        let elapsed_ms = (instant - self.reference).num_milliseconds();
        DateKey(elapsed_ms.div_euclid(self.period.num_milliseconds()))
    }

    /// キーの区間開始時刻。
    #[must_use]
    pub fn start_of(&self, key: DateKey) -> DateTime<Utc> {
        let offset_ms = self.period.num_milliseconds().saturating_mul(key.index());
        TimeDelta::try_milliseconds(offset_ms)
            .and_then(|delta| self.reference.checked_add_signed(delta))
            .unwrap_or(if key.index() < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }
}
