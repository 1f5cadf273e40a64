use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::nav::period::DatePeriod;

/// 期間境界から `delay` 遅れた時刻に発火するケイデンス。
#[derive(Debug, Clone)]
pub(crate) struct PeriodCadence {
    period: DatePeriod,
    delay: TimeDelta,
}

impl PeriodCadence {
    pub(crate) fn new(period: DatePeriod, delay: Duration) -> Self {
        let delay = TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
        Self { period, delay }
    }

    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut key = self.period.key_for(now - self.delay);
        loop {
            let candidate = self.period.start_of(key) + self.delay;
            if candidate >= now {
                return candidate;
            }
            key = key.offset(1);
        }
    }
}

pub(crate) fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn cadence(delay_secs: u64) -> PeriodCadence {
        let period = DatePeriod::new(parse_utc("2023-07-20T17:00:00Z"), TimeDelta::days(1))
            .expect("valid period");
        PeriodCadence::new(period, Duration::from_secs(delay_secs))
    }

    #[test]
    fn next_run_same_day_when_before_trigger() {
        let next = cadence(300).next_run_from(parse_utc("2023-08-10T16:00:00Z"));
        assert_eq!(next, parse_utc("2023-08-10T17:05:00Z"));
    }

    #[test]
    fn next_run_waits_for_delay_after_boundary() {
        let next = cadence(300).next_run_from(parse_utc("2023-08-10T17:02:00Z"));
        assert_eq!(next, parse_utc("2023-08-10T17:05:00Z"));
    }

    #[test]
    fn next_run_next_day_when_past_trigger() {
        let next = cadence(300).next_run_from(parse_utc("2023-08-10T18:00:00Z"));
        assert_eq!(next, parse_utc("2023-08-11T17:05:00Z"));
    }

    #[test]
    fn next_run_immediate_when_exact_trigger() {
        let now = parse_utc("2023-08-10T17:05:00Z");
        assert_eq!(cadence(300).next_run_from(now), now);
    }

    #[test]
    fn duration_until_past_is_zero() {
        let now = parse_utc("2023-08-10T17:05:00Z");
        assert_eq!(duration_until(now - TimeDelta::seconds(5), now), Duration::ZERO);
    }
}
