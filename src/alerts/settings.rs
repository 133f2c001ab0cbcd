use std::time::Duration;

use anyhow::{ensure, Result};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::config::{env_flag, env_or};

/// Tunables of the alert lifecycle. Passed explicitly into every operation
/// so callers (and tests) can vary them per call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertSettings {
    pub anticipation_days: i64,
    pub retention_days: i64,
    pub duplicate_window_hours: i64,
    pub scan_buffer_minutes: i64,
    pub creation_buffer_minutes: i64,
    pub send_email: bool,
    pub send_hour: Option<u32>,
    pub business_days_only: bool,
    pub max_retries: i32,
    pub retry_backoff: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            anticipation_days: 7,
            retention_days: 90,
            duplicate_window_hours: 24,
            scan_buffer_minutes: 30,
            creation_buffer_minutes: 60,
            send_email: true,
            send_hour: None,
            business_days_only: false,
            max_retries: 3,
            retry_backoff: Duration::from_secs(5 * 60),
        }
    }
}

impl AlertSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let send_hour = match env_or::<i64>("ALERT_SEND_HOUR", -1)? {
            hour if hour < 0 => None,
            hour => Some(hour as u32),
        };
        let settings = Self {
            anticipation_days: env_or("ALERT_ANTICIPATION_DAYS", defaults.anticipation_days)?,
            retention_days: env_or("ALERT_RETENTION_DAYS", defaults.retention_days)?,
            duplicate_window_hours: env_or(
                "ALERT_DUPLICATE_WINDOW_HOURS",
                defaults.duplicate_window_hours,
            )?,
            scan_buffer_minutes: env_or("ALERT_SCAN_BUFFER_MINUTES", defaults.scan_buffer_minutes)?,
            creation_buffer_minutes: env_or(
                "ALERT_CREATION_BUFFER_MINUTES",
                defaults.creation_buffer_minutes,
            )?,
            send_email: env_flag("ALERT_SEND_EMAIL", defaults.send_email),
            send_hour,
            business_days_only: env_flag("ALERT_BUSINESS_DAYS_ONLY", defaults.business_days_only),
            max_retries: env_or("ALERT_MAX_RETRIES", defaults.max_retries)?,
            retry_backoff: Duration::from_secs(env_or(
                "ALERT_RETRY_BACKOFF_SECONDS",
                defaults.retry_backoff.as_secs(),
            )?),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=90).contains(&self.anticipation_days),
            "ALERT_ANTICIPATION_DAYS must be between 1 and 90"
        );
        ensure!(self.retention_days >= 1, "ALERT_RETENTION_DAYS must be positive");
        ensure!(
            self.duplicate_window_hours >= 0,
            "ALERT_DUPLICATE_WINDOW_HOURS must not be negative"
        );
        ensure!(
            self.scan_buffer_minutes >= 0 && self.creation_buffer_minutes >= 0,
            "alert buffers must not be negative"
        );
        if let Some(hour) = self.send_hour {
            ensure!(hour < 24, "ALERT_SEND_HOUR must be between 0 and 23");
        }
        ensure!(self.max_retries >= 0, "ALERT_MAX_RETRIES must not be negative");
        Ok(())
    }

    pub fn duplicate_window(&self) -> ChronoDuration {
        ChronoDuration::hours(self.duplicate_window_hours)
    }

    /// Fire time of an alert created by the periodic due-date scan.
    pub fn scan_fire_at(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.adjust_fire_at(now + ChronoDuration::minutes(self.scan_buffer_minutes))
    }

    /// Fire time of an alert created when a case is created or by the bulk
    /// due-alert action.
    pub fn creation_fire_at(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.adjust_fire_at(now + ChronoDuration::minutes(self.creation_buffer_minutes))
    }

    fn adjust_fire_at(&self, candidate: NaiveDateTime) -> NaiveDateTime {
        let send_time = self
            .send_hour
            .and_then(|hour| NaiveTime::from_hms_opt(hour, 0, 0));
        let mut at = candidate;

        if let Some(send_time) = send_time {
            if at.time().hour() < send_time.hour() {
                at = at.date().and_time(send_time);
            }
        }

        if self.business_days_only {
            while matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
                let next_day = at.date() + ChronoDuration::days(1);
                at = next_day.and_time(send_time.unwrap_or_else(|| at.time()));
            }
        }

        at
    }

    /// Delay before the next delivery attempt after `attempts` failed ones,
    /// or `None` once the retry budget is spent.
    pub fn retry_delay(&self, attempts: i32) -> Option<Duration> {
        (attempts <= self.max_retries).then_some(self.retry_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = AlertSettings::default();
        assert_eq!(settings.anticipation_days, 7);
        assert_eq!(settings.retention_days, 90);
        assert_eq!(settings.duplicate_window(), ChronoDuration::hours(24));
        assert_eq!(settings.retry_backoff, Duration::from_secs(300));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn fire_times_add_a_short_buffer() {
        let settings = AlertSettings::default();
        let now = at(2024, 3, 13, 10, 0);
        assert_eq!(settings.scan_fire_at(now), at(2024, 3, 13, 10, 30));
        assert_eq!(settings.creation_fire_at(now), at(2024, 3, 13, 11, 0));
    }

    #[test]
    fn send_hour_defers_early_alerts() {
        let settings = AlertSettings {
            send_hour: Some(9),
            ..AlertSettings::default()
        };
        assert_eq!(
            settings.scan_fire_at(at(2024, 3, 13, 6, 0)),
            at(2024, 3, 13, 9, 0)
        );
        assert_eq!(
            settings.scan_fire_at(at(2024, 3, 13, 14, 0)),
            at(2024, 3, 13, 14, 30)
        );
    }

    #[test]
    fn business_days_only_moves_weekend_alerts_to_monday() {
        let settings = AlertSettings {
            business_days_only: true,
            send_hour: Some(9),
            ..AlertSettings::default()
        };
        // 2024-03-16 is a Saturday.
        assert_eq!(
            settings.scan_fire_at(at(2024, 3, 16, 15, 0)),
            at(2024, 3, 18, 9, 0)
        );
        assert_eq!(
            settings.scan_fire_at(at(2024, 3, 15, 15, 0)),
            at(2024, 3, 15, 15, 30)
        );
    }

    #[test]
    fn retries_stop_after_budget() {
        let settings = AlertSettings::default();
        let mut attempts = 0;
        loop {
            attempts += 1;
            if settings.retry_delay(attempts).is_none() {
                break;
            }
        }
        assert_eq!(attempts, 4);
        assert_eq!(settings.retry_delay(1), Some(Duration::from_secs(300)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let settings = AlertSettings {
            anticipation_days: 0,
            ..AlertSettings::default()
        };
        assert!(settings.validate().is_err());
        let settings = AlertSettings {
            send_hour: Some(24),
            ..AlertSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
