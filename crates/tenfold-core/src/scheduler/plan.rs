//! Fixed wall-clock triggers in a configured zone.

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday,
};
use serde::Serialize;

use crate::clock::local_date;
use crate::error::ConfigError;
use crate::jobs::ReminderKind;
use crate::storage::ScheduleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "job", content = "kind", rename_all = "snake_case")]
pub enum Job {
    Issue,
    Remind(ReminderKind),
    CloseDay,
    Digest,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Issue => write!(f, "issue"),
            Job::Remind(ReminderKind::Regular) => write!(f, "remind"),
            Job::Remind(ReminderKind::Final) => write!(f, "remind-final"),
            Job::CloseDay => write!(f, "close-day"),
            Job::Digest => write!(f, "digest"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub at: NaiveTime,
    /// Fires only on this weekday when set; daily otherwise.
    pub weekday: Option<Weekday>,
    pub job: Job,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePlan {
    offset: FixedOffset,
    triggers: Vec<Trigger>,
}

/// Parse `UTC` or a `+HH:MM` / `-HH:MM` offset.
pub fn parse_offset(s: &str) -> Result<FixedOffset, ConfigError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Ok(Utc.fix());
    }
    DateTime::parse_from_str(&format!("2000-01-01 00:00 {s}"), "%Y-%m-%d %H:%M %z")
        .map(|dt| *dt.offset())
        .map_err(|_| ConfigError::invalid("schedule.timezone", format!("invalid offset '{s}'")))
}

fn parse_time(key: &str, s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| ConfigError::invalid(key, format!("expected HH:MM, got '{s}'")))
}

impl SchedulePlan {
    pub fn new(offset: FixedOffset, triggers: Vec<Trigger>) -> Self {
        Self { offset, triggers }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        let offset = parse_offset(&config.timezone)?;
        let mut triggers = vec![Trigger {
            at: parse_time("schedule.issue_at", &config.issue_at)?,
            weekday: None,
            job: Job::Issue,
        }];

        let last = config.reminders.len().saturating_sub(1);
        for (i, at) in config.reminders.iter().enumerate() {
            let kind = if i == last {
                ReminderKind::Final
            } else {
                ReminderKind::Regular
            };
            triggers.push(Trigger {
                at: parse_time("schedule.reminders", at)?,
                weekday: None,
                job: Job::Remind(kind),
            });
        }

        triggers.push(Trigger {
            at: parse_time("schedule.close_at", &config.close_at)?,
            weekday: None,
            job: Job::CloseDay,
        });

        if config.digest_enabled {
            let weekday = config.digest_weekday.trim().parse::<Weekday>().map_err(|_| {
                ConfigError::invalid(
                    "schedule.digest_weekday",
                    format!("unknown weekday '{}'", config.digest_weekday),
                )
            })?;
            triggers.push(Trigger {
                at: parse_time("schedule.digest_at", &config.digest_at)?,
                weekday: Some(weekday),
                job: Job::Digest,
            });
        }

        Ok(Self { offset, triggers })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Calendar date of `now` in the configured zone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        local_date(now, self.offset)
    }

    /// Local time that starts a new participant day. Set only when the close
    /// trigger runs after midnight but before the issue, so the small hours
    /// still belong to the day being closed.
    fn rollover(&self) -> Option<NaiveTime> {
        let at = |job: Job| self.triggers.iter().find(|t| t.job == job).map(|t| t.at);
        let close = at(Job::CloseDay)?;
        let issue = at(Job::Issue)?;
        (close < issue).then_some(close)
    }

    /// The participant day open at `now`: the local date, or the previous one
    /// while an after-midnight close is still pending.
    pub fn open_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = now.with_timezone(&self.offset);
        let date = local.date_naive();
        match self.rollover() {
            Some(rollover) if local.time() < rollover => date.pred_opt().unwrap_or(date),
            _ => date,
        }
    }

    /// The participant day a job firing at `at` acts on. A close firing at the
    /// rollover instant closes the day that just ended.
    pub fn date_for(&self, job: Job, at: DateTime<Utc>) -> NaiveDate {
        let date = self.open_date(at);
        let local = at.with_timezone(&self.offset);
        match (job, self.rollover()) {
            (Job::CloseDay, Some(rollover)) if local.time() == rollover => {
                date.pred_opt().unwrap_or(date)
            }
            _ => date,
        }
    }

    fn next_for(&self, trigger: &Trigger, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = self.today(now);
        (0..=7).find_map(|days| {
            let date = start + Duration::days(days);
            if trigger.weekday.is_some_and(|w| w != date.weekday()) {
                return None;
            }
            let at = self
                .offset
                .from_local_datetime(&date.and_time(trigger.at))
                .single()?
                .with_timezone(&Utc);
            (at > now).then_some(at)
        })
    }

    /// The earliest instant strictly after `now` at which some trigger fires,
    /// with every job due at that instant in configuration order.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<Job>)> {
        let upcoming: Vec<(DateTime<Utc>, Job)> = self
            .triggers
            .iter()
            .filter_map(|t| self.next_for(t, now).map(|at| (at, t.job)))
            .collect();
        let earliest = upcoming.iter().map(|(at, _)| *at).min()?;
        let jobs = upcoming
            .into_iter()
            .filter(|(at, _)| *at == earliest)
            .map(|(_, job)| job)
            .collect();
        Some((earliest, jobs))
    }
}
