//! Shared handle over the store and the daily-loop rules.
//!
//! The database sits behind a mutex: every ledger operation runs to
//! completion before the next one starts, which serializes each user's
//! operations. The lock is never held across an `.await`.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::DEFAULT_QUESTIONS;
use crate::day_close::{self, DayCloseReport};
use crate::error::{CoreError, DatabaseError, Result};
use crate::ledger::{Completion, DayView, ProgressLedger, SubmitOutcome};
use crate::model::{
    Badge, ProgressRecord, Question, QuestionStats, SystemStats, User, UserStats,
};
use crate::storage::Database;

/// Thresholds of the daily loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    pub completion_threshold: u32,
    pub max_question_changes: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            completion_threshold: 10,
            max_question_changes: 3,
        }
    }
}

pub struct Engine {
    db: Mutex<Database>,
    rules: Rules,
}

impl Engine {
    pub fn new(db: Database, rules: Rules) -> Self {
        Self {
            db: Mutex::new(db),
            rules,
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| CoreError::StoreUnavailable(DatabaseError::Poisoned))
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&ProgressLedger<'_>) -> Result<T>) -> Result<T> {
        let db = self.lock()?;
        let ledger = ProgressLedger::new(&db, &self.rules);
        f(&ledger)
    }

    // === Users ===

    /// Register a user on first contact. A returning user who had been
    /// marked unreachable becomes reachable again.
    pub fn register_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<User> {
        let db = self.lock()?;
        if db.insert_user_if_missing(user_id, now)? {
            info!(user_id, "user registered");
        } else {
            db.set_unreachable(user_id, None)?;
        }
        db.get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))
    }

    pub fn user(&self, user_id: i64) -> Result<User> {
        self.lock()?
            .get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))
    }

    pub fn reachable_users(&self) -> Result<Vec<User>> {
        Ok(self.lock()?.list_reachable_users()?)
    }

    /// Record that the transport can no longer reach `user_id`.
    pub fn mark_unreachable(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        info!(user_id, "marked unreachable, skipped by future batches");
        self.lock()?.set_unreachable(user_id, Some(now))?;
        Ok(())
    }

    // === Progress ledger ===

    pub fn get_or_create_today(&self, user_id: i64, date: NaiveDate) -> Result<ProgressRecord> {
        self.with_ledger(|ledger| {
            ledger.get_or_create_today(user_id, date, &mut rand::thread_rng())
        })
    }

    /// Today's record with its question, creating the record if absent.
    pub fn today(&self, user_id: i64, date: NaiveDate) -> Result<DayView> {
        self.with_ledger(|ledger| {
            ledger.get_or_create_today(user_id, date, &mut rand::thread_rng())?;
            ledger
                .today_view(user_id, date)?
                .ok_or_else(|| CoreError::not_found("day record", format!("{user_id}@{date}")))
        })
    }

    pub fn today_view(&self, user_id: i64, date: NaiveDate) -> Result<Option<DayView>> {
        self.with_ledger(|ledger| ledger.today_view(user_id, date))
    }

    pub fn record_answers(&self, record_id: i64, delta: u32) -> Result<ProgressRecord> {
        self.with_ledger(|ledger| ledger.record_answers(record_id, delta))
    }

    pub fn change_question(&self, record_id: i64) -> Result<DayView> {
        self.with_ledger(|ledger| ledger.change_question(record_id, &mut rand::thread_rng()))
    }

    pub fn complete(&self, record_id: i64, now: DateTime<Utc>) -> Result<Completion> {
        self.with_ledger(|ledger| ledger.complete(record_id, now))
    }

    pub fn submit_answers(
        &self,
        user_id: i64,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        self.with_ledger(|ledger| {
            ledger.submit_answers(user_id, date, text, now, &mut rand::thread_rng())
        })
    }

    pub fn bonus_question(&self, user_id: i64) -> Result<Question> {
        self.user(user_id)?;
        self.with_ledger(|ledger| ledger.bonus_question(user_id, &mut rand::thread_rng()))
    }

    // === Day closing ===

    pub fn close_day(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<DayCloseReport> {
        let db = self.lock()?;
        Ok(day_close::close_day(
            &db,
            date,
            self.rules.completion_threshold,
            now,
        )?)
    }

    /// Close `date` and any earlier date left with unclosed records.
    pub fn close_through(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<DayCloseReport>> {
        let db = self.lock()?;
        Ok(day_close::close_through(
            &db,
            date,
            self.rules.completion_threshold,
            now,
        )?)
    }

    pub fn catch_up(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<Vec<DayCloseReport>> {
        let db = self.lock()?;
        Ok(day_close::catch_up(
            &db,
            today,
            self.rules.completion_threshold,
            now,
        )?)
    }

    // === Catalog and reports ===

    /// Fill an empty catalog with the built-in prompts.
    pub fn seed_default_questions(&self) -> Result<usize> {
        let inserted = self.lock()?.seed_questions(DEFAULT_QUESTIONS)?;
        if inserted > 0 {
            info!(count = inserted, "question catalog seeded");
        }
        Ok(inserted)
    }

    pub fn add_question(&self, text: &str) -> Result<Question> {
        let db = self.lock()?;
        let id = db.insert_question(text.trim())?;
        db.get_question(id)?
            .ok_or_else(|| CoreError::not_found("question", id))
    }

    pub fn list_questions(&self) -> Result<Vec<Question>> {
        Ok(self.lock()?.list_questions()?)
    }

    pub fn list_badges(&self) -> Result<Vec<Badge>> {
        Ok(self.lock()?.list_badges()?)
    }

    pub fn user_stats(&self, user_id: i64, today: NaiveDate) -> Result<UserStats> {
        let db = self.lock()?;
        let user = db
            .get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        Ok(UserStats {
            user_id,
            current_streak: user.current_streak,
            best_streak: user.best_streak,
            completed_days: user.completed_days,
            missed_days: user.missed_days,
            last_completed_date: user.last_completed_date,
            reachable: user.is_reachable(),
            badges: db.earned_badges(user_id)?,
            today: db.get_progress(user_id, today)?,
        })
    }

    pub fn question_stats(&self) -> Result<Vec<QuestionStats>> {
        Ok(self.lock()?.question_stats()?)
    }

    pub fn system_stats(&self, date: NaiveDate) -> Result<SystemStats> {
        Ok(self.lock()?.system_stats(date)?)
    }
}
