//! Progress ledger: the per-user, per-date day record.
//!
//! Every public operation runs in one SQLite transaction. Completion writes
//! the record flag, the user's streak fields and any earned badges together,
//! so no reader sees a completed record with stale streak data.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::QuestionCatalog;
use crate::engine::Rules;
use crate::error::{CoreError, Result};
use crate::model::{Badge, ProgressRecord, Question};
use crate::storage::Database;
use crate::streak::{self, StreakState, StreakUpdate};

/// Number of answers in a submitted text: non-blank lines.
pub fn count_answers(text: &str) -> u32 {
    let lines = text.lines().filter(|line| !line.trim().is_empty()).count();
    u32::try_from(lines).unwrap_or(u32::MAX)
}

/// Outcome of the completion transition.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub record: ProgressRecord,
    pub streak: StreakUpdate,
    /// Badges earned by this completion, for notification.
    pub new_badges: Vec<Badge>,
}

/// Result of one inbound answer message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    InProgress {
        record: ProgressRecord,
        added: u32,
        remaining: u32,
    },
    Completed(Completion),
}

/// Day record with its question, as shown to the participant.
#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub record: ProgressRecord,
    pub question: Question,
    /// Question changes still available today.
    pub changes_left: u32,
}

pub struct ProgressLedger<'a> {
    db: &'a Database,
    rules: &'a Rules,
}

impl<'a> ProgressLedger<'a> {
    pub fn new(db: &'a Database, rules: &'a Rules) -> Self {
        Self { db, rules }
    }

    /// Today's record for `user_id`, creating it with a fresh question if absent.
    ///
    /// Repeated calls for the same date return the same record.
    pub fn get_or_create_today<R: Rng + ?Sized>(
        &self,
        user_id: i64,
        date: NaiveDate,
        rng: &mut R,
    ) -> Result<ProgressRecord> {
        let tx = self.db.begin()?;
        let record = self.load_or_create(user_id, date, rng)?;
        tx.commit()?;
        Ok(record)
    }

    /// Add `delta` answers to an open record.
    pub fn record_answers(&self, record_id: i64, delta: u32) -> Result<ProgressRecord> {
        let tx = self.db.begin()?;
        let record = self.load_open(record_id)?;
        let record = self.add_answers(record, delta)?;
        tx.commit()?;
        Ok(record)
    }

    /// Replace the record's question, zeroing its answers.
    ///
    /// # Errors
    /// `LimitExceeded` once the daily quota is used up; the record is left
    /// untouched in that case.
    pub fn change_question<R: Rng + ?Sized>(
        &self,
        record_id: i64,
        rng: &mut R,
    ) -> Result<DayView> {
        let tx = self.db.begin()?;
        let record = self.load_open(record_id)?;
        if record.question_changes >= self.rules.max_question_changes {
            return Err(CoreError::LimitExceeded {
                limit: self.rules.max_question_changes,
            });
        }

        let question = QuestionCatalog::new(self.db).pick_replacement(
            record.user_id,
            record.question_id,
            rng,
        )?;
        self.db.swap_question(record.id, question.id)?;
        let record = self.reload(record.id)?;
        tx.commit()?;

        debug!(
            user_id = record.user_id,
            date = %record.date,
            question_id = question.id,
            changes = record.question_changes,
            "question changed"
        );
        Ok(self.view(record, question))
    }

    /// Finalize a record that reached the threshold and update streak and badges.
    pub fn complete(&self, record_id: i64, now: DateTime<Utc>) -> Result<Completion> {
        let tx = self.db.begin()?;
        let record = self.load_open(record_id)?;
        let completion = self.finish(record, now)?;
        tx.commit()?;
        Ok(completion)
    }

    /// Handle one answer message: count lines, record them on today's record
    /// and complete it once the threshold is reached.
    pub fn submit_answers<R: Rng + ?Sized>(
        &self,
        user_id: i64,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<SubmitOutcome> {
        let tx = self.db.begin()?;
        let record = self.load_or_create(user_id, date, rng)?;
        if record.is_finalized() {
            return Err(CoreError::AlreadyCompleted { date: record.date });
        }

        let added = count_answers(text);
        let record = self.add_answers(record, added)?;
        let outcome = if record.answers_count >= self.rules.completion_threshold {
            SubmitOutcome::Completed(self.finish(record, now)?)
        } else {
            let remaining = self.rules.completion_threshold - record.answers_count;
            SubmitOutcome::InProgress {
                record,
                added,
                remaining,
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// A practice question after the day is done, preferring ones the user
    /// has not completed.
    pub fn bonus_question<R: Rng + ?Sized>(&self, user_id: i64, rng: &mut R) -> Result<Question> {
        QuestionCatalog::new(self.db).pick_for_user(user_id, rng)
    }

    /// Today's record joined with its question, if one exists.
    pub fn today_view(&self, user_id: i64, date: NaiveDate) -> Result<Option<DayView>> {
        let Some(record) = self.db.get_progress(user_id, date)? else {
            return Ok(None);
        };
        let question = self
            .db
            .get_question(record.question_id)?
            .ok_or_else(|| CoreError::not_found("question", record.question_id))?;
        Ok(Some(self.view(record, question)))
    }

    pub fn view(&self, record: ProgressRecord, question: Question) -> DayView {
        let changes_left = self
            .rules
            .max_question_changes
            .saturating_sub(record.question_changes);
        DayView {
            record,
            question,
            changes_left,
        }
    }

    fn load_or_create<R: Rng + ?Sized>(
        &self,
        user_id: i64,
        date: NaiveDate,
        rng: &mut R,
    ) -> Result<ProgressRecord> {
        if self.db.get_user(user_id)?.is_none() {
            return Err(CoreError::not_found("user", user_id));
        }
        if let Some(record) = self.db.get_progress(user_id, date)? {
            return Ok(record);
        }

        let question = QuestionCatalog::new(self.db).pick_for_user(user_id, rng)?;
        let id = self.db.insert_progress(user_id, date, question.id)?;
        debug!(user_id, date = %date, question_id = question.id, "day record created");
        self.reload(id)
    }

    fn load_open(&self, record_id: i64) -> Result<ProgressRecord> {
        let record = self.reload(record_id)?;
        if record.is_finalized() {
            return Err(CoreError::AlreadyCompleted { date: record.date });
        }
        Ok(record)
    }

    fn reload(&self, record_id: i64) -> Result<ProgressRecord> {
        self.db
            .get_progress_by_id(record_id)?
            .ok_or_else(|| CoreError::not_found("day record", record_id))
    }

    fn add_answers(&self, mut record: ProgressRecord, delta: u32) -> Result<ProgressRecord> {
        if delta == 0 {
            return Ok(record);
        }
        record.answers_count = record.answers_count.saturating_add(delta);
        self.db.set_answers_count(record.id, record.answers_count)?;
        Ok(record)
    }

    fn finish(&self, record: ProgressRecord, now: DateTime<Utc>) -> Result<Completion> {
        if record.answers_count < self.rules.completion_threshold {
            return Err(CoreError::BelowThreshold {
                answers: record.answers_count,
                threshold: self.rules.completion_threshold,
            });
        }
        let user = self
            .db
            .get_user(record.user_id)?
            .ok_or_else(|| CoreError::not_found("user", record.user_id))?;

        self.db.mark_completed(record.id)?;
        let update = streak::advance(StreakState::from(&user), record.date);
        self.db.apply_completion(
            user.user_id,
            update.current,
            update.best,
            record.date,
            update.counts_new_day(),
        )?;
        let new_badges = streak::award_badges(self.db, user.user_id, update.current, now)?;

        info!(
            user_id = user.user_id,
            date = %record.date,
            streak = update.current,
            best = update.best,
            badges = new_badges.len(),
            "day completed"
        );

        let record = self.reload(record.id)?;
        Ok(Completion {
            record,
            streak: update,
            new_badges,
        })
    }
}
