//! SQLite-based storage for users, questions, day records and badges.
//!
//! Methods here are single statements or read queries. Multi-step operations
//! that must be atomic open a transaction with [`Database::begin`] and call
//! these methods before committing; see the ledger and day-closing modules.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::migrations;
use crate::error::DatabaseError;
use crate::model::{
    Badge, EarnedBadge, ProgressRecord, Question, QuestionStats, SystemStats, User,
};

const DATE_FMT: &str = "%Y-%m-%d";

const USER_COLUMNS: &str = "user_id, created_at, completed_days, missed_days, current_streak,
     best_streak, last_completed_date, unreachable_at";

const PROGRESS_COLUMNS: &str = "id, user_id, date, question_id, answers_count, is_completed,
     question_changes_count, closed_at";

// === Helper Functions ===

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn parse_date(value: &str, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(value, DATE_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(value: &str, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_user(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let created_at: String = row.get(1)?;
    let last_completed: Option<String> = row.get(6)?;
    let unreachable_at: Option<String> = row.get(7)?;

    Ok(User {
        user_id: row.get(0)?,
        created_at: parse_datetime(&created_at, 1)?,
        completed_days: row.get(2)?,
        missed_days: row.get(3)?,
        current_streak: row.get(4)?,
        best_streak: row.get(5)?,
        last_completed_date: last_completed
            .as_deref()
            .map(|s| parse_date(s, 6))
            .transpose()?,
        unreachable_at: unreachable_at
            .as_deref()
            .map(|s| parse_datetime(s, 7))
            .transpose()?,
    })
}

fn row_to_progress(row: &rusqlite::Row) -> Result<ProgressRecord, rusqlite::Error> {
    let date: String = row.get(2)?;
    let closed_at: Option<String> = row.get(7)?;

    Ok(ProgressRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: parse_date(&date, 2)?,
        question_id: row.get(3)?,
        answers_count: row.get(4)?,
        is_completed: row.get(5)?,
        question_changes: row.get(6)?,
        closed_at: closed_at
            .as_deref()
            .map(|s| parse_datetime(s, 7))
            .transpose()?,
    })
}

fn row_to_badge(row: &rusqlite::Row) -> Result<Badge, rusqlite::Error> {
    Ok(Badge {
        id: row.get(0)?,
        name: row.get(1)?,
        emoji: row.get(2)?,
        description: row.get(3)?,
        requirement: row.get(4)?,
    })
}

/// SQLite database for the daily loop.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open (creating if needed) the database file at `path` and migrate it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Begin a transaction; statements issued through `self` until commit
    /// belong to it. Dropping the guard without committing rolls back.
    pub fn begin(&self) -> Result<Transaction<'_>, rusqlite::Error> {
        self.conn.unchecked_transaction()
    }

    // === Users ===

    /// Insert the user if absent. Returns true when a row was created.
    pub fn insert_user_if_missing(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?1, ?2)",
            params![user_id, now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                [user_id],
                row_to_user,
            )
            .optional()
    }

    pub fn list_users(&self) -> Result<Vec<User>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY user_id"))?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect()
    }

    /// Users the transport has not reported as blocked or deactivated.
    pub fn list_reachable_users(&self) -> Result<Vec<User>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE unreachable_at IS NULL ORDER BY user_id"
        ))?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect()
    }

    pub fn set_unreachable(
        &self,
        user_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE users SET unreachable_at = ?2 WHERE user_id = ?1",
            params![user_id, at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    /// Persist the outcome of a completed day for `user_id`.
    pub fn apply_completion(
        &self,
        user_id: i64,
        current_streak: u32,
        best_streak: u32,
        last_completed_date: NaiveDate,
        count_completed_day: bool,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE users
             SET current_streak = ?2,
                 best_streak = ?3,
                 last_completed_date = ?4,
                 completed_days = completed_days + ?5
             WHERE user_id = ?1",
            params![
                user_id,
                current_streak,
                best_streak,
                format_date(last_completed_date),
                u32::from(count_completed_day),
            ],
        )?;
        Ok(())
    }

    /// Count a missed day and break the current streak; best streak is kept.
    pub fn apply_miss(&self, user_id: i64) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE users SET missed_days = missed_days + 1, current_streak = 0
             WHERE user_id = ?1",
            [user_id],
        )?;
        Ok(())
    }

    // === Questions ===

    pub fn insert_question(&self, text: &str) -> Result<i64, rusqlite::Error> {
        self.conn
            .execute("INSERT INTO questions (text) VALUES (?1)", [text])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert `texts` only when the catalog is empty. Returns the number inserted.
    pub fn seed_questions(&self, texts: &[&str]) -> Result<usize, rusqlite::Error> {
        if self.count_questions()? > 0 {
            return Ok(0);
        }
        let tx = self.begin()?;
        {
            let mut insert = tx.prepare("INSERT INTO questions (text) VALUES (?1)")?;
            for text in texts {
                insert.execute([text])?;
            }
        }
        tx.commit()?;
        Ok(texts.len())
    }

    pub fn get_question(&self, id: i64) -> Result<Option<Question>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, text FROM questions WHERE id = ?1",
                [id],
                |row| {
                    Ok(Question {
                        id: row.get(0)?,
                        text: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    pub fn list_questions(&self) -> Result<Vec<Question>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT id, text FROM questions ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Question {
                id: row.get(0)?,
                text: row.get(1)?,
            })
        })?;
        rows.collect()
    }

    pub fn question_ids(&self) -> Result<Vec<i64>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT id FROM questions ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    pub fn count_questions(&self) -> Result<u32, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
    }

    /// Questions the user has already completed on some day.
    pub fn completed_question_ids(&self, user_id: i64) -> Result<HashSet<i64>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT question_id FROM daily_progress
             WHERE user_id = ?1 AND is_completed = 1",
        )?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        rows.collect()
    }

    // === Day records ===

    pub fn get_progress(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<ProgressRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {PROGRESS_COLUMNS} FROM daily_progress WHERE user_id = ?1 AND date = ?2"
                ),
                params![user_id, format_date(date)],
                row_to_progress,
            )
            .optional()
    }

    pub fn get_progress_by_id(&self, id: i64) -> Result<Option<ProgressRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {PROGRESS_COLUMNS} FROM daily_progress WHERE id = ?1"),
                [id],
                row_to_progress,
            )
            .optional()
    }

    /// Insert a fresh day record. Fails on the (user, date) unique index if
    /// one already exists.
    pub fn insert_progress(
        &self,
        user_id: i64,
        date: NaiveDate,
        question_id: i64,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO daily_progress (user_id, date, question_id, answers_count, is_completed)
             VALUES (?1, ?2, ?3, 0, 0)",
            params![user_id, format_date(date), question_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_answers_count(&self, id: i64, answers_count: u32) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE daily_progress SET answers_count = ?2 WHERE id = ?1",
            params![id, answers_count],
        )?;
        Ok(())
    }

    /// Swap the record's question, zeroing its answers and counting the change.
    pub fn swap_question(&self, id: i64, question_id: i64) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE daily_progress
             SET question_id = ?2,
                 answers_count = 0,
                 question_changes_count = question_changes_count + 1
             WHERE id = ?1",
            params![id, question_id],
        )?;
        Ok(())
    }

    pub fn mark_completed(&self, id: i64) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE daily_progress SET is_completed = 1 WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Unclosed, uncompleted records on `date` still below `threshold` answers.
    pub fn unclosed_misses_on(
        &self,
        date: NaiveDate,
        threshold: u32,
    ) -> Result<Vec<ProgressRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM daily_progress
             WHERE date = ?1 AND is_completed = 0 AND answers_count < ?2 AND closed_at IS NULL
             ORDER BY user_id"
        ))?;
        let rows = stmt.query_map(params![format_date(date), threshold], row_to_progress)?;
        rows.collect()
    }

    /// Stamp every still-open record on `date` as closed. Returns the row count.
    pub fn close_records_on(
        &self,
        date: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "UPDATE daily_progress SET closed_at = ?2 WHERE date = ?1 AND closed_at IS NULL",
            params![format_date(date), at.to_rfc3339()],
        )
    }

    /// Dates before `date` that still hold unclosed records, oldest first.
    pub fn unclosed_dates_before(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<NaiveDate>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT date FROM daily_progress
             WHERE date < ?1 AND closed_at IS NULL
             ORDER BY date",
        )?;
        let rows = stmt.query_map([format_date(date)], |row| {
            let value: String = row.get(0)?;
            parse_date(&value, 0)
        })?;
        rows.collect()
    }

    // === Badges ===

    pub fn list_badges(&self) -> Result<Vec<Badge>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, emoji, description, requirement FROM badges
             ORDER BY requirement, id",
        )?;
        let rows = stmt.query_map([], row_to_badge)?;
        rows.collect()
    }

    pub fn earned_badges(&self, user_id: i64) -> Result<Vec<EarnedBadge>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.name, b.emoji, b.description, b.requirement, ub.earned_at
             FROM user_badges ub
             JOIN badges b ON b.id = ub.badge_id
             WHERE ub.user_id = ?1
             ORDER BY b.requirement, b.id",
        )?;
        let rows = stmt.query_map([user_id], |row| {
            let earned_at: String = row.get(5)?;
            Ok(EarnedBadge {
                badge: row_to_badge(row)?,
                earned_at: parse_datetime(&earned_at, 5)?,
            })
        })?;
        rows.collect()
    }

    /// Record an earned badge. Returns false if the user already holds it.
    pub fn insert_earned_badge(
        &self,
        user_id: i64,
        badge_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO user_badges (user_id, badge_id, earned_at) VALUES (?1, ?2, ?3)",
            params![user_id, badge_id, at.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    // === Reports ===

    pub fn question_stats(&self) -> Result<Vec<QuestionStats>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT q.id, q.text,
                    COUNT(dp.id),
                    COALESCE(SUM(dp.is_completed), 0)
             FROM questions q
             LEFT JOIN daily_progress dp ON dp.question_id = q.id
             GROUP BY q.id
             ORDER BY COUNT(dp.id) DESC, q.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(QuestionStats {
                question_id: row.get(0)?,
                text: row.get(1)?,
                times_assigned: row.get(2)?,
                times_completed: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn system_stats(&self, date: NaiveDate) -> Result<SystemStats, rusqlite::Error> {
        let (total_users, reachable_users): (u32, u32) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(unreachable_at IS NULL), 0) FROM users",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (records_on_date, completed_on_date): (u32, u32) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_completed), 0) FROM daily_progress WHERE date = ?1",
            [format_date(date)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(SystemStats {
            date: Some(date),
            total_users,
            reachable_users,
            total_questions: self.count_questions()?,
            records_on_date,
            completed_on_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FMT).unwrap()
    }

    fn db_with_user() -> Database {
        let db = Database::open_memory().unwrap();
        db.insert_user_if_missing(42, Utc::now()).unwrap();
        db.seed_questions(&["first", "second"]).unwrap();
        db
    }

    #[test]
    fn insert_user_is_idempotent() {
        let db = Database::open_memory().unwrap();
        assert!(db.insert_user_if_missing(1, Utc::now()).unwrap());
        assert!(!db.insert_user_if_missing(1, Utc::now()).unwrap());
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn user_round_trip_defaults() {
        let db = db_with_user();
        let user = db.get_user(42).unwrap().unwrap();
        assert_eq!(user.current_streak, 0);
        assert_eq!(user.best_streak, 0);
        assert_eq!(user.last_completed_date, None);
        assert!(user.is_reachable());
        assert!(db.get_user(43).unwrap().is_none());
    }

    #[test]
    fn seed_questions_only_fills_empty_catalog() {
        let db = db_with_user();
        assert_eq!(db.seed_questions(&["third"]).unwrap(), 0);
        assert_eq!(db.count_questions().unwrap(), 2);
    }

    #[test]
    fn progress_unique_per_user_and_date() {
        let db = db_with_user();
        db.insert_progress(42, day("2024-03-01"), 1).unwrap();
        assert!(db.insert_progress(42, day("2024-03-01"), 2).is_err());
        db.insert_progress(42, day("2024-03-02"), 2).unwrap();
    }

    #[test]
    fn swap_question_resets_answers_and_counts_change() {
        let db = db_with_user();
        let id = db.insert_progress(42, day("2024-03-01"), 1).unwrap();
        db.set_answers_count(id, 6).unwrap();
        db.swap_question(id, 2).unwrap();

        let record = db.get_progress_by_id(id).unwrap().unwrap();
        assert_eq!(record.question_id, 2);
        assert_eq!(record.answers_count, 0);
        assert_eq!(record.question_changes, 1);
    }

    #[test]
    fn earned_badge_inserted_once() {
        let db = db_with_user();
        let badge = db.list_badges().unwrap().remove(0);
        assert!(db.insert_earned_badge(42, badge.id, Utc::now()).unwrap());
        assert!(!db.insert_earned_badge(42, badge.id, Utc::now()).unwrap());
        assert_eq!(db.earned_badges(42).unwrap().len(), 1);
    }

    #[test]
    fn unreachable_users_are_filtered() {
        let db = db_with_user();
        db.insert_user_if_missing(7, Utc::now()).unwrap();
        db.set_unreachable(42, Some(Utc::now())).unwrap();

        let ids: Vec<i64> = db
            .list_reachable_users()
            .unwrap()
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        assert_eq!(ids, vec![7]);

        let stats = db.system_stats(day("2024-03-01")).unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.reachable_users, 1);
    }

    #[test]
    fn question_stats_counts_assignments_and_completions() {
        let db = db_with_user();
        let a = db.insert_progress(42, day("2024-03-01"), 1).unwrap();
        db.insert_progress(42, day("2024-03-02"), 1).unwrap();
        db.mark_completed(a).unwrap();

        let stats = db.question_stats().unwrap();
        assert_eq!(stats[0].question_id, 1);
        assert_eq!(stats[0].times_assigned, 2);
        assert_eq!(stats[0].times_completed, 1);
        assert_eq!(stats[1].times_assigned, 0);
    }

    #[test]
    fn unclosed_dates_before_lists_old_open_days() {
        let db = db_with_user();
        db.insert_progress(42, day("2024-03-01"), 1).unwrap();
        db.insert_progress(42, day("2024-03-02"), 1).unwrap();
        db.insert_progress(42, day("2024-03-03"), 1).unwrap();
        db.close_records_on(day("2024-03-01"), Utc::now()).unwrap();

        let dates = db.unclosed_dates_before(day("2024-03-03")).unwrap();
        assert_eq!(dates, vec![day("2024-03-02")]);
    }

    #[test]
    fn open_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenfold.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_user_if_missing(5, Utc::now()).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.get_user(5).unwrap().is_some());
    }
}
