//! Database schema migrations for tenfold.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{params, Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Badge catalog seeded by v2: (name, emoji, description, requirement).
pub const BADGE_SEED: &[(&str, &str, &str, u32)] = &[
    ("Beginner", "🔥", "3 days in a row", 3),
    ("Enthusiast", "🌟", "7 days in a row", 7),
    ("Master", "💎", "30 days in a row", 30),
    ("Legend", "👑", "100 days in a row", 100),
];

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: users, questions and per-day progress.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            user_id        INTEGER PRIMARY KEY,
            created_at     TEXT NOT NULL,
            completed_days INTEGER NOT NULL DEFAULT 0,
            missed_days    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS questions (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS daily_progress (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER NOT NULL REFERENCES users(user_id),
            date          TEXT NOT NULL,
            question_id   INTEGER NOT NULL REFERENCES questions(id),
            answers_count INTEGER NOT NULL DEFAULT 0,
            is_completed  INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_daily_progress_date ON daily_progress(date);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: streak columns and the badge catalog.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE users ADD COLUMN current_streak INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE users ADD COLUMN best_streak INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE users ADD COLUMN last_completed_date TEXT;

         CREATE TABLE IF NOT EXISTS badges (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            emoji       TEXT NOT NULL,
            description TEXT NOT NULL,
            requirement INTEGER NOT NULL
         );

         CREATE TABLE IF NOT EXISTS user_badges (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id   INTEGER NOT NULL REFERENCES users(user_id),
            badge_id  INTEGER NOT NULL REFERENCES badges(id),
            earned_at TEXT NOT NULL,
            UNIQUE(user_id, badge_id)
         );",
    )?;

    {
        let mut insert = tx.prepare(
            "INSERT OR IGNORE INTO badges (name, emoji, description, requirement)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (name, emoji, description, requirement) in BADGE_SEED {
            insert.execute(params![name, emoji, description, requirement])?;
        }
    }

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: question-change counter, day closing stamp, unreachable
/// recipients and the one-record-per-user-per-day constraint.
///
/// Duplicate (user, date) rows from before the constraint existed are
/// collapsed onto the lowest id before the unique index is created.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE daily_progress ADD COLUMN question_changes_count INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE daily_progress ADD COLUMN closed_at TEXT;
         ALTER TABLE users ADD COLUMN unreachable_at TEXT;

         DELETE FROM daily_progress
         WHERE id NOT IN (
            SELECT MIN(id) FROM daily_progress GROUP BY user_id, date
         );

         CREATE UNIQUE INDEX IF NOT EXISTS idx_daily_progress_user_date
            ON daily_progress(user_id, date);",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}
