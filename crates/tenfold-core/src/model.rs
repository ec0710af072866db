//! Persistent entities of the daily loop.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A participant, keyed by the messaging platform's numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub completed_days: u32,
    pub missed_days: u32,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_completed_date: Option<NaiveDate>,
    /// Set when the transport reported the user blocked or deactivated.
    pub unreachable_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_reachable(&self) -> bool {
        self.unreachable_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
}

/// One user's activity on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub question_id: i64,
    pub answers_count: u32,
    pub is_completed: bool,
    pub question_changes: u32,
    /// Stamped by the day-closing process.
    pub closed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// Completed or closed; no further mutation is accepted.
    pub fn is_finalized(&self) -> bool {
        self.is_completed || self.closed_at.is_some()
    }
}

/// Static catalog entry unlocked by reaching `requirement` consecutive days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    pub name: String,
    pub emoji: String,
    pub description: String,
    pub requirement: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnedBadge {
    pub badge: Badge,
    pub earned_at: DateTime<Utc>,
}

/// Read-only view for reporting surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: i64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub completed_days: u32,
    pub missed_days: u32,
    pub last_completed_date: Option<NaiveDate>,
    pub reachable: bool,
    pub badges: Vec<EarnedBadge>,
    pub today: Option<ProgressRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionStats {
    pub question_id: i64,
    pub text: String,
    pub times_assigned: u32,
    pub times_completed: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub date: Option<NaiveDate>,
    pub total_users: u32,
    pub reachable_users: u32,
    pub total_questions: u32,
    pub records_on_date: u32,
    pub completed_on_date: u32,
}
