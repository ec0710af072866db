//! Streak continuity and badge issuance.
//!
//! Runs once per day record, at the moment the record becomes completed,
//! inside the same transaction as the completion flag.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Badge, User};
use crate::storage::Database;

/// Streak fields of a user before a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakState {
    pub current: u32,
    pub best: u32,
    pub last_completed: Option<NaiveDate>,
}

impl From<&User> for StreakState {
    fn from(user: &User) -> Self {
        Self {
            current: user.current_streak,
            best: user.best_streak,
            last_completed: user.last_completed_date,
        }
    }
}

/// How the completed day relates to the previous completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    /// First completion ever.
    Started,
    /// Completed the day after the last completed day.
    Extended,
    /// Same day as the last completion; nothing changes.
    Repeated,
    /// A gap of more than one day, or a date earlier than the last completion.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub previous: u32,
    pub current: u32,
    pub best: u32,
    pub transition: StreakTransition,
}

impl StreakUpdate {
    pub fn counts_new_day(&self) -> bool {
        self.transition != StreakTransition::Repeated
    }
}

/// Compute the streak after completing `today`.
pub fn advance(state: StreakState, today: NaiveDate) -> StreakUpdate {
    let (current, transition) = match state.last_completed {
        None => (1, StreakTransition::Started),
        Some(last) => match (today - last).num_days() {
            0 => (state.current, StreakTransition::Repeated),
            1 => (state.current.saturating_add(1), StreakTransition::Extended),
            _ => (1, StreakTransition::Reset),
        },
    };

    StreakUpdate {
        previous: state.current,
        current,
        best: state.best.max(current),
        transition,
    }
}

/// Award every badge whose requirement is met by `streak` and that the user
/// does not hold yet. Returns only the newly inserted badges.
pub fn award_badges(
    db: &Database,
    user_id: i64,
    streak: u32,
    now: DateTime<Utc>,
) -> Result<Vec<Badge>, rusqlite::Error> {
    let mut earned = Vec::new();
    for badge in db.list_badges()? {
        if badge.requirement <= streak && db.insert_earned_badge(user_id, badge.id, now)? {
            earned.push(badge);
        }
    }
    Ok(earned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn state(current: u32, best: u32, last: Option<NaiveDate>) -> StreakState {
        StreakState {
            current,
            best,
            last_completed: last,
        }
    }

    #[test]
    fn first_completion_starts_streak() {
        let update = advance(state(0, 0, None), day(2024, 1, 10));
        assert_eq!(update.current, 1);
        assert_eq!(update.best, 1);
        assert_eq!(update.transition, StreakTransition::Started);
    }

    #[test]
    fn consecutive_day_extends() {
        let update = advance(state(6, 9, Some(day(2024, 1, 9))), day(2024, 1, 10));
        assert_eq!(update.current, 7);
        assert_eq!(update.best, 9);
        assert_eq!(update.transition, StreakTransition::Extended);
    }

    #[test]
    fn same_day_is_repeated_and_unchanged() {
        let update = advance(state(4, 4, Some(day(2024, 1, 10))), day(2024, 1, 10));
        assert_eq!(update.current, 4);
        assert!(!update.counts_new_day());
    }

    #[test]
    fn skipped_day_resets_to_one() {
        let update = advance(state(5, 5, Some(day(2024, 1, 8))), day(2024, 1, 10));
        assert_eq!(update.current, 1);
        assert_eq!(update.best, 5);
        assert_eq!(update.transition, StreakTransition::Reset);
    }

    #[test]
    fn earlier_date_resets_to_one() {
        let update = advance(state(3, 8, Some(day(2024, 1, 10))), day(2024, 1, 7));
        assert_eq!(update.current, 1);
        assert_eq!(update.best, 8);
        assert_eq!(update.transition, StreakTransition::Reset);
    }

    #[test]
    fn month_boundary_is_contiguous() {
        let update = advance(state(2, 2, Some(day(2024, 2, 29))), day(2024, 3, 1));
        assert_eq!(update.current, 3);
        assert_eq!(update.best, 3);
    }

    #[test]
    fn badges_awarded_once_per_user() {
        let db = Database::open_memory().unwrap();
        db.insert_user_if_missing(1, Utc::now()).unwrap();

        let first = award_badges(&db, 1, 7, Utc::now()).unwrap();
        let names: Vec<&str> = first.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Beginner", "Enthusiast"]);

        assert!(award_badges(&db, 1, 7, Utc::now()).unwrap().is_empty());
        assert!(award_badges(&db, 1, 3, Utc::now()).unwrap().is_empty());
        assert_eq!(db.earned_badges(1).unwrap().len(), 2);
    }

    #[test]
    fn short_streak_earns_nothing() {
        let db = Database::open_memory().unwrap();
        db.insert_user_if_missing(1, Utc::now()).unwrap();
        assert!(award_badges(&db, 1, 2, Utc::now()).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn best_never_below_current(
            current in 0u32..500,
            extra in 0u32..500,
            gap in -5i64..10,
            has_last in any::<bool>(),
        ) {
            let today = day(2024, 6, 15);
            let last = has_last.then(|| today - chrono::Duration::days(gap));
            let update = advance(state(current, current + extra, last), today);
            prop_assert!(update.best >= update.current);
            prop_assert!(update.best >= current + extra);
            prop_assert!(update.current >= 1 || update.transition == StreakTransition::Repeated);
        }
    }
}
