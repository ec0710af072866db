//! Whole-day scenarios against an on-disk database.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tempfile::TempDir;
use tenfold_core::messenger::RecordingMessenger;
use tenfold_core::{
    jobs, CoreError, Database, Engine, Messenger, Rules, StreakTransition, SubmitOutcome,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
}

fn answers(n: usize) -> String {
    (1..=n).map(|i| format!("answer {i}\n")).collect()
}

fn open_engine(dir: &TempDir) -> Engine {
    let db = Database::open(&dir.path().join("tenfold.db")).unwrap();
    let engine = Engine::new(db, Rules::default());
    engine.seed_default_questions().unwrap();
    engine
}

fn complete_day(engine: &Engine, user: i64, date: NaiveDate) -> SubmitOutcome {
    engine
        .submit_answers(user, date, &answers(10), Utc::now())
        .unwrap()
}

#[test]
fn seventh_consecutive_day_earns_enthusiast() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine.register_user(1, Utc::now()).unwrap();

    for d in 1..=6 {
        complete_day(&engine, 1, day(d));
    }
    let user = engine.user(1).unwrap();
    assert_eq!(user.current_streak, 6);

    let SubmitOutcome::Completed(done) = complete_day(&engine, 1, day(7)) else {
        panic!("expected completion");
    };
    assert_eq!(done.streak.current, 7);
    assert_eq!(done.streak.transition, StreakTransition::Extended);
    let names: Vec<_> = done.new_badges.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["Enthusiast"]);

    let stats = engine.user_stats(1, day(7)).unwrap();
    assert_eq!(stats.badges.len(), 2);
    assert!(stats.best_streak >= stats.current_streak);
}

#[test]
fn skipped_day_resets_streak() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine.register_user(1, Utc::now()).unwrap();

    complete_day(&engine, 1, day(1));
    complete_day(&engine, 1, day(2));
    let SubmitOutcome::Completed(done) = complete_day(&engine, 1, day(4)) else {
        panic!("expected completion");
    };
    assert_eq!(done.streak.current, 1);
    assert_eq!(done.streak.best, 2);
    assert_eq!(done.streak.transition, StreakTransition::Reset);
}

#[test]
fn surplus_answers_have_no_further_effect() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine.register_user(1, Utc::now()).unwrap();

    let first = engine
        .submit_answers(1, day(1), &answers(4), Utc::now())
        .unwrap();
    assert!(matches!(
        first,
        SubmitOutcome::InProgress { remaining: 6, .. }
    ));

    let SubmitOutcome::Completed(done) = engine
        .submit_answers(1, day(1), &format!("\n  \n{}", answers(7)), Utc::now())
        .unwrap()
    else {
        panic!("expected completion");
    };
    assert_eq!(done.record.answers_count, 11);
    assert_eq!(engine.user(1).unwrap().completed_days, 1);

    let again = engine.submit_answers(1, day(1), "one more", Utc::now());
    assert!(matches!(again, Err(CoreError::AlreadyCompleted { .. })));
    assert_eq!(engine.user(1).unwrap().current_streak, 1);
}

#[test]
fn fourth_question_change_is_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine.register_user(1, Utc::now()).unwrap();
    let record = engine.get_or_create_today(1, day(1)).unwrap();
    engine.record_answers(record.id, 5).unwrap();

    for _ in 0..3 {
        engine.change_question(record.id).unwrap();
    }
    let before = engine.today_view(1, day(1)).unwrap().unwrap();
    assert_eq!(before.changes_left, 0);
    assert_eq!(before.record.answers_count, 0);

    let err = engine.change_question(record.id).unwrap_err();
    assert!(matches!(err, CoreError::LimitExceeded { limit: 3 }));
    let after = engine.today_view(1, day(1)).unwrap().unwrap();
    assert_eq!(after.record.question_id, before.record.question_id);
    assert_eq!(after.record.question_changes, 3);
}

#[test]
fn closing_twice_penalizes_once() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine.register_user(1, Utc::now()).unwrap();
    complete_day(&engine, 1, day(1));
    engine
        .submit_answers(1, day(2), &answers(9), Utc::now())
        .unwrap();

    let first = engine.close_day(day(2), Utc::now()).unwrap();
    let second = engine.close_day(day(2), Utc::now()).unwrap();
    assert_eq!(first.missed_users, vec![1]);
    assert!(second.missed_users.is_empty());

    let user = engine.user(1).unwrap();
    assert_eq!(user.missed_days, 1);
    assert_eq!(user.current_streak, 0);
    assert_eq!(user.best_streak, 1);

    let late = engine.submit_answers(1, day(2), "late", Utc::now());
    assert!(matches!(late, Err(CoreError::AlreadyCompleted { .. })));
}

#[test]
fn state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(&dir);
        engine.register_user(3, Utc::now()).unwrap();
        complete_day(&engine, 3, day(1));
    }
    let engine = open_engine(&dir);
    let user = engine.user(3).unwrap();
    assert_eq!(user.current_streak, 1);
    assert_eq!(user.last_completed_date, Some(day(1)));
    assert_eq!(engine.seed_default_questions().unwrap(), 0);
}

#[tokio::test]
async fn batch_isolates_unreachable_users() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(&dir));
    for id in 1..=5 {
        engine.register_user(id, Utc::now()).unwrap();
    }
    let recorder = Arc::new(RecordingMessenger::new().with_unreachable(3));
    let messenger: Arc<dyn Messenger> = recorder.clone();

    let report = jobs::run_daily_issuance(&engine, &messenger, day(1), 2)
        .await
        .unwrap();
    assert_eq!(report.attempted, 5);
    assert_eq!(report.delivered, 4);
    assert_eq!(report.unreachable, 1);
    assert_eq!(recorder.recipients(), vec![1, 2, 4, 5]);

    // The next batch no longer targets user 3.
    let report = jobs::run_reminder(
        &engine,
        &messenger,
        day(1),
        tenfold_core::ReminderKind::Regular,
        2,
    )
    .await
    .unwrap();
    assert_eq!(report.attempted, 4);

    // Coming back clears the mark.
    engine.register_user(3, Utc::now()).unwrap();
    assert_eq!(engine.reachable_users().unwrap().len(), 5);
}
