//! Batch jobs fired by the scheduler.
//!
//! Every batch fans out over the reachable user population with bounded
//! concurrency. Each user is its own failure boundary: store or delivery
//! errors are logged and counted, never propagated to the batch.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};

use crate::day_close::DayCloseReport;
use crate::engine::Engine;
use crate::error::{CoreError, Result};
use crate::messages;
use crate::messenger::{DeliveryError, Messenger, OutgoingMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Regular,
    /// Last call before the day closes.
    Final,
}

/// Per-batch delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Nothing to send, e.g. the user already finished the day.
    pub skipped: usize,
    pub unreachable: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: Outcome) {
        self.attempted += 1;
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Unreachable => self.unreachable += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Delivered,
    Skipped,
    Unreachable,
    Failed,
}

/// Create today's record for every reachable user and send the question.
/// Users who already completed the date are skipped.
pub async fn run_daily_issuance(
    engine: &Arc<Engine>,
    messenger: &Arc<dyn Messenger>,
    date: NaiveDate,
    concurrency: usize,
) -> Result<BatchReport> {
    let threshold = engine.rules().completion_threshold;
    fan_out(engine, messenger, concurrency, "issue", move |engine, user_id| {
        let view = engine.today(user_id, date)?;
        if view.record.is_completed {
            return Ok(None);
        }
        Ok(Some(messages::question_of_day(&view, threshold)))
    })
    .await
}

/// Remind every reachable user whose record for `date` is missing or not
/// yet completed.
pub async fn run_reminder(
    engine: &Arc<Engine>,
    messenger: &Arc<dyn Messenger>,
    date: NaiveDate,
    kind: ReminderKind,
    concurrency: usize,
) -> Result<BatchReport> {
    let threshold = engine.rules().completion_threshold;
    let is_final = kind == ReminderKind::Final;
    fan_out(engine, messenger, concurrency, "remind", move |engine, user_id| {
        let view = engine.today_view(user_id, date)?;
        match view {
            Some(view) if view.record.is_finalized() => Ok(None),
            Some(view) => Ok(Some(messages::reminder(Some(&view.record), threshold, is_final))),
            None => Ok(Some(messages::reminder(None, threshold, is_final))),
        }
    })
    .await
}

/// Send each reachable user a summary of their streak and badges.
pub async fn run_weekly_digest(
    engine: &Arc<Engine>,
    messenger: &Arc<dyn Messenger>,
    date: NaiveDate,
    concurrency: usize,
) -> Result<BatchReport> {
    fan_out(engine, messenger, concurrency, "digest", move |engine, user_id| {
        let stats = engine.user_stats(user_id, date)?;
        Ok(Some(messages::weekly_digest(&stats)))
    })
    .await
}

/// Close the day that is ending, plus any earlier date that picked up
/// records after its own close.
pub async fn run_day_close(
    engine: &Arc<Engine>,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<DayCloseReport>> {
    on_store(engine, move |engine| engine.close_through(date, now)).await
}

/// Run blocking store work off the async workers.
pub(crate) async fn on_store<T, F>(engine: &Arc<Engine>, f: F) -> Result<T>
where
    F: FnOnce(&Engine) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = engine.clone();
    spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| CoreError::Task(e.to_string()))?
}

async fn fan_out<F>(
    engine: &Arc<Engine>,
    messenger: &Arc<dyn Messenger>,
    concurrency: usize,
    job: &'static str,
    prepare: F,
) -> Result<BatchReport>
where
    F: Fn(&Engine, i64) -> Result<Option<OutgoingMessage>> + Send + Sync + 'static,
{
    let users = on_store(engine, |engine| engine.reachable_users()).await?;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let prepare = Arc::new(prepare);
    let mut handles = Vec::with_capacity(users.len());

    for user in users {
        let user_id = user.user_id;
        let sem = semaphore.clone();
        let engine = engine.clone();
        let messenger = messenger.clone();
        let prepare = prepare.clone();
        let handle = tokio::spawn(async move {
            let _permit = match sem.acquire().await {
                Ok(p) => p,
                Err(_) => return Outcome::Failed,
            };
            deliver_one(&engine, messenger.as_ref(), user_id, job, prepare).await
        });
        handles.push(handle);
    }

    let mut report = BatchReport::default();
    for handle in handles {
        match handle.await {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                warn!(job, error = %e, "task join error");
                report.record(Outcome::Failed);
            }
        }
    }

    info!(
        job,
        attempted = report.attempted,
        delivered = report.delivered,
        skipped = report.skipped,
        unreachable = report.unreachable,
        failed = report.failed,
        "batch finished"
    );
    Ok(report)
}

async fn deliver_one<F>(
    engine: &Arc<Engine>,
    messenger: &dyn Messenger,
    user_id: i64,
    job: &'static str,
    prepare: Arc<F>,
) -> Outcome
where
    F: Fn(&Engine, i64) -> Result<Option<OutgoingMessage>> + Send + Sync + 'static,
{
    // Store work finishes (and releases the lock) before the send is awaited.
    let prepared = on_store(engine, move |engine| (*prepare)(engine, user_id)).await;
    let message = match prepared {
        Ok(Some(message)) => message,
        Ok(None) => {
            debug!(job, user_id, "nothing to send");
            return Outcome::Skipped;
        }
        Err(e @ (CoreError::StoreUnavailable(_) | CoreError::Task(_))) => {
            error!(job, user_id, error = %e, "store failure while preparing message");
            return Outcome::Failed;
        }
        Err(e) => {
            warn!(job, user_id, error = %e, "failed to prepare message");
            return Outcome::Failed;
        }
    };

    match messenger.send(user_id, &message).await {
        Ok(()) => Outcome::Delivered,
        Err(DeliveryError::Unreachable) => {
            let err = CoreError::RecipientUnreachable { user_id };
            warn!(job, error = %err, "delivery failed");
            let now = Utc::now();
            let marked =
                on_store(engine, move |engine| engine.mark_unreachable(user_id, now)).await;
            if let Err(e) = marked {
                warn!(job, user_id, error = %e, "failed to mark user unreachable");
            }
            Outcome::Unreachable
        }
        Err(DeliveryError::Transient(reason)) => {
            warn!(job, user_id, reason = %reason, "delivery failed");
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Rules;
    use crate::messenger::RecordingMessenger;
    use crate::storage::Database;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn engine_with_users(ids: &[i64]) -> Arc<Engine> {
        let engine = Engine::new(Database::open_memory().unwrap(), Rules::default());
        engine.seed_default_questions().unwrap();
        for &id in ids {
            engine.register_user(id, Utc::now()).unwrap();
        }
        Arc::new(engine)
    }

    #[tokio::test]
    async fn issuance_creates_one_record_per_user() {
        let engine = engine_with_users(&[1, 2, 3]);
        let recorder = Arc::new(RecordingMessenger::new());
        let messenger: Arc<dyn Messenger> = recorder.clone();

        let report = run_daily_issuance(&engine, &messenger, day(1), 2).await.unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(recorder.recipients(), vec![1, 2, 3]);

        // A second run reuses the same records.
        let first = engine.today_view(1, day(1)).unwrap().unwrap().record.id;
        run_daily_issuance(&engine, &messenger, day(1), 2).await.unwrap();
        assert_eq!(engine.today_view(1, day(1)).unwrap().unwrap().record.id, first);
    }

    #[tokio::test]
    async fn unreachable_user_does_not_abort_batch() {
        let engine = engine_with_users(&[1, 2, 3]);
        let recorder = Arc::new(RecordingMessenger::new().with_unreachable(2).with_failing(3));
        let messenger: Arc<dyn Messenger> = recorder.clone();

        let report = run_daily_issuance(&engine, &messenger, day(1), 4).await.unwrap();
        assert_eq!(
            report,
            BatchReport {
                attempted: 3,
                delivered: 1,
                skipped: 0,
                unreachable: 1,
                failed: 1,
            }
        );
        assert_eq!(recorder.recipients(), vec![1]);

        let reachable: Vec<i64> = engine
            .reachable_users()
            .unwrap()
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        assert_eq!(reachable, vec![1, 3]);
    }

    #[tokio::test]
    async fn reminders_skip_completed_users() {
        let engine = engine_with_users(&[1, 2, 3]);
        engine
            .submit_answers(1, day(2), &"x\n".repeat(10), Utc::now())
            .unwrap();
        engine.submit_answers(2, day(2), "x\ny", Utc::now()).unwrap();

        let recorder = Arc::new(RecordingMessenger::new());
        let messenger: Arc<dyn Messenger> = recorder.clone();
        let report = run_reminder(&engine, &messenger, day(2), ReminderKind::Final, 8)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(recorder.recipients(), vec![2, 3]);
        assert!(recorder
            .sent()
            .iter()
            .all(|(_, m)| m.text.starts_with("Last reminder!")));
    }

    #[tokio::test]
    async fn digest_reaches_everyone() {
        let engine = engine_with_users(&[7, 8]);
        let recorder = Arc::new(RecordingMessenger::new());
        let messenger: Arc<dyn Messenger> = recorder.clone();

        let report = run_weekly_digest(&engine, &messenger, day(3), 1).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert!(recorder.sent()[0].1.text.contains("Current streak"));
    }

    #[tokio::test]
    async fn day_close_counts_misses() {
        let engine = engine_with_users(&[1]);
        engine.submit_answers(1, day(4), "one", Utc::now()).unwrap();
        let reports = run_day_close(&engine, day(4), Utc::now()).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].missed_users, vec![1]);
    }

    #[tokio::test]
    async fn day_close_sweeps_records_created_after_earlier_close() {
        let engine = engine_with_users(&[1, 2]);
        run_day_close(&engine, day(4), Utc::now()).await.unwrap();
        engine.submit_answers(1, day(4), "one\ntwo", Utc::now()).unwrap();

        let reports = run_day_close(&engine, day(5), Utc::now()).await.unwrap();
        let dates: Vec<_> = reports.iter().filter_map(|r| r.date).collect();
        assert_eq!(dates, vec![day(4), day(5)]);

        let user = engine.user(1).unwrap();
        assert_eq!(user.missed_days, 1);
        let record = engine.today_view(1, day(4)).unwrap().unwrap().record;
        assert!(record.closed_at.is_some());
    }
}
