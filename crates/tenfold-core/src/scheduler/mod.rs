//! Time-driven orchestration of the daily loop.
//!
//! [`SchedulePlan`] knows when things happen; [`Scheduler`] sleeps until the
//! next instant and dispatches the due [`Job`]s as batches.

mod plan;

pub use plan::{parse_offset, Job, SchedulePlan, Trigger};

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::engine::Engine;
use crate::error::Result;
use crate::jobs::{self, BatchReport};
use crate::messenger::Messenger;

pub struct Scheduler {
    engine: Arc<Engine>,
    messenger: Arc<dyn Messenger>,
    plan: SchedulePlan,
    concurrency: usize,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<Engine>,
        messenger: Arc<dyn Messenger>,
        plan: SchedulePlan,
        concurrency: usize,
    ) -> Self {
        Self {
            engine,
            messenger,
            plan,
            concurrency,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn plan(&self) -> &SchedulePlan {
        &self.plan
    }

    /// Close any past date left open while the process was down.
    pub async fn catch_up(&self) -> Result<usize> {
        let now = self.clock.now();
        let open = self.plan.open_date(now);
        let reports =
            jobs::on_store(&self.engine, move |engine| engine.catch_up(open, now)).await?;
        for report in &reports {
            if let Some(date) = report.date {
                info!(date = %date, missed = report.missed_users.len(), "caught up day close");
            }
        }
        Ok(reports.len())
    }

    /// Run one job for `date`. Delivery batches return their report; day
    /// closing reports no deliveries.
    pub async fn run_job(&self, job: Job, date: NaiveDate) -> Result<BatchReport> {
        match job {
            Job::Issue => {
                jobs::run_daily_issuance(&self.engine, &self.messenger, date, self.concurrency)
                    .await
            }
            Job::Remind(kind) => {
                jobs::run_reminder(&self.engine, &self.messenger, date, kind, self.concurrency)
                    .await
            }
            Job::CloseDay => {
                let reports = jobs::run_day_close(&self.engine, date, self.clock.now()).await?;
                for report in &reports {
                    if let Some(date) = report.date {
                        info!(date = %date, missed = report.missed_users.len(), "day closed");
                    }
                }
                Ok(BatchReport::default())
            }
            Job::Digest => {
                jobs::run_weekly_digest(&self.engine, &self.messenger, date, self.concurrency)
                    .await
            }
        }
    }

    /// Loop until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if let Err(e) = self.catch_up().await {
            error!(error = %e, "startup day-close catch-up failed");
        }

        let mut last_fired: Option<DateTime<Utc>> = None;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.now();
            let from = last_fired.map_or(now, |t| t.max(now));
            let Some((at, due)) = self.plan.next_fire(from) else {
                warn!("schedule has no triggers, scheduler idle");
                // Nothing to wait for but shutdown.
                let _ = shutdown.changed().await;
                break;
            };

            let wait = (at - now).to_std().unwrap_or_default();
            info!(next = %at, jobs = due.len(), "waiting for next trigger");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            last_fired = Some(at);
            for job in due {
                let date = self.plan.date_for(job, at);
                match self.run_job(job, date).await {
                    Ok(report) => info!(job = %job, date = %date, ?report, "job finished"),
                    Err(e) => error!(job = %job, date = %date, error = %e, "job failed"),
                }
            }
        }

        info!("scheduler stopped");
        Ok(())
    }
}
