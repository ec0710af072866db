use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use tenfold_core::{jobs, LogMessenger, Messenger, ReminderKind};

use super::App;

#[derive(Subcommand)]
pub enum DayAction {
    /// Issue the day's question to every reachable user
    Issue {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Remind users who have not finished the day
    Remind {
        /// Send the last-call wording
        #[arg(long = "final")]
        is_final: bool,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Close a day and apply miss penalties
    Close {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Send the streak digest
    Digest,
}

pub fn run(action: DayAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let today = app.today()?;
    let concurrency = app.config.fanout.max_concurrency;

    if let DayAction::Close { date } = action {
        let report = app.engine.close_day(date.unwrap_or(today), Utc::now())?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let engine = Arc::new(app.engine);
    let messenger: Arc<dyn Messenger> = Arc::new(LogMessenger);
    let rt = tokio::runtime::Runtime::new()?;

    let report = rt.block_on(async {
        match action {
            DayAction::Issue { date } => {
                jobs::run_daily_issuance(&engine, &messenger, date.unwrap_or(today), concurrency)
                    .await
            }
            DayAction::Remind { is_final, date } => {
                let kind = if is_final {
                    ReminderKind::Final
                } else {
                    ReminderKind::Regular
                };
                jobs::run_reminder(&engine, &messenger, date.unwrap_or(today), kind, concurrency)
                    .await
            }
            DayAction::Digest => {
                jobs::run_weekly_digest(&engine, &messenger, today, concurrency).await
            }
            DayAction::Close { .. } => Ok(Default::default()),
        }
    })?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
