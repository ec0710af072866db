//! # Tenfold Core Library
//!
//! Business logic for Tenfold, a daily practice loop: every participant gets
//! one question a day and completes the day by sending ten answers.
//! Consecutive completed days build a streak, and streak milestones unlock
//! badges. The CLI binary and any chat front end are thin layers over this
//! crate.
//!
//! ## Architecture
//!
//! - **Question Catalog**: random prompt selection that avoids repeats
//! - **Progress Ledger**: one day record per user and date, answer counting,
//!   bounded question changes, completion
//! - **Streak & Badges**: streak arithmetic and one-time milestone awards
//! - **Day Closing**: end-of-day miss penalties, idempotent per date
//! - **Scheduler**: wall-clock triggers in a configured offset fanning out
//!   deliveries through the [`Messenger`] seam
//! - **Storage**: SQLite persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: shared handle over the store and the daily rules
//! - [`Scheduler`]: the daemon loop
//! - [`Database`]: persistence
//! - [`Config`]: application configuration

pub mod catalog;
pub mod clock;
pub mod day_close;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod messages;
pub mod messenger;
pub mod model;
pub mod scheduler;
pub mod storage;
pub mod streak;

pub use clock::{Clock, SystemClock};
pub use day_close::DayCloseReport;
pub use engine::{Engine, Rules};
pub use error::{ConfigError, CoreError, DatabaseError};
pub use jobs::{BatchReport, ReminderKind};
pub use ledger::{count_answers, Completion, DayView, SubmitOutcome};
pub use messenger::{Control, DeliveryError, LogMessenger, Messenger, OutgoingMessage};
pub use model::{
    Badge, EarnedBadge, ProgressRecord, Question, QuestionStats, SystemStats, User, UserStats,
};
pub use scheduler::{Job, SchedulePlan, Scheduler};
pub use storage::{Config, Database};
pub use streak::{StreakTransition, StreakUpdate};
