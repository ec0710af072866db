pub mod badge;
pub mod config;
pub mod day;
pub mod progress;
pub mod question;
pub mod serve;
pub mod stats;
pub mod user;

use chrono::{NaiveDate, Utc};
use tenfold_core::{Config, Database, Engine};

/// Loaded config plus an engine over the configured database.
pub struct App {
    pub config: Config,
    pub engine: Engine,
}

impl App {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let db = Database::open(&config.database_path()?)?;
        let engine = Engine::new(db, config.rules());
        engine.seed_default_questions()?;
        Ok(Self { config, engine })
    }

    /// The participant day currently open in the configured offset.
    pub fn today(&self) -> Result<NaiveDate, Box<dyn std::error::Error>> {
        Ok(self.config.plan()?.open_date(Utc::now()))
    }
}
