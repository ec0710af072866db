mod config;
pub mod database;
pub mod migrations;

pub use config::{
    Config, FanoutConfig, ProgressConfig, ScheduleConfig, StorageConfig,
};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `TENFOLD_HOME` wins when set. Otherwise `~/.config/tenfold[-dev]/`,
/// where `TENFOLD_ENV=dev` selects the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TENFOLD_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("TENFOLD_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("tenfold-dev")
            } else {
                base_dir.join("tenfold")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
