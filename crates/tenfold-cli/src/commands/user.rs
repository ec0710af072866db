use chrono::Utc;
use clap::Subcommand;

use super::App;

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user (re-enables delivery for a returning one)
    Register { user_id: i64 },
    /// Streak, badges and today's record for a user
    Stats { user_id: i64 },
}

pub fn run(action: UserAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    match action {
        UserAction::Register { user_id } => {
            let user = app.engine.register_user(user_id, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UserAction::Stats { user_id } => {
            let stats = app.engine.user_stats(user_id, app.today()?)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
