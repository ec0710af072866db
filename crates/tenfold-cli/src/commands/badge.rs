use clap::Subcommand;

use super::App;

#[derive(Subcommand)]
pub enum BadgeAction {
    /// List the badge catalog
    List,
}

pub fn run(action: BadgeAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    match action {
        BadgeAction::List => {
            let badges = app.engine.list_badges()?;
            println!("{}", serde_json::to_string_pretty(&badges)?);
        }
    }
    Ok(())
}
