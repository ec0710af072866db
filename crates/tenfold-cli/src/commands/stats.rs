use chrono::NaiveDate;

use super::App;

pub fn run(date: Option<NaiveDate>) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let date = match date {
        Some(date) => date,
        None => app.today()?,
    };
    let stats = app.engine.system_stats(date)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
