//! Participant actions, printed the way a chat front end would send them.

use chrono::Utc;
use tenfold_core::messenger::OutgoingMessage;
use tenfold_core::{messages, SubmitOutcome};

use super::App;

fn print_message(message: &OutgoingMessage) {
    println!("{}", message.text);
    for control in &message.controls {
        match control {
            tenfold_core::Control::ChangeQuestion { remaining } => {
                println!("[change question: {remaining} left]");
            }
        }
    }
}

pub fn today(user_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    app.engine.register_user(user_id, Utc::now())?;
    let view = app.engine.today(user_id, app.today()?)?;
    print_message(&messages::question_of_day(
        &view,
        app.engine.rules().completion_threshold,
    ));
    Ok(())
}

pub fn answer(user_id: i64, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    app.engine.register_user(user_id, Utc::now())?;
    let threshold = app.engine.rules().completion_threshold;
    let date = app.today()?;

    match app.engine.submit_answers(user_id, date, text, Utc::now())? {
        SubmitOutcome::InProgress { record, .. } => {
            let changes_left = app
                .engine
                .today_view(user_id, date)?
                .map_or(0, |view| view.changes_left);
            print_message(&messages::progress(&record, threshold, changes_left));
        }
        SubmitOutcome::Completed(completion) => {
            print_message(&messages::completed(&completion, threshold));
        }
    }
    Ok(())
}

pub fn change_question(user_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let record = app.engine.get_or_create_today(user_id, app.today()?)?;
    let view = app.engine.change_question(record.id)?;
    print_message(&messages::question_of_day(
        &view,
        app.engine.rules().completion_threshold,
    ));
    Ok(())
}

pub fn bonus(user_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let question = app.engine.bonus_question(user_id)?;
    println!("Bonus question: {}", question.text);
    Ok(())
}
