use clap::Subcommand;

use super::App;

#[derive(Subcommand)]
pub enum QuestionAction {
    /// Add a question to the catalog
    Add { text: String },
    /// List all questions
    List,
    /// Assignment and completion counts per question
    Stats,
}

pub fn run(action: QuestionAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    match action {
        QuestionAction::Add { text } => {
            if text.trim().is_empty() {
                return Err("question text is empty".into());
            }
            let question = app.engine.add_question(&text)?;
            println!("Question added: {}", question.id);
        }
        QuestionAction::List => {
            let questions = app.engine.list_questions()?;
            println!("{}", serde_json::to_string_pretty(&questions)?);
        }
        QuestionAction::Stats => {
            let stats = app.engine.question_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
