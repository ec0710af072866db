use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tenfold", version, about = "Tenfold daily practice CLI")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Participant management
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Show (and create if needed) today's question for a user
    Today {
        user_id: i64,
    },
    /// Submit answers, one per line
    Answer {
        user_id: i64,
        text: String,
    },
    /// Replace today's question
    ChangeQuestion {
        user_id: i64,
    },
    /// Extra practice question after the day is done
    Bonus {
        user_id: i64,
    },
    /// Run a daily batch by hand
    Day {
        #[command(subcommand)]
        action: commands::day::DayAction,
    },
    /// Question catalog
    Question {
        #[command(subcommand)]
        action: commands::question::QuestionAction,
    },
    /// Badge catalog
    Badge {
        #[command(subcommand)]
        action: commands::badge::BadgeAction,
    },
    /// System-wide statistics
    Stats {
        /// Date in YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the scheduler until interrupted
    Serve,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match cli.command {
            Commands::Serve => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::User { action } => commands::user::run(action),
        Commands::Today { user_id } => commands::progress::today(user_id),
        Commands::Answer { user_id, text } => commands::progress::answer(user_id, &text),
        Commands::ChangeQuestion { user_id } => commands::progress::change_question(user_id),
        Commands::Bonus { user_id } => commands::progress::bonus(user_id),
        Commands::Day { action } => commands::day::run(action),
        Commands::Question { action } => commands::question::run(action),
        Commands::Badge { action } => commands::badge::run(action),
        Commands::Stats { date } => commands::stats::run(date),
        Commands::Config { action } => commands::config::run(action),
        Commands::Serve => commands::serve::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
