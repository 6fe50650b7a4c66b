use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

use cli::GlobalArgs;
use cli::task::TaskArgs;

#[derive(Parser)]
#[command(name = "questlog")]
#[command(about = "Quest log for your productivity - XP, levels, streaks, achievements and daily challenges")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.questlog/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database (overrides settings.database_path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// User to act as (overrides settings.default_user)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Record a completed task and award its XP
    Task {
        /// Task identifier; completing the same id twice awards XP once
        task_id: String,

        /// high, medium or low
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Custom base XP instead of the priority's
        #[arg(long)]
        xp: Option<i64>,

        /// Life area the task belongs to (work, health, ...)
        #[arg(short, long)]
        area: Option<String>,

        /// Completion time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,

        /// Current streak in days, for the streak bonus
        #[arg(long)]
        streak: Option<u32>,

        /// Add the high priority bonus
        #[arg(long)]
        priority_bonus: bool,

        /// Add the first-completion bonus
        #[arg(long)]
        first: bool,

        /// Add the daily streak bonus
        #[arg(long)]
        daily_streak: bool,
    },

    /// Manage habits
    Habit {
        #[command(subcommand)]
        action: HabitAction,
    },

    /// Show level, counters and the next achievements
    Status,

    /// List achievements and progress toward them
    Achievements {
        /// Show every achievement, not just unlocked and next
        #[arg(long)]
        all: bool,
    },

    /// Show the daily challenge
    Challenge {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },

    /// Award XP directly (goals, bonuses)
    Award {
        amount: i64,

        /// Ledger reason, e.g. goal_complete or daily_bonus
        #[arg(short, long, default_value = "daily_bonus")]
        reason: String,

        /// Reference id; repeating it awards only once
        #[arg(long)]
        reference: Option<String>,
    },

    /// Adjust a counter (friends, goals_completed, rewards_redeemed, ...)
    Counter {
        kind: String,

        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },

    /// Recompute total XP and level from the XP ledger
    Reconcile,
}

#[derive(Subcommand)]
enum HabitAction {
    /// Create a habit
    Add {
        name: String,

        /// daily, weekly or monthly
        #[arg(short, long, default_value = "daily")]
        frequency: String,

        /// XP per check-in (defaults to the frequency's base)
        #[arg(long)]
        xp: Option<i64>,
    },

    /// Check a habit in
    CheckIn {
        habit_id: String,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,

        /// Only record the streak, award no XP
        #[arg(long)]
        no_xp: bool,
    },

    /// List habits with their streaks
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = GlobalArgs {
        config: cli.config,
        db: cli.db,
        user: cli.user,
    };

    match cli.command {
        Commands::Init { force } => {
            cli::init::init_command(&args, force)?;
        }
        Commands::Task {
            task_id,
            priority,
            xp,
            area,
            at,
            streak,
            priority_bonus,
            first,
            daily_streak,
        } => {
            let task = TaskArgs {
                task_id,
                priority,
                xp,
                area,
                at,
                streak,
                priority_bonus,
                first_completion: first,
                daily_streak,
            };
            cli::task::task_command(&args, task)?;
        }
        Commands::Habit { action } => match action {
            HabitAction::Add {
                name,
                frequency,
                xp,
            } => {
                cli::habit::add_command(&args, &name, &frequency, xp)?;
            }
            HabitAction::CheckIn {
                habit_id,
                date,
                no_xp,
            } => {
                cli::habit::check_in_command(&args, &habit_id, date.as_deref(), no_xp)?;
            }
            HabitAction::List => {
                cli::habit::list_command(&args)?;
            }
        },
        Commands::Status => {
            cli::status::status_command(&args)?;
        }
        Commands::Achievements { all } => {
            cli::achievements::achievements_command(&args, all)?;
        }
        Commands::Challenge { date } => {
            cli::challenge::challenge_command(&args, date.as_deref())?;
        }
        Commands::Award {
            amount,
            reason,
            reference,
        } => {
            cli::award::award_command(&args, amount, &reason, reference.as_deref())?;
        }
        Commands::Counter { kind, delta } => {
            cli::award::counter_command(&args, &kind, delta)?;
        }
        Commands::Reconcile => {
            cli::reconcile::reconcile_command(&args)?;
        }
    }

    Ok(())
}
