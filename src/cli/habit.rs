//! Habit commands: add, check-in, list

use anyhow::{Result, anyhow};
use chrono::Utc;

use questlog::progression::{CompletionEvent, Frequency, StreakChange};
use questlog::store::ProgressStore;

use super::{GlobalArgs, Session, parse_date, print_outcome};

/// Create a habit for the current user
pub fn add_command(
    args: &GlobalArgs,
    name: &str,
    frequency: &str,
    xp: Option<i64>,
) -> Result<()> {
    let frequency = Frequency::from_str(frequency)
        .ok_or_else(|| anyhow!("Unknown frequency '{frequency}' (daily, weekly, monthly)"))?;

    let session = Session::open(args)?;
    let (habit, unlocked) = session
        .engine
        .create_habit(&session.user_id, name, frequency, xp)?;

    println!(
        "Created habit {} ({}, {} XP per check-in)",
        habit.name,
        habit.frequency.as_str(),
        habit.xp_reward
    );
    println!("  id: {}", habit.id);
    for u in unlocked {
        println!("Achievement unlocked: {} (+{} XP)", u.achievement.title, u.xp_granted);
    }
    Ok(())
}

/// Check a habit in for a date (default today)
pub fn check_in_command(
    args: &GlobalArgs,
    habit_id: &str,
    date: Option<&str>,
    no_xp: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let session = Session::open(args)?;

    if no_xp {
        let result = session.engine.check_in_habit(habit_id, date)?;
        match result.change {
            StreakChange::Duplicate => println!("Already checked in for {date}."),
            StreakChange::Backfilled => println!("Recorded {date} (streak unchanged)."),
            _ => println!("Checked in. Streak: {}", result.habit.current_streak),
        }
        return Ok(());
    }

    let outcome = session.complete(CompletionEvent::habit(habit_id, date))?;
    print_outcome(&outcome);
    if let Some(streak) = &outcome.streak {
        println!(
            "Streak: {} (best {})",
            streak.habit.current_streak, streak.habit.longest_streak
        );
    }
    Ok(())
}

/// List the current user's habits with their streaks as of today
pub fn list_command(args: &GlobalArgs) -> Result<()> {
    let session = Session::open(args)?;
    let habits = session.engine.store().list_habits(&session.user_id)?;

    if habits.is_empty() {
        println!("No habits yet. Add one with: questlog habit add <name>");
        return Ok(());
    }

    let today = Utc::now().date_naive();
    println!("Habits ({}):\n", habits.len());
    for habit in habits {
        let last = habit
            .last_completed_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {} [{}] streak {} (best {}), last {}",
            habit.name,
            habit.frequency.as_str(),
            habit.effective_streak(today),
            habit.longest_streak,
            last
        );
        println!("    id: {}", habit.id);
    }
    Ok(())
}
