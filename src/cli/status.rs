//! Status command implementation

use anyhow::Result;
use chrono::Utc;

use questlog::progression::LevelProgress;
use questlog::store::ProgressStore;

use super::{GlobalArgs, Session, progress_bar};

/// Number of ledger entries shown under "Recent XP"
const RECENT_ENTRIES: usize = 5;

/// Show level, counters, today's challenge and the next achievements
pub fn status_command(args: &GlobalArgs) -> Result<()> {
    let session = Session::open(args)?;
    let user_id = &session.user_id;
    let engine = &session.engine;

    let progress = engine.progress(user_id)?;
    let level = LevelProgress::new(progress.total_xp);

    println!("{user_id}: Level {} - {}", level.level, level.title);
    println!(
        "  {} {} / {} XP ({} to next)",
        progress_bar(level.progress, 20),
        level.total_xp,
        level.next_level_xp,
        level.xp_to_next_level
    );
    println!("  Coins: {}", progress.coins);
    println!("  Tasks completed: {}", progress.total_tasks_completed);
    println!("  Longest habit streak: {}", progress.longest_habit_streak);
    println!("  Active days in a row: {}", progress.counters.active_days);

    let today = Utc::now().date_naive();
    if let Some(challenge) = engine.store().challenge_for_date(today)? {
        let standing = engine
            .store()
            .load_challenge_progress(user_id, &challenge.id)?;
        println!("\nToday's challenge:");
        match standing {
            Some(p) => println!(
                "  tasks {}/{}, habits {}/{}, XP {}/{} ({}%){}",
                p.tasks_completed,
                challenge.task_target,
                p.habits_completed,
                challenge.habit_target,
                p.xp_earned,
                challenge.xp_target,
                p.overall_percentage(&challenge),
                if p.completed { " - complete" } else { "" }
            ),
            None => println!("  not started"),
        }
    }

    let evaluation = engine.evaluate_achievements(user_id)?;
    let summary = evaluation.summary();
    println!(
        "\nAchievements: {}/{} ({}%)",
        summary.unlocked, summary.total, summary.percentage
    );
    for next in evaluation.next_achievements() {
        println!(
            "  next: {} - {} ({}%)",
            next.achievement.title,
            next.achievement.format_requirement(),
            next.percentage
        );
    }

    let recent = engine.store().recent_ledger(user_id, RECENT_ENTRIES)?;
    if !recent.is_empty() {
        println!("\nRecent XP:");
        for entry in recent {
            println!(
                "  {} +{} {}{}",
                entry.day,
                entry.amount,
                entry.reason.as_str(),
                entry
                    .reference_id
                    .as_deref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            );
        }
    }

    Ok(())
}
