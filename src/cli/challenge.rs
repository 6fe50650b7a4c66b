//! Daily challenge command

use anyhow::Result;

use super::{GlobalArgs, Session, parse_date};

/// Show (and re-tally) the challenge for a date, creating it if needed
pub fn challenge_command(args: &GlobalArgs, date: Option<&str>) -> Result<()> {
    let date = parse_date(date)?;
    let session = Session::open(args)?;
    let engine = &session.engine;

    let level = engine.level_progress(&session.user_id)?.level;
    let challenge = engine.ensure_daily_challenge(date, level)?;
    let progress = engine.update_challenge_progress(&session.user_id, &challenge.id)?;

    println!("Daily challenge {}", challenge.challenge_date);
    println!(
        "  tasks:  {}/{}",
        progress.tasks_completed, challenge.task_target
    );
    println!(
        "  habits: {}/{}",
        progress.habits_completed, challenge.habit_target
    );
    println!("  XP:     {}/{}", progress.xp_earned, challenge.xp_target);
    println!(
        "  reward: {} coins, {} XP",
        challenge.coin_reward, challenge.xp_reward
    );

    match progress.completed_at {
        Some(at) if progress.completed => println!("Completed at {}", at.format("%H:%M UTC")),
        _ => println!("{}% done", progress.overall_percentage(&challenge)),
    }
    Ok(())
}
