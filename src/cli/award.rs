//! Direct XP and counter commands for events the surrounding app owns
//! (goals, friends, rewards)

use anyhow::{Result, anyhow};

use questlog::progression::{CounterKind, XpReason};

use super::{GlobalArgs, Session};

/// Append XP to the ledger under `reason`
pub fn award_command(
    args: &GlobalArgs,
    amount: i64,
    reason: &str,
    reference: Option<&str>,
) -> Result<()> {
    let reason = XpReason::from_str(reason).ok_or_else(|| {
        anyhow!("Unknown reason '{reason}' (task_complete, habit_complete, achievement, daily_bonus, challenge, goal_complete)")
    })?;

    let session = Session::open(args)?;
    let entry = session
        .engine
        .award_xp(&session.user_id, amount, reason, reference)?;
    // Bring the snapshot up to date and unlock anything the XP qualifies for
    let progress = session.engine.reconcile(&session.user_id)?;
    let evaluation = session.engine.evaluate_achievements(&session.user_id)?;

    println!("Ledger entry #{}: +{} XP ({})", entry.id, entry.amount, reason.as_str());
    println!("Total XP: {} (level {})", progress.total_xp, progress.current_level);
    for id in evaluation.newly_unlocked {
        println!("Achievement unlocked: {}", id.as_str());
    }
    Ok(())
}

/// Adjust an externally owned counter
pub fn counter_command(args: &GlobalArgs, kind: &str, delta: i64) -> Result<()> {
    let kind = CounterKind::from_str(kind).ok_or_else(|| {
        anyhow!("Unknown counter '{kind}' (habits_created, goals_created, goals_completed, concurrent_habits, friends, rewards_redeemed, early_adopter)")
    })?;

    let session = Session::open(args)?;
    let update = session.engine.record_counter(&session.user_id, kind, delta)?;
    println!("Counter updated.");
    for u in update.unlocked {
        println!("Achievement unlocked: {} (+{} XP)", u.achievement.title, u.xp_granted);
    }
    println!("Total XP: {}", update.progress.total_xp);
    Ok(())
}
