//! Achievements command implementation

use anyhow::Result;

use questlog::progression::Achievement;

use super::{GlobalArgs, Session};

/// List achievements; locked ones closest to done first.
///
/// Without `all`, only unlocked achievements and the next few are shown.
pub fn achievements_command(args: &GlobalArgs, all: bool) -> Result<()> {
    let session = Session::open(args)?;
    let evaluation = session.engine.evaluate_achievements(&session.user_id)?;

    for id in &evaluation.newly_unlocked {
        println!("Newly unlocked: {}", id.as_str());
    }

    let summary = evaluation.summary();
    println!(
        "Achievements: {}/{} ({}%), {}/{} XP earned\n",
        summary.unlocked,
        summary.total,
        summary.percentage,
        summary.xp_earned,
        Achievement::total_xp()
    );

    let shown: Vec<_> = if all {
        evaluation.progress.iter().collect()
    } else {
        let mut shown = evaluation.next_achievements();
        shown.extend(evaluation.progress.iter().filter(|p| p.unlocked));
        shown
    };

    for entry in shown {
        let a = entry.achievement;
        let mark = if entry.unlocked { "x" } else { " " };
        println!(
            "  [{mark}] {} {} ({}, {} XP)",
            a.icon,
            a.title,
            entry.rarity.label(),
            a.xp_reward
        );
        if !entry.unlocked {
            println!(
                "        {} - {}/{} ({}%)",
                a.format_requirement(),
                entry.current_value,
                a.requirement_value,
                entry.percentage
            );
        }
    }

    Ok(())
}
