//! Reconcile command: rebuild the progress snapshot from the XP ledger

use anyhow::Result;

use questlog::store::ProgressStore;

use super::{GlobalArgs, Session};

pub fn reconcile_command(args: &GlobalArgs) -> Result<()> {
    let session = Session::open(args)?;
    let before = session.engine.store().load_progress(&session.user_id)?;
    let after = session.engine.reconcile(&session.user_id)?;

    if before.total_xp == after.total_xp {
        println!(
            "Snapshot already matches the ledger: {} XP, level {}",
            after.total_xp, after.current_level
        );
    } else {
        println!(
            "Recomputed {} XP (level {}) -> {} XP (level {})",
            before.total_xp, before.current_level, after.total_xp, after.current_level
        );
    }

    let evaluation = session.engine.evaluate_achievements(&session.user_id)?;
    for id in evaluation.newly_unlocked {
        println!("Unlocked: {}", id.as_str());
    }
    Ok(())
}
