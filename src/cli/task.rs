//! Task completion command

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use questlog::progression::{AwardBonuses, CompletionEvent, Priority};

use super::{GlobalArgs, Session, print_outcome};

/// Options for `questlog task`
#[derive(Debug, Clone, Default)]
pub struct TaskArgs {
    pub task_id: String,
    pub priority: String,
    pub xp: Option<i64>,
    pub area: Option<String>,
    /// RFC 3339 completion time, defaults to now
    pub at: Option<String>,
    pub streak: Option<u32>,
    pub priority_bonus: bool,
    pub first_completion: bool,
    pub daily_streak: bool,
}

/// Record a completed task
pub fn task_command(args: &GlobalArgs, task: TaskArgs) -> Result<()> {
    let session = Session::open(args)?;

    let completed_at = match task.at.as_deref() {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid completion time '{s}', expected RFC 3339"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let priority = Priority::from_label(&task.priority);

    let event = CompletionEvent::Task {
        task_id: task.task_id,
        priority,
        xp_override: task.xp,
        completed_at,
        area: task.area,
        bonuses: AwardBonuses {
            streak_days: task.streak,
            priority: task.priority_bonus.then_some(priority),
            first_completion: task.first_completion,
            daily_streak: task.daily_streak,
        },
    };

    let outcome = session.complete(event)?;
    print_outcome(&outcome);
    Ok(())
}
