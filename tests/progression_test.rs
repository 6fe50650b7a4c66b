//! End-to-end tests for the progression engine on a file-backed database

mod common;

use std::collections::HashMap;
use std::thread;

use chrono::{NaiveDate, Utc};

use questlog::ProgressError;
use questlog::progression::{
    Achievement, AchievementId, AchievementUnlock, CompletionEvent, DailyChallenge,
    EngineSettings, Frequency, LevelUp, Priority, ProgressionEngine, StreakChange, XpReason,
    level_for,
};
use questlog::store::{ProgressStore, SqliteStore};

use common::{FlakyStore, complete_with_retry, create_test_engine, noon_task, open_engine};

fn unlock_counts(unlocks: &[AchievementUnlock]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for unlock in unlocks {
        *counts.entry(unlock.achievement_id.clone()).or_default() += 1;
    }
    counts
}

fn achievement_xp(unlocks: &[AchievementUnlock]) -> i64 {
    unlocks
        .iter()
        .filter_map(|u| AchievementId::from_str(&u.achievement_id))
        .filter_map(Achievement::get)
        .map(|a| a.xp_reward)
        .sum()
}

#[test]
fn test_high_task_from_zero() {
    let (_dir, engine) = create_test_engine();

    let outcome = engine
        .process_completion_event("alice", noon_task("t1", Priority::High))
        .unwrap();

    assert_eq!(outcome.award.unwrap().total(), 50);
    assert_eq!(outcome.total_xp_after_award, 50);
    assert_eq!(outcome.level_up, None);
    assert_eq!(engine.level_progress("alice").unwrap().level, 1);
}

#[test]
fn test_medium_task_from_90_levels_up() {
    let (_dir, engine) = create_test_engine();
    engine
        .award_xp("alice", 90, XpReason::DailyBonus, Some("seed"))
        .unwrap();

    let outcome = engine
        .process_completion_event("alice", noon_task("t1", Priority::Medium))
        .unwrap();

    assert_eq!(outcome.total_xp_after_award, 120);
    assert_eq!(outcome.level_up, Some(LevelUp { from: 1, to: 2 }));
    let progress = engine.progress("alice").unwrap();
    assert_eq!(progress.current_level, level_for(progress.total_xp));
}

#[test]
fn test_state_survives_reopen() {
    let (dir, engine) = create_test_engine();
    engine
        .process_completion_event("alice", noon_task("t1", Priority::High))
        .unwrap();
    drop(engine);

    let store = SqliteStore::open(&dir.path().join("questlog.db")).unwrap();
    let engine = ProgressionEngine::new(store, EngineSettings::default());
    let replay = engine
        .process_completion_event("alice", noon_task("t1", Priority::High))
        .unwrap();

    assert!(replay.replayed);
    assert_eq!(replay.total_xp, 75);
    assert!(replay.unlocked_achievements.is_empty());
}

#[test]
fn test_users_are_isolated() {
    let (_dir, engine) = create_test_engine();
    engine
        .process_completion_event("alice", noon_task("t1", Priority::High))
        .unwrap();
    let bob = engine
        .process_completion_event("bob", noon_task("t1", Priority::Low))
        .unwrap();

    assert!(!bob.replayed);
    assert_eq!(bob.total_xp_after_award, 10);
    assert_eq!(engine.level_progress("alice").unwrap().total_xp, 75);
}

#[test]
fn test_duplicate_habit_check_in_is_noop() {
    let (_dir, engine) = create_test_engine();
    let (habit, _) = engine
        .create_habit("alice", "Stretch", Frequency::Daily, None)
        .unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let first = engine
        .process_completion_event("alice", CompletionEvent::habit(&habit.id, day))
        .unwrap();
    let total = first.total_xp;

    let again = engine
        .process_completion_event("alice", CompletionEvent::habit(&habit.id, day))
        .unwrap();
    let streak = again.streak.unwrap();
    assert_eq!(streak.change, StreakChange::Duplicate);
    assert_eq!(streak.habit.current_streak, 1);
    assert_eq!(again.total_xp, total);
    assert_eq!(engine.store().ledger_total("alice").unwrap(), total);
}

/// Many threads finishing tasks for one user at once: every task pays exactly
/// once and every achievement unlocks exactly once.
#[test]
fn test_concurrent_completions_for_one_user() {
    const TASKS: usize = 60;
    const THREADS: usize = 6;

    let (_dir, engine) = create_test_engine();

    thread::scope(|s| {
        for worker in 0..THREADS {
            let engine = &engine;
            s.spawn(move || {
                for i in (worker..TASKS).step_by(THREADS) {
                    let task_id = format!("task-{i}");
                    engine
                        .process_completion_event("alice", noon_task(&task_id, Priority::Medium))
                        .unwrap();
                    // Retry of the same event from another request
                    engine
                        .process_completion_event("alice", noon_task(&task_id, Priority::Medium))
                        .unwrap();
                }
            });
        }
    });

    let unlocks = engine.store().unlocked_achievements("alice").unwrap();
    let counts = unlock_counts(&unlocks);
    assert!(counts.values().all(|&n| n == 1), "duplicate unlock: {counts:?}");
    let achievement_xp = achievement_xp(&unlocks);

    let progress = engine.progress("alice").unwrap();
    assert_eq!(progress.total_tasks_completed, TASKS as u64);
    assert_eq!(progress.total_xp, 30 * TASKS as i64 + achievement_xp);
    assert_eq!(engine.store().load_progress("alice").unwrap().total_xp, progress.total_xp);

    // 60 tasks: first task, task master, level 5, level 10, xp collector
    for id in [
        AchievementId::FirstTask,
        AchievementId::TaskMaster,
        AchievementId::Level5,
        AchievementId::Level10,
        AchievementId::XpCollector,
    ] {
        assert_eq!(counts.get(id.as_str()), Some(&1), "{} missing", id.as_str());
    }
    assert_eq!(progress.total_xp, 2265);
}

#[test]
fn test_evaluation_reports_progress() {
    let (_dir, engine) = create_test_engine();
    for i in 0..10 {
        engine
            .process_completion_event("alice", noon_task(&format!("t{i}"), Priority::High))
            .unwrap();
    }

    let evaluation = engine.evaluate_achievements("alice").unwrap();
    assert!(evaluation.newly_unlocked.is_empty());

    let task_master = evaluation
        .progress
        .iter()
        .find(|p| p.achievement.id == AchievementId::TaskMaster)
        .unwrap();
    assert_eq!(task_master.current_value, 10);
    assert_eq!(task_master.percentage, 20);
    assert!(!task_master.unlocked);
    assert_eq!(evaluation.next_achievements().len(), 3);
}

/// Two engines on one database file only coordinate through the snapshot
/// version, so conflicting events are rerun by the caller.
#[test]
fn test_two_engines_share_one_database() {
    const TASKS: usize = 40;

    let (dir, engine_a) = create_test_engine();
    let engine_b = open_engine(&dir.path().join("questlog.db"));

    let (a, b) = (&engine_a, &engine_b);
    thread::scope(|s| {
        for (worker, (engine, other)) in [(a, b), (b, a), (a, b), (b, a)].into_iter().enumerate() {
            s.spawn(move || {
                for i in (worker..TASKS).step_by(4) {
                    let task_id = format!("task-{i}");
                    complete_with_retry(engine, "alice", noon_task(&task_id, Priority::Medium));
                    // The other engine sees the same completion as a replay
                    let replay = complete_with_retry(other, "alice", noon_task(&task_id, Priority::Medium));
                    assert!(replay.replayed);
                }
            });
        }
    });

    // Settle snapshot-driven unlocks (level, total XP) that a lost race deferred
    engine_a.reconcile("alice").unwrap();
    engine_a.evaluate_achievements("alice").unwrap();

    let unlocks = engine_b.store().unlocked_achievements("alice").unwrap();
    let counts = unlock_counts(&unlocks);
    assert!(counts.values().all(|&n| n == 1), "duplicate unlock: {counts:?}");
    for id in [
        AchievementId::FirstTask,
        AchievementId::Level5,
        AchievementId::Level10,
        AchievementId::XpCollector,
    ] {
        assert_eq!(counts.get(id.as_str()), Some(&1), "{} missing", id.as_str());
    }

    let progress = engine_b.progress("alice").unwrap();
    assert_eq!(progress.total_tasks_completed, TASKS as u64);
    assert_eq!(progress.total_xp, 30 * TASKS as i64 + achievement_xp(&unlocks));
    assert_eq!(engine_a.store().load_progress("alice").unwrap().total_xp, progress.total_xp);
}

#[test]
fn test_counters_survive_conflict_then_later_event() {
    // The first snapshot save carrying a task count loses the race
    let engine = FlakyStore::new(1, |p| p.total_tasks_completed > 0).engine();

    let err = engine
        .process_completion_event("alice", noon_task("t1", Priority::High))
        .unwrap_err();
    assert!(err.is_retryable());

    engine
        .process_completion_event("alice", noon_task("t2", Priority::High))
        .unwrap();
    let retry = engine
        .process_completion_event("alice", noon_task("t1", Priority::High))
        .unwrap();
    assert!(retry.replayed);

    let progress = engine.progress("alice").unwrap();
    assert_eq!(progress.total_tasks_completed, 2);
    assert_eq!(progress.counters.high_priority_tasks, 2);
    assert_eq!(progress.total_xp, 2 * 50 + 25);
}

#[test]
fn test_challenge_reward_survives_failed_save() {
    // The save that credits the challenge coins loses the race once
    let engine = FlakyStore::new(1, |p| p.coins > 0).engine();
    let today = Utc::now().date_naive();

    for name in ["Walk", "Read"] {
        let (habit, _) = engine
            .create_habit("alice", name, Frequency::Daily, None)
            .unwrap();
        engine
            .process_completion_event("alice", CompletionEvent::habit(&habit.id, today))
            .unwrap();
    }
    for task_id in ["t0", "t1"] {
        engine
            .process_completion_event("alice", CompletionEvent::task(task_id, Priority::Medium))
            .unwrap();
    }

    let third = CompletionEvent::task("t2", Priority::Medium);
    let err = engine
        .process_completion_event("alice", third.clone())
        .unwrap_err();
    assert!(matches!(err, ProgressError::ConcurrencyConflict { .. }));
    assert_eq!(engine.progress("alice").unwrap().coins, 0);

    let retry = engine.process_completion_event("alice", third).unwrap();
    assert!(retry.replayed);
    assert!(retry.challenge_completed);

    let progress = engine.progress("alice").unwrap();
    assert_eq!(progress.coins, 25);
    assert_eq!(progress.counters.daily_challenges, 1);

    // Later events and explicit re-tallies never pay again
    let later = engine
        .process_completion_event("alice", CompletionEvent::task("t3", Priority::Medium))
        .unwrap();
    assert!(!later.challenge_completed);
    engine
        .update_challenge_progress("alice", &DailyChallenge::id_for(today))
        .unwrap();
    let progress = engine.progress("alice").unwrap();
    assert_eq!(progress.coins, 25);
    assert_eq!(progress.counters.daily_challenges, 1);
}
