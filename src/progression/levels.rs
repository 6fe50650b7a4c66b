//! XP and Level system
//!
//! Levels are a step function of cumulative XP. The first 25 levels come from
//! a fixed table; above that each threshold is 1.5x the previous one.

use serde::Serialize;

/// Cumulative XP required to reach each tabulated level (index 0 = level 1)
pub static LEVEL_THRESHOLDS: [i64; 25] = [
    0, 100, 200, 300, 400, 500, 600, 700, 800, 900, // 1-10
    1000, 1200, 1400, 1600, 1800, 2000, // 11-16
    2250, 2500, 2750, 3000, // 17-20
    3300, 3600, 3900, 4200, 4500, // 21-25
];

/// Growth factor for thresholds past the table
const EXTRAPOLATION_FACTOR: f64 = 1.5;

/// Progress fraction never reaches 1.0 once levels are extrapolated
const EXTRAPOLATED_PROGRESS_CAP: f64 = 0.99;

/// Highest level covered by the table
pub fn max_tabulated_level() -> u32 {
    LEVEL_THRESHOLDS.len() as u32
}

/// Cumulative XP at which `level` begins.
///
/// Level 0 and level 1 both start at 0 XP.
pub fn xp_for_level(level: u32) -> i64 {
    if level <= 1 {
        return 0;
    }
    let last_tabulated = max_tabulated_level();
    if level <= last_tabulated {
        return LEVEL_THRESHOLDS[(level - 1) as usize];
    }

    let last = LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1] as f64;
    let beyond = (level - last_tabulated).min(i32::MAX as u32) as i32;
    let threshold = (last * EXTRAPOLATION_FACTOR.powi(beyond)).floor();
    if threshold >= i64::MAX as f64 {
        i64::MAX
    } else {
        threshold as i64
    }
}

/// Level reached with `total_xp` cumulative XP (negative totals count as 0)
pub fn level_for(total_xp: i64) -> u32 {
    let xp = total_xp.max(0);

    if let Some(idx) = LEVEL_THRESHOLDS.iter().rposition(|&t| xp >= t) {
        let level = idx as u32 + 1;
        if level < max_tabulated_level() {
            return level;
        }
    }

    // At or past the last table entry: walk the extrapolated thresholds
    let mut level = max_tabulated_level();
    while xp_for_level(level + 1) <= xp && xp_for_level(level + 1) != i64::MAX {
        level += 1;
    }
    level
}

/// XP earned since the current level's threshold
pub fn xp_within_level(total_xp: i64) -> i64 {
    let xp = total_xp.max(0);
    xp - xp_for_level(level_for(xp))
}

/// Fraction of the way from the current level to the next (0.0 - 1.0).
///
/// Capped at 0.99 from the last tabulated level on.
pub fn progress_fraction(total_xp: i64) -> f64 {
    let level = level_for(total_xp);
    // Level 1 spans [0, table[1]) with no level-0 threshold to subtract
    let span = xp_for_level(level + 1) - xp_for_level(level);
    if span <= 0 {
        return 0.0;
    }

    let fraction = xp_within_level(total_xp) as f64 / span as f64;
    if level >= max_tabulated_level() {
        fraction.clamp(0.0, EXTRAPOLATED_PROGRESS_CAP)
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Number of levels crossed going from `old_total` to `new_total`
pub fn levels_gained(old_total: i64, new_total: i64) -> u32 {
    level_for(new_total).saturating_sub(level_for(old_total))
}

/// Display title for a level
pub fn level_title(level: u32) -> &'static str {
    match level {
        50.. => "Productivity Master",
        40..=49 => "Goal Crusher",
        35..=39 => "Habit Legend",
        30..=34 => "Task Virtuoso",
        25..=29 => "Elite Achiever",
        20..=24 => "Expert Planner",
        15..=19 => "Dedicated Builder",
        10..=14 => "Rising Star",
        5..=9 => "Procrastination Fighter",
        3..=4 => "Productivity Apprentice",
        2 => "Task Beginner",
        _ => "Newcomer",
    }
}

/// Level summary derived from a user's cumulative XP
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelProgress {
    pub total_xp: i64,
    pub level: u32,
    pub title: String,
    /// XP at which the current level started
    pub current_level_xp: i64,
    /// XP at which the next level starts
    pub next_level_xp: i64,
    pub xp_to_next_level: i64,
    /// 0.0 - 1.0 (at most 0.99 past the table)
    pub progress: f64,
}

impl LevelProgress {
    pub fn new(total_xp: i64) -> Self {
        let total_xp = total_xp.max(0);
        let level = level_for(total_xp);
        let next_level_xp = xp_for_level(level + 1);

        Self {
            total_xp,
            level,
            title: level_title(level).to_string(),
            current_level_xp: xp_for_level(level),
            next_level_xp,
            xp_to_next_level: (next_level_xp - total_xp).max(0),
            progress: progress_fraction(total_xp),
        }
    }

    /// Whether the level is past the tabulated range
    pub fn is_extrapolated(&self) -> bool {
        self.level > max_tabulated_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_xp() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(99), 1);
        assert_eq!(level_for(100), 2);
        assert_eq!(level_for(-50), 1);
        assert_eq!(level_for(1000), 11);
        assert_eq!(level_for(1199), 11);
        assert_eq!(level_for(4500), 25);
    }

    #[test]
    fn test_extrapolated_levels() {
        assert_eq!(xp_for_level(26), 6750);
        assert_eq!(xp_for_level(27), 10125);
        assert_eq!(xp_for_level(28), 15187);
        assert_eq!(level_for(6749), 25);
        assert_eq!(level_for(6750), 26);
        assert_eq!(level_for(15187), 28);
    }

    #[test]
    fn test_level_is_monotonic() {
        let mut previous = level_for(-10);
        for xp in (-10..20_000).step_by(7) {
            let level = level_for(xp);
            assert!(level >= previous, "level dropped at {xp} XP");
            previous = level;
        }
    }

    #[test]
    fn test_thresholds_bracket_total() {
        for xp in (0..50_000).step_by(13) {
            let level = level_for(xp);
            assert!(xp_for_level(level) <= xp);
            assert!(xp < xp_for_level(level + 1), "upper bound failed at {xp}");
        }
    }

    #[test]
    fn test_huge_totals_terminate() {
        let level = level_for(i64::MAX);
        assert!(level > max_tabulated_level());
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(progress_fraction(0), 0.0);
        // Level 1 spans 0..100 directly
        assert!((progress_fraction(50) - 0.5).abs() < 1e-9);
        // Level 11 spans 1000..1200
        assert!((progress_fraction(1100) - 0.5).abs() < 1e-9);
        assert_eq!(xp_within_level(1100), 100);
    }

    #[test]
    fn test_progress_capped_past_table() {
        // Level 25 spans 4500..6750, 6749 is 0.9996 of the way
        assert!((progress_fraction(6749) - 0.99).abs() < 1e-9);
        assert!(progress_fraction(6750) < 0.99 + 1e-9);
    }

    #[test]
    fn test_level_progress_summary() {
        let progress = LevelProgress::new(120);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.title, "Task Beginner");
        assert_eq!(progress.current_level_xp, 100);
        assert_eq!(progress.next_level_xp, 200);
        assert_eq!(progress.xp_to_next_level, 80);
        assert!((progress.progress - 0.2).abs() < 1e-9);
        assert!(!progress.is_extrapolated());
    }

    #[test]
    fn test_levels_gained() {
        assert_eq!(levels_gained(90, 120), 1);
        assert_eq!(levels_gained(0, 50), 0);
        assert_eq!(levels_gained(0, 1000), 10);
        assert_eq!(levels_gained(500, 100), 0);
    }

    #[test]
    fn test_level_titles() {
        assert_eq!(level_title(1), "Newcomer");
        assert_eq!(level_title(5), "Procrastination Fighter");
        assert_eq!(level_title(25), "Elite Achiever");
        assert_eq!(level_title(99), "Productivity Master");
    }
}
