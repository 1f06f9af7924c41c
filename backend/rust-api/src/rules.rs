//! Game rules: level step function, scoring constants and crisis timings.

use std::time::Duration;

/// Ascending (level, questions answered) thresholds.
pub const LEVEL_THRESHOLDS: [(u32, u32); 5] = [(1, 0), (2, 120), (3, 250), (4, 380), (5, 500)];

/// Upper bound used when a level has no successor band.
const FINAL_THRESHOLD: u32 = 500;

pub const XP_PER_WIN: u32 = 20;
pub const MAX_LIVES: u32 = 5;
pub const STARTING_LIVES: u32 = 3;
pub const STARTING_JOKERS: u32 = 3;
pub const STREAK_FOR_LIFE: u32 = 5;

/// Highest level that has authored questions.
pub const MAX_QUESTION_LEVEL: u32 = 4;

pub const CRISIS_MIN_LEVEL: u32 = 3;
pub const CRISIS_MIN_LIVES: u32 = 3;
pub const CRISIS_PENALTY: u32 = 2;
pub const CRISIS_BUDGET: Duration = Duration::from_secs(30);
pub const CRISIS_GRACE: Duration = Duration::from_millis(100);
/// Level-3 learners past this count with no crisis win get a forced crisis.
pub const FORCED_CRISIS_AFTER: u32 = 370;

pub const FAILURE_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

pub const RESTOCK_COST_XP: u32 = 100;
pub const RESTOCK_LIVES: u32 = 3;
pub const GRACE_LIVES: u32 = 1;

pub const HARD_VOTES_TO_ESCALATE: u32 = 5;

/// Curriculum modules per level with their question budget.
pub const CURRICULUM: [(u32, [(&str, u32); 3]); 4] = [
    (1, [("Fundamentals", 40), ("Logistics", 40), ("Purchasing", 40)]),
    (2, [("Planning", 40), ("Inventory", 40), ("Transport", 50)]),
    (3, [("Digitalisation", 40), ("Connected Flows", 40), ("AI & Data", 50)]),
    (4, [("Lean Strategy", 40), ("Operational Excellence", 40), ("Management", 40)]),
];

/// Highest level whose threshold does not exceed `questions_answered`.
pub fn level_for(questions_answered: u32) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .rev()
        .find(|(_, threshold)| questions_answered >= *threshold)
        .map(|(level, _)| *level)
        .unwrap_or(1)
}

fn threshold_of(level: u32) -> Option<u32> {
    LEVEL_THRESHOLDS
        .iter()
        .find(|(l, _)| *l == level)
        .map(|(_, threshold)| *threshold)
}

/// Position of `questions_answered` inside the current level band, in percent.
pub fn mastery_for(questions_answered: u32) -> u32 {
    let level = level_for(questions_answered);
    let start = threshold_of(level).unwrap_or(0);
    let end = threshold_of(level + 1).unwrap_or(FINAL_THRESHOLD);

    if end <= start {
        return 100;
    }

    let done = questions_answered.saturating_sub(start) as u64;
    let pct = done * 100 / (end - start) as u64;
    pct.min(100) as u32
}

/// Bank level served to a learner of the given level.
pub fn question_level_for(level: u32) -> u32 {
    level.clamp(1, MAX_QUESTION_LEVEL)
}

/// Curriculum module for the learner's progress inside their level.
pub fn module_for(questions_answered: u32) -> &'static str {
    let level = question_level_for(level_for(questions_answered));
    let start = threshold_of(level).unwrap_or(0);
    let local = questions_answered.saturating_sub(start).max(1);

    let modules = CURRICULUM
        .iter()
        .find(|(l, _)| *l == level)
        .map(|(_, modules)| modules)
        .unwrap_or(&CURRICULUM[0].1);

    let mut cumulative = 0;
    for (name, count) in modules.iter() {
        if local <= cumulative + count {
            return name;
        }
        cumulative += count;
    }
    modules[modules.len() - 1].0
}

pub fn diploma_earned(questions_answered: u32) -> bool {
    questions_answered >= FINAL_THRESHOLD
}
