use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{CRISIS_BUDGET, CRISIS_GRACE};

/// A crisis in progress: the question under time pressure and when it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCrisis {
    pub question_id: i64,
    pub started_at: DateTime<Utc>,
}

impl ActiveCrisis {
    pub fn new(question_id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            question_id,
            started_at,
        }
    }

    /// Nominal deadline shown to the learner.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + budget()
    }

    /// True once `now` is past the deadline plus the grace tolerance.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at > budget() + grace()
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline() - now).num_milliseconds().max(0)
    }
}

fn budget() -> Duration {
    Duration::milliseconds(CRISIS_BUDGET.as_millis() as i64)
}

fn grace() -> Duration {
    Duration::milliseconds(CRISIS_GRACE.as_millis() as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisPhase {
    Idle,
    Active,
    Win,
    LossTimeout,
    LossWrongAnswer,
}

impl CrisisPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrisisPhase::Idle => "idle",
            CrisisPhase::Active => "active",
            CrisisPhase::Win => "win",
            CrisisPhase::LossTimeout => "loss_timeout",
            CrisisPhase::LossWrongAnswer => "loss_wrong_answer",
        }
    }
}

/// Result of an authoritative deadline check.
#[derive(Debug, Clone, Serialize)]
pub struct CrisisStatus {
    pub phase: CrisisPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<i64>,
    pub lives: u32,
}
