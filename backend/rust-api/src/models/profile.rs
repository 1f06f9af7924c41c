use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::crisis::ActiveCrisis;
use crate::rules::{self, STARTING_JOKERS, STARTING_LIVES};

/// Learner profile as held by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub identity: String,
    pub name: String,
    pub email: String,
    pub level: u32,
    pub xp: u32,
    pub total_score: u32,
    pub mastery: u32,
    pub lives: u32,
    pub questions_answered: u32,
    pub streak: u32,
    pub crisis_wins: u32,
    pub redemptions: u32,
    pub joker_fifty: u32,
    pub joker_hint: u32,
    pub has_diploma: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crisis: Option<ActiveCrisis>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(identity: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            name: name.into(),
            email: email.into(),
            level: 1,
            xp: 0,
            total_score: 0,
            mastery: 0,
            lives: STARTING_LIVES,
            questions_answered: 0,
            streak: 0,
            crisis_wins: 0,
            redemptions: 0,
            joker_fifty: STARTING_JOKERS,
            joker_hint: STARTING_JOKERS,
            has_diploma: false,
            crisis: None,
            last_seen: None,
        }
    }

    pub fn context(&self) -> LearnerContext {
        LearnerContext {
            identity: self.identity.clone(),
            level: self.level,
            lives: self.lives,
            streak: self.streak,
            questions_answered: self.questions_answered,
        }
    }

    /// Lives at zero lock the learner out until remediation.
    pub fn is_locked_out(&self) -> bool {
        self.lives == 0
    }

    /// Recompute level and mastery from the answered counter.
    pub fn recompute_progress(&mut self) {
        self.level = rules::level_for(self.questions_answered);
        self.mastery = rules::mastery_for(self.questions_answered);
        if rules::diploma_earned(self.questions_answered) {
            self.has_diploma = true;
        }
    }
}

/// Explicit per-call context handed to the selector and the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnerContext {
    pub identity: String,
    pub level: u32,
    pub lives: u32,
    pub streak: u32,
    pub questions_answered: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub profile: UserProfile,
    /// Whether the remote mirror supplied state during this resumption.
    pub restored_from_mirror: bool,
}
