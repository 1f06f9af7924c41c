use serde::{Deserialize, Serialize};

use super::crisis::{CrisisPhase, CrisisStatus};
use super::profile::UserProfile;
use super::question::{AnswerOption, QuestionView};

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
        }
    }
}

/// Milestones raised while scoring an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    LevelUp { from: u32, to: u32 },
    LifeRestored { lives: u32 },
    BadgeEarned { code: String, title: String },
    GlossaryTermAdded { term: String },
    CrisisWon { first: bool },
    CrisisFailed { phase: CrisisPhase },
    DiplomaEarned,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub outcome: Outcome,
    pub correct_label: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crisis: Option<CrisisPhase>,
    pub events: Vec<ProgressEvent>,
    pub profile: UserProfile,
}

/// Response to a next-question request.
#[derive(Debug, Clone, Serialize)]
pub struct NextQuestionResponse {
    pub question: QuestionView,
    pub source: QuestionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crisis: Option<CrisisStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    Bank,
    CrisisInProgress,
    Generated,
    Static,
}

impl QuestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionSource::Bank => "bank",
            QuestionSource::CrisisInProgress => "crisis",
            QuestionSource::Generated => "generated",
            QuestionSource::Static => "static",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JokerKind {
    FiftyFifty,
    Hint,
}

impl JokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JokerKind::FiftyFifty => "fifty_fifty",
            JokerKind::Hint => "hint",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JokerRequest {
    pub question_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JokerEffect {
    FiftyFifty { remaining_options: Vec<AnswerOption> },
    Hint { text: String },
}

#[derive(Debug, Serialize)]
pub struct JokerResponse {
    pub effect: JokerEffect,
    pub remaining: u32,
}
