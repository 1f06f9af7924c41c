use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::error::StoreError;

/// Where a bank row came from. Seeded rows form the curated batch that the
/// fresh-content bias steers away from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionOrigin {
    Seed,
    Generated,
    Fallback,
}

impl QuestionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionOrigin::Seed => "seed",
            QuestionOrigin::Generated => "generated",
            QuestionOrigin::Fallback => "fallback",
        }
    }
}

impl FromStr for QuestionOrigin {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "seed" => Ok(QuestionOrigin::Seed),
            "generated" => Ok(QuestionOrigin::Generated),
            "fallback" => Ok(QuestionOrigin::Fallback),
            _ => Err(format!("Invalid question origin: {}", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub label: String,
    pub text: String,
}

/// A stored bank question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: i64,
    pub category: String,
    pub concept: Option<String>,
    pub level: u32,
    pub prompt: String,
    pub options: Vec<AnswerOption>,
    pub correct: String,
    pub explanation: String,
    pub theory: Option<String>,
    pub example: Option<String>,
    pub tip: Option<String>,
    pub triad_id: Option<String>,
    /// 0 for standalone, 1..=3 inside a triad.
    pub triad_position: u32,
    pub origin: QuestionOrigin,
    pub created_at: DateTime<Utc>,
}

impl QuestionRecord {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.prompt)
    }

    /// Case-insensitive, whitespace-trimmed label comparison.
    pub fn is_correct(&self, chosen: &str) -> bool {
        normalize_label(chosen) == normalize_label(&self.correct)
    }

    /// Concept worth recording in the learner's glossary, if any.
    pub fn learnable_concept(&self) -> Option<&str> {
        self.concept
            .as_deref()
            .map(str::trim)
            .filter(|concept| concept.chars().count() > 2)
    }

    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            category: self.category.clone(),
            level: self.level,
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            triad_position: self.triad_position,
            origin: self.origin,
        }
    }
}

pub fn normalize_label(label: &str) -> String {
    label.trim().to_uppercase()
}

/// Durable "already solved" key: SHA-256 of the prompt text.
pub fn fingerprint(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}

/// Question as shown to the learner: no correct label, no explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: i64,
    pub category: String,
    pub level: u32,
    pub prompt: String,
    pub options: Vec<AnswerOption>,
    pub triad_position: u32,
    pub origin: QuestionOrigin,
}

/// A question about to enter the bank. Validated before any insert.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_labels"))]
pub struct NewQuestion {
    #[validate(length(min = 1, message = "Category must not be empty"))]
    pub category: String,
    pub concept: Option<String>,
    #[validate(range(min = 1, max = 4, message = "Level must be between 1 and 4"))]
    pub level: u32,
    #[validate(length(min = 1, message = "Prompt must not be empty"))]
    pub prompt: String,
    #[validate(length(min = 2, max = 4, message = "A question needs 2 to 4 options"))]
    pub options: Vec<AnswerOption>,
    #[validate(length(min = 1, message = "Correct label must not be empty"))]
    pub correct: String,
    #[serde(default)]
    pub explanation: String,
    pub theory: Option<String>,
    pub example: Option<String>,
    pub tip: Option<String>,
    pub triad_id: Option<String>,
    #[serde(default)]
    #[validate(range(max = 3, message = "Triad position must be between 0 and 3"))]
    pub triad_position: u32,
    pub origin: QuestionOrigin,
}

fn validate_labels(question: &NewQuestion) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for option in &question.options {
        let label = normalize_label(&option.label);
        if label.is_empty() || !seen.insert(label) {
            return Err(ValidationError::new("option_labels")
                .with_message("Option labels must be unique and non-empty".into()));
        }
    }

    if !seen.contains(&normalize_label(&question.correct)) {
        return Err(ValidationError::new("correct_label")
            .with_message("Correct label must be one of the option labels".into()));
    }

    Ok(())
}

impl NewQuestion {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.prompt)
    }

    /// Run ingestion validation, turning failures into a store rejection.
    pub fn checked(self) -> Result<Self, StoreError> {
        self.validate()
            .map_err(|e| StoreError::Invalid(format!("{}: {}", self.prompt_excerpt(), e)))?;
        Ok(self)
    }

    fn prompt_excerpt(&self) -> String {
        self.prompt.chars().take(40).collect()
    }
}

/// Question shape produced by content generators and the seed file, with
/// options keyed by label.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthoredQuestion {
    #[serde(alias = "question")]
    pub prompt: String,
    pub options: BTreeMap<String, String>,
    pub correct: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "concept_key")]
    pub concept: Option<String>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub theory: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub tip: Option<String>,
    #[serde(default)]
    pub triad_id: Option<String>,
    #[serde(default)]
    pub triad_position: Option<u32>,
}

impl AuthoredQuestion {
    pub fn into_new_question(
        self,
        default_level: u32,
        default_category: &str,
        origin: QuestionOrigin,
    ) -> NewQuestion {
        NewQuestion {
            category: self
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| default_category.to_string()),
            concept: self.concept,
            level: self.level.unwrap_or(default_level),
            prompt: self.prompt,
            options: self
                .options
                .into_iter()
                .map(|(label, text)| AnswerOption { label, text })
                .collect(),
            correct: self.correct,
            explanation: self.explanation,
            theory: self.theory,
            example: self.example,
            tip: self.tip,
            triad_id: self.triad_id,
            triad_position: self.triad_position.unwrap_or(0),
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyVote {
    Hard,
    Easy,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote: DifficultyVote,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub question_id: i64,
    pub hard_votes: u32,
    pub easy_votes: u32,
    pub level: u32,
}
