//! Jokers and remediation: the ways a learner buys help or lives back.

use rand::seq::IndexedRandom;
use std::sync::Arc;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::models::answer::{JokerEffect, JokerKind, JokerResponse};
use crate::models::profile::UserProfile;
use crate::models::question::{normalize_label, AnswerOption, QuestionRecord};
use crate::rules::{GRACE_LIVES, RESTOCK_COST_XP, RESTOCK_LIVES};
use crate::store::{profiles, questions, LocalStore};
use crate::utils::clock::Clock;

use super::replication::{MirrorJob, ReplicationWorker};

pub struct LifelineService {
    store: LocalStore,
    replication: ReplicationWorker,
    clock: Arc<dyn Clock>,
}

impl LifelineService {
    pub fn new(store: LocalStore, replication: ReplicationWorker, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            replication,
            clock,
        }
    }

    /// Spend one joker on `question_id`.
    pub async fn use_joker(
        &self,
        identity: &str,
        kind: JokerKind,
        question_id: i64,
    ) -> EngineResult<JokerResponse> {
        let owner = identity.to_string();
        let response = self
            .store
            .write("use_joker", move |tx| -> EngineResult<JokerResponse> {
                let mut profile = load(tx, &owner)?;
                let question = questions::get(tx, question_id)?
                    .ok_or(EngineError::QuestionNotFound(question_id))?;

                let counter = match kind {
                    JokerKind::FiftyFifty => &mut profile.joker_fifty,
                    JokerKind::Hint => &mut profile.joker_hint,
                };
                if *counter == 0 {
                    return Err(EngineError::JokerUnavailable(kind.as_str()));
                }
                *counter -= 1;
                let remaining = *counter;

                let effect = match kind {
                    JokerKind::FiftyFifty => JokerEffect::FiftyFifty {
                        remaining_options: fifty_fifty(&question),
                    },
                    JokerKind::Hint => JokerEffect::Hint {
                        text: hint_text(&question),
                    },
                };
                profiles::save(tx, &profile)?;
                Ok(JokerResponse { effect, remaining })
            })
            .await?;

        info!(identity, question_id, joker = kind.as_str(), remaining = response.remaining, "Joker used");
        self.replication.mirror(MirrorJob::profile(identity));
        Ok(response)
    }

    /// One life back for a learner who ran out. Counts as a redemption.
    pub async fn grant_grace(&self, identity: &str) -> EngineResult<UserProfile> {
        self.remediate(identity, "grant_grace", |profile| {
            profile.lives = GRACE_LIVES;
            profile.redemptions += 1;
            Ok(())
        })
        .await
    }

    /// Trade experience for a fresh set of lives.
    pub async fn restock(&self, identity: &str) -> EngineResult<UserProfile> {
        self.remediate(identity, "restock", |profile| {
            if profile.xp < RESTOCK_COST_XP {
                return Err(EngineError::InsufficientXp {
                    needed: RESTOCK_COST_XP,
                });
            }
            profile.xp -= RESTOCK_COST_XP;
            profile.lives = RESTOCK_LIVES;
            Ok(())
        })
        .await
    }

    async fn remediate(
        &self,
        identity: &str,
        operation: &'static str,
        apply: impl FnOnce(&mut UserProfile) -> EngineResult<()> + Send + 'static,
    ) -> EngineResult<UserProfile> {
        let now = self.clock.now();
        let owner = identity.to_string();
        let profile = self
            .store
            .write(operation, move |tx| -> EngineResult<UserProfile> {
                let mut profile = load(tx, &owner)?;
                if !profile.is_locked_out() {
                    return Err(EngineError::InvalidInput(
                        "remediation is only available with no lives left".to_string(),
                    ));
                }
                apply(&mut profile)?;
                profile.last_seen = Some(now);
                profiles::save(tx, &profile)?;
                Ok(profile)
            })
            .await?;

        info!(identity, operation, lives = profile.lives, xp = profile.xp, "Lives restored");
        self.replication.mirror(MirrorJob::profile(identity));
        Ok(profile)
    }
}

fn load(conn: &rusqlite::Connection, identity: &str) -> EngineResult<UserProfile> {
    profiles::load(conn, identity)?.ok_or_else(|| EngineError::ProfileNotFound(identity.to_string()))
}

/// The correct option plus one random wrong one, in original order.
fn fifty_fifty(question: &QuestionRecord) -> Vec<AnswerOption> {
    let correct = normalize_label(&question.correct);
    let wrong: Vec<&AnswerOption> = question
        .options
        .iter()
        .filter(|option| normalize_label(&option.label) != correct)
        .collect();
    let kept_wrong = wrong.choose(&mut rand::rng()).map(|option| option.label.clone());

    question
        .options
        .iter()
        .filter(|option| {
            normalize_label(&option.label) == correct || Some(&option.label) == kept_wrong.as_ref()
        })
        .cloned()
        .collect()
}

fn hint_text(question: &QuestionRecord) -> String {
    [&question.tip, &question.theory]
        .into_iter()
        .flatten()
        .find(|text| !text.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| {
            if question.explanation.trim().is_empty() {
                format!("Think about the {} fundamentals.", question.category)
            } else {
                question.explanation.clone()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionOrigin;
    use chrono::Utc;

    fn question(options: &[&str], correct: &str) -> QuestionRecord {
        QuestionRecord {
            id: 1,
            category: "Inventory".to_string(),
            concept: None,
            level: 2,
            prompt: "Which policy?".to_string(),
            options: options
                .iter()
                .map(|label| AnswerOption {
                    label: label.to_string(),
                    text: format!("option {}", label),
                })
                .collect(),
            correct: correct.to_string(),
            explanation: "Because of safety stock.".to_string(),
            theory: None,
            example: None,
            tip: None,
            triad_id: None,
            triad_position: 0,
            origin: QuestionOrigin::Seed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fifty_fifty_keeps_correct_and_one_wrong() {
        let q = question(&["A", "B", "C", "D"], "C");
        let kept = fifty_fifty(&q);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|o| o.label == "C"));
    }

    #[test]
    fn fifty_fifty_on_two_options_keeps_both() {
        let q = question(&["A", "B"], "a");
        assert_eq!(fifty_fifty(&q).len(), 2);
    }

    #[test]
    fn hint_prefers_tip_then_explanation() {
        let mut q = question(&["A", "B"], "A");
        assert_eq!(hint_text(&q), "Because of safety stock.");
        q.tip = Some("Look at the reorder point.".to_string());
        assert_eq!(hint_text(&q), "Look at the reorder point.");
    }
}
