//! Progression engine: validates an answer and applies its consequences.

use rusqlite::Connection;
use std::sync::Arc;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::metrics::ANSWERS_TOTAL;
use crate::models::answer::{AnswerResult, Outcome, ProgressEvent, SubmitAnswerRequest};
use crate::models::crisis::CrisisPhase;
use crate::models::profile::UserProfile;
use crate::models::progress::{BadgeView, GlossaryEntry, LearnerStats};
use crate::models::question::QuestionRecord;
use crate::rules::{MAX_LIVES, STREAK_FOR_LIFE, XP_PER_WIN};
use crate::store::{profiles, progress, questions, LocalStore};
use crate::utils::clock::Clock;

use super::badges::{self, BadgeInputs};
use super::crisis;
use super::replication::{MirrorJob, ReplicationWorker};

pub struct AnswerService {
    store: LocalStore,
    replication: ReplicationWorker,
    clock: Arc<dyn Clock>,
}

impl AnswerService {
    pub fn new(store: LocalStore, replication: ReplicationWorker, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            replication,
            clock,
        }
    }

    /// Score one answer. Everything it changes is committed in a single
    /// transaction; mirror tasks are issued after the commit.
    pub async fn validate(
        &self,
        identity: &str,
        req: &SubmitAnswerRequest,
    ) -> EngineResult<AnswerResult> {
        let now = self.clock.now();
        let owner = identity.to_string();
        let question_id = req.question_id;
        let answer = req.answer.clone();

        let (result, jobs) = self
            .store
            .write(
                "validate_answer",
                move |tx| -> EngineResult<(AnswerResult, Vec<MirrorJob>)> {
                    let mut profile = profiles::load(tx, &owner)?
                        .ok_or_else(|| EngineError::ProfileNotFound(owner.clone()))?;
                    if profile.is_locked_out() {
                        return Err(EngineError::OutOfLives);
                    }
                    let question = questions::get(tx, question_id)?
                        .ok_or(EngineError::QuestionNotFound(question_id))?;

                    let badges_before = earned_badges(tx, &profile)?;
                    let mut scoring = Scoring::new(&owner);

                    match crisis::check(&profile, now) {
                        CrisisPhase::LossTimeout => {
                            // Past the deadline the answer no longer counts.
                            scoring.crisis = Some(CrisisPhase::LossTimeout);
                            scoring.outcome = Outcome::Loss;
                            scoring
                                .events
                                .extend(crisis::resolve(&mut profile, CrisisPhase::LossTimeout));
                        }
                        CrisisPhase::Active
                            if profile.crisis.map(|c| c.question_id) != Some(question.id) =>
                        {
                            return Err(EngineError::InvalidInput(
                                "a crisis question is awaiting an answer".to_string(),
                            ));
                        }
                        phase => {
                            let in_crisis = phase == CrisisPhase::Active;
                            if question.is_correct(&answer) {
                                apply_win(tx, &mut profile, &question, &mut scoring)?;
                                if in_crisis {
                                    scoring.crisis = Some(CrisisPhase::Win);
                                    scoring
                                        .events
                                        .extend(crisis::resolve(&mut profile, CrisisPhase::Win));
                                }
                            } else if in_crisis {
                                apply_crisis_loss(tx, &mut profile, &question, &mut scoring, now)?;
                            } else {
                                apply_loss(tx, &mut profile, &question, &mut scoring, now)?;
                            }
                        }
                    }

                    let badges_after = earned_badges(tx, &profile)?;
                    scoring.events.extend(
                        badges::newly_earned(&badges_before, &badges_after)
                            .into_iter()
                            .map(|badge| ProgressEvent::BadgeEarned {
                                code: badge.code.to_string(),
                                title: badge.title.to_string(),
                            }),
                    );

                    profiles::save(tx, &profile)?;

                    let result = AnswerResult {
                        outcome: scoring.outcome,
                        correct_label: question.correct.clone(),
                        explanation: question.explanation.clone(),
                        crisis: scoring.crisis,
                        events: scoring.events,
                        profile,
                    };
                    Ok((result, scoring.jobs))
                },
            )
            .await?;

        ANSWERS_TOTAL
            .with_label_values(&[result.outcome.as_str()])
            .inc();
        info!(
            identity,
            question_id = req.question_id,
            outcome = result.outcome.as_str(),
            lives = result.profile.lives,
            level = result.profile.level,
            "Answer validated"
        );

        self.replication.mirror_all(jobs);
        Ok(result)
    }

    pub async fn profile(&self, identity: &str) -> EngineResult<UserProfile> {
        let owner = identity.to_string();
        self.store
            .read("load_profile", move |conn| profiles::load(conn, &owner))
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(identity.to_string()))
    }

    /// Competency radar data and earned badges.
    pub async fn stats(&self, identity: &str) -> EngineResult<LearnerStats> {
        let identity = identity.to_string();
        self.store
            .read("learner_stats", move |conn| -> EngineResult<LearnerStats> {
                let profile = profiles::load(conn, &identity)?
                    .ok_or_else(|| EngineError::ProfileNotFound(identity.clone()))?;
                let categories = progress::category_stats(conn, &identity)?;
                let glossary_terms = progress::glossary_count(conn, &identity)?;
                let badges = badges::earned(&BadgeInputs {
                    profile: &profile,
                    categories: &categories,
                    glossary_terms,
                });
                Ok(LearnerStats {
                    solved: progress::solved_count(conn, &identity)?,
                    categories,
                    glossary_terms,
                    badges,
                })
            })
            .await
    }

    pub async fn glossary(&self, identity: &str) -> EngineResult<Vec<GlossaryEntry>> {
        self.profile(identity).await?;
        let owner = identity.to_string();
        Ok(self
            .store
            .read("learner_glossary", move |conn| progress::glossary(conn, &owner))
            .await?)
    }
}

/// Accumulates what one answer produced.
struct Scoring {
    outcome: Outcome,
    crisis: Option<CrisisPhase>,
    events: Vec<ProgressEvent>,
    jobs: Vec<MirrorJob>,
}

impl Scoring {
    fn new(identity: &str) -> Self {
        Self {
            outcome: Outcome::Loss,
            crisis: None,
            events: Vec::new(),
            jobs: vec![MirrorJob::profile(identity)],
        }
    }
}

fn apply_win(
    conn: &Connection,
    profile: &mut UserProfile,
    question: &QuestionRecord,
    scoring: &mut Scoring,
) -> EngineResult<()> {
    let identity = profile.identity.clone();
    scoring.outcome = Outcome::Win;

    let fingerprint = question.fingerprint();
    progress::insert_solved(conn, &identity, &fingerprint)?;
    scoring.jobs.push(MirrorJob::Solved {
        identity: identity.clone(),
        fingerprint,
    });

    progress::increment_category(conn, &identity, &question.category)?;
    scoring.jobs.push(MirrorJob::CategoryStat {
        identity: identity.clone(),
        category: question.category.clone(),
    });

    if let Some(term) = question.learnable_concept() {
        let entry = GlossaryEntry {
            term: term.to_string(),
            definition: question.explanation.clone(),
            category: question.category.clone(),
        };
        if progress::insert_glossary(conn, &identity, &entry)? {
            scoring.events.push(ProgressEvent::GlossaryTermAdded {
                term: entry.term.clone(),
            });
            scoring.jobs.push(MirrorJob::Glossary {
                identity: identity.clone(),
                term: entry.term,
            });
        }
    }

    let level_before = profile.level;
    let had_diploma = profile.has_diploma;
    profile.xp += XP_PER_WIN;
    profile.total_score += XP_PER_WIN;
    profile.questions_answered += 1;
    profile.streak += 1;
    profile.recompute_progress();

    if profile.level > level_before {
        scoring.events.push(ProgressEvent::LevelUp {
            from: level_before,
            to: profile.level,
        });
    }
    if profile.has_diploma && !had_diploma {
        scoring.events.push(ProgressEvent::DiplomaEarned);
    }

    if profile.streak >= STREAK_FOR_LIFE {
        profile.streak = 0;
        if profile.lives < MAX_LIVES {
            profile.lives += 1;
            scoring.events.push(ProgressEvent::LifeRestored {
                lives: profile.lives,
            });
        }
    }
    Ok(())
}

fn apply_loss(
    conn: &Connection,
    profile: &mut UserProfile,
    question: &QuestionRecord,
    scoring: &mut Scoring,
    now: chrono::DateTime<chrono::Utc>,
) -> EngineResult<()> {
    scoring.outcome = Outcome::Loss;
    profile.lives = profile.lives.saturating_sub(1);
    profile.streak = 0;
    progress::insert_failure(conn, &profile.identity, question.id, now)?;
    Ok(())
}

fn apply_crisis_loss(
    conn: &Connection,
    profile: &mut UserProfile,
    question: &QuestionRecord,
    scoring: &mut Scoring,
    now: chrono::DateTime<chrono::Utc>,
) -> EngineResult<()> {
    scoring.outcome = Outcome::Loss;
    scoring.crisis = Some(CrisisPhase::LossWrongAnswer);
    profile.streak = 0;
    progress::insert_failure(conn, &profile.identity, question.id, now)?;
    scoring
        .events
        .extend(crisis::resolve(profile, CrisisPhase::LossWrongAnswer));
    Ok(())
}

fn earned_badges(conn: &Connection, profile: &UserProfile) -> EngineResult<Vec<BadgeView>> {
    let categories = progress::category_stats(conn, &profile.identity)?;
    let glossary_terms = progress::glossary_count(conn, &profile.identity)?;
    Ok(badges::earned(&BadgeInputs {
        profile,
        categories: &categories,
        glossary_terms,
    }))
}
