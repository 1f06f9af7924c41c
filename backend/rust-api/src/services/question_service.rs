//! Next-question delivery: crisis re-serve, bank selection, fallback chain
//! and crisis entry.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::metrics::QUESTIONS_SERVED_TOTAL;
use crate::models::answer::{NextQuestionResponse, QuestionSource};
use crate::models::crisis::{CrisisPhase, CrisisStatus};
use crate::models::profile::UserProfile;
use crate::models::question::{
    DifficultyVote, NewQuestion, QuestionOrigin, QuestionRecord, VoteResponse,
};
use crate::rules::{module_for, question_level_for, HARD_VOTES_TO_ESCALATE};
use crate::store::{profiles, questions, LocalStore};
use crate::utils::clock::Clock;

use super::content_service::{parse_generated, static_fallback, ContentProvider, GenerationRequest};
use super::crisis::{self, CrisisService};
use super::refill::BankRefiller;
use super::selector::QuestionSelector;
use super::AppState;

pub struct QuestionService {
    store: LocalStore,
    selector: QuestionSelector,
    content: Arc<dyn ContentProvider>,
    refiller: BankRefiller,
    crisis: CrisisService,
    clock: Arc<dyn Clock>,
    crisis_probability: f64,
}

impl QuestionService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            selector: QuestionSelector::new(state.store.clone(), state.config.selector.fresh_bias),
            content: state.content.clone(),
            refiller: state.refiller.clone(),
            crisis: CrisisService::new(
                state.store.clone(),
                state.replication.clone(),
                state.clock.clone(),
            ),
            clock: state.clock.clone(),
            crisis_probability: state.config.crisis.probability,
        }
    }

    pub async fn next_question(&self, identity: &str) -> EngineResult<NextQuestionResponse> {
        let now = self.clock.now();
        let mut profile = self.load(identity).await?;
        let mut resolved: Option<CrisisStatus> = None;

        match crisis::check(&profile, now) {
            CrisisPhase::Active => {
                if let Some(response) = self.reserve_crisis(&profile, now).await? {
                    return Ok(response);
                }
            }
            CrisisPhase::LossTimeout => {
                resolved = Some(self.crisis.expire_if_due(identity).await?);
                profile = self.load(identity).await?;
            }
            _ => {}
        }

        if profile.is_locked_out() {
            return Err(EngineError::OutOfLives);
        }

        let mut rng = StdRng::from_rng(&mut rand::rng());
        let picked = self
            .selector
            .select(&profile.context(), now, &mut rng)
            .await?;
        let (question, source) = match picked {
            Some(question) => (question, QuestionSource::Bank),
            None => self.fallback(&profile, now).await?,
        };

        QUESTIONS_SERVED_TOTAL
            .with_label_values(&[source.as_str()])
            .inc();
        self.refiller.maybe_refill(profile.questions_answered).await;

        let roll = rand::random::<f64>();
        let crisis_status = if crisis::should_trigger(&profile, roll, self.crisis_probability) {
            self.enter_crisis(identity, question.id, now).await?
        } else {
            resolved
        };

        debug!(identity, question_id = question.id, source = source.as_str(), "Serving question");
        Ok(NextQuestionResponse {
            question: question.view(),
            source,
            crisis: crisis_status,
        })
    }

    /// The open crisis question, served again until the crisis resolves.
    async fn reserve_crisis(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<NextQuestionResponse>> {
        let Some(active) = profile.crisis else {
            return Ok(None);
        };
        let question = self
            .store
            .read("get_question", move |conn| questions::get(conn, active.question_id))
            .await?;

        match question {
            Some(question) => {
                QUESTIONS_SERVED_TOTAL
                    .with_label_values(&[QuestionSource::CrisisInProgress.as_str()])
                    .inc();
                Ok(Some(NextQuestionResponse {
                    question: question.view(),
                    source: QuestionSource::CrisisInProgress,
                    crisis: Some(crisis::status(profile, CrisisPhase::Active, now)),
                }))
            }
            None => {
                // The crisis question was evicted; abandon the crisis without penalty.
                warn!(identity = %profile.identity, question_id = active.question_id, "Crisis question vanished");
                let identity = profile.identity.clone();
                self.store
                    .write("crisis_abandon", move |tx| -> EngineResult<()> {
                        if let Some(mut current) = profiles::load(tx, &identity)? {
                            current.crisis = None;
                            profiles::save(tx, &current)?;
                        }
                        Ok(())
                    })
                    .await?;
                Ok(None)
            }
        }
    }

    async fn enter_crisis(
        &self,
        identity: &str,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<CrisisStatus>> {
        let identity = identity.to_string();
        self.store
            .write("crisis_start", move |tx| -> EngineResult<Option<CrisisStatus>> {
                let mut profile = profiles::load(tx, &identity)?
                    .ok_or_else(|| EngineError::ProfileNotFound(identity.clone()))?;
                if profile.crisis.is_some() {
                    return Ok(None);
                }
                crisis::begin(&mut profile, question_id, now);
                profiles::save(tx, &profile)?;
                Ok(Some(crisis::status(&profile, CrisisPhase::Active, now)))
            })
            .await
    }

    /// Bank came up empty: ask the generator, then fall back to a static
    /// question. Whatever is served is banked first.
    async fn fallback(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> EngineResult<(QuestionRecord, QuestionSource)> {
        let level = question_level_for(profile.level);
        let topic = module_for(profile.questions_answered);
        let request = GenerationRequest::single(topic, level);

        let generated = match self.content.generate(&request).await {
            Ok(raw) => parse_generated(&raw, &request, QuestionOrigin::Generated)
                .into_iter()
                .next(),
            Err(e) => {
                warn!(identity = %profile.identity, level, topic, "Content generation failed: {:#}", e);
                None
            }
        };

        if let Some(question) = generated {
            match self.bank(question, now).await {
                Ok(record) => {
                    info!(identity = %profile.identity, level, topic, "Served generated question");
                    return Ok((record, QuestionSource::Generated));
                }
                Err(e) => warn!(level, "Generated question rejected: {}", e),
            }
        }

        warn!(identity = %profile.identity, level, "Falling back to static question");
        let record = self.bank(static_fallback(level), now).await?;
        Ok((record, QuestionSource::Static))
    }

    async fn bank(&self, question: NewQuestion, now: DateTime<Utc>) -> EngineResult<QuestionRecord> {
        self.store
            .write("bank_question", move |tx| -> EngineResult<QuestionRecord> {
                let id = questions::insert(tx, question, now)?;
                questions::get(tx, id)?.ok_or(EngineError::QuestionNotFound(id))
            })
            .await
    }

    /// Count a difficulty vote. Enough "hard" votes raise the question level.
    pub async fn vote(&self, question_id: i64, vote: DifficultyVote) -> EngineResult<VoteResponse> {
        let (hard_votes, easy_votes, level) = self
            .store
            .write("record_vote", move |tx| -> EngineResult<(u32, u32, u32)> {
                if questions::get(tx, question_id)?.is_none() {
                    return Err(EngineError::QuestionNotFound(question_id));
                }
                Ok(questions::record_vote(
                    tx,
                    question_id,
                    vote,
                    HARD_VOTES_TO_ESCALATE,
                )?)
            })
            .await?;
        info!(
            question_id,
            vote = ?vote,
            hard = hard_votes,
            level,
            "Difficulty vote recorded"
        );
        Ok(VoteResponse {
            question_id,
            hard_votes,
            easy_votes,
            level,
        })
    }

    async fn load(&self, identity: &str) -> EngineResult<UserProfile> {
        let owner = identity.to_string();
        self.store
            .read("load_profile", move |conn| profiles::load(conn, &owner))
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(identity.to_string()))
    }
}
