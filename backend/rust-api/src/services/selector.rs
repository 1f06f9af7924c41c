use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::error::StoreResult;
use crate::models::profile::LearnerContext;
use crate::models::question::QuestionRecord;
use crate::rules::question_level_for;
use crate::store::questions::{self, SampleFilter};
use crate::store::LocalStore;

/// Eligible rows kept per attempt.
pub const SAMPLE_SIZE: u32 = 20;

/// Triad positions in the order they are offered: know, understand, apply,
/// then anything left.
const TRIAD_ORDER: [Option<u32>; 4] = [Some(1), Some(2), Some(3), None];

/// Random windows tried for the any-position attempt before giving up.
const OPEN_ATTEMPTS: usize = 3;

pub struct QuestionSelector {
    store: LocalStore,
    fresh_bias: f64,
}

impl QuestionSelector {
    pub fn new(store: LocalStore, fresh_bias: f64) -> Self {
        Self {
            store,
            fresh_bias: fresh_bias.clamp(0.0, 1.0),
        }
    }

    /// Pick an eligible question at the learner's level, or `None` when the
    /// bank has nothing left for them.
    pub async fn select<R: Rng>(
        &self,
        ctx: &LearnerContext,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> StoreResult<Option<QuestionRecord>> {
        let level = question_level_for(ctx.level);
        let prefer_fresh = rng.random::<f64>() < self.fresh_bias;

        if prefer_fresh {
            if let Some(question) = self.scan(ctx, level, true, now, rng).await? {
                return Ok(Some(question));
            }
            debug!(identity = %ctx.identity, level, "No fresh candidates, retrying without bias");
        }
        self.scan(ctx, level, false, now, rng).await
    }

    async fn scan<R: Rng>(
        &self,
        ctx: &LearnerContext,
        level: u32,
        exclude_seed: bool,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> StoreResult<Option<QuestionRecord>> {
        let attempts: Vec<(Option<u32>, f64)> = TRIAD_ORDER
            .iter()
            .flat_map(|&position| {
                let tries = if position.is_none() { OPEN_ATTEMPTS } else { 1 };
                std::iter::repeat(position).take(tries)
            })
            .map(|position| (position, rng.random::<f64>()))
            .collect();
        let identity = ctx.identity.clone();

        let mut candidates = self
            .store
            .read("select_question", move |conn| -> StoreResult<Vec<QuestionRecord>> {
                let Some((lo, hi)) = questions::id_bounds(conn, level)? else {
                    return Ok(Vec::new());
                };

                for (triad_position, offset) in attempts {
                    let filter = SampleFilter {
                        identity: &identity,
                        level,
                        triad_position,
                        exclude_seed,
                        now,
                        limit: SAMPLE_SIZE,
                    };
                    let span = (hi - lo + 1) as f64;
                    let start = lo + (offset * span) as i64;
                    let candidates = questions::sample(conn, &filter, start.min(hi))?;
                    if !candidates.is_empty() {
                        return Ok(candidates);
                    }
                }
                Ok(Vec::new())
            })
            .await?;

        candidates.shuffle(rng);
        Ok(candidates.into_iter().next())
    }
}
