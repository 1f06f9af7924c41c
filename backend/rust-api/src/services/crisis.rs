//! Crisis mode: a timed sub-mode of the progression engine.
//!
//! `Idle -> Active -> {Win, LossTimeout, LossWrongAnswer}`. The deadline is
//! always judged here against the stored start time, never by the client.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::error::{EngineError, EngineResult, StoreResult};
use crate::metrics::{CRISIS_ACTIVE, CRISIS_TRANSITIONS_TOTAL};
use crate::models::answer::ProgressEvent;
use crate::models::crisis::{ActiveCrisis, CrisisPhase, CrisisStatus};
use crate::models::profile::UserProfile;
use crate::rules::{
    CRISIS_MIN_LEVEL, CRISIS_MIN_LIVES, CRISIS_PENALTY, FORCED_CRISIS_AFTER, MAX_LIVES,
};
use crate::services::replication::{MirrorJob, ReplicationWorker};
use crate::store::{profiles, LocalStore};
use crate::utils::clock::Clock;

/// Whether a crisis should open on the question about to be served.
/// `roll` is a uniform sample in [0, 1).
pub fn should_trigger(profile: &UserProfile, roll: f64, probability: f64) -> bool {
    if profile.crisis.is_some()
        || profile.level < CRISIS_MIN_LEVEL
        || profile.lives < CRISIS_MIN_LIVES
    {
        return false;
    }
    is_forced(profile) || roll < probability
}

/// A learner deep into level 3 who never won a crisis gets one.
fn is_forced(profile: &UserProfile) -> bool {
    profile.level == CRISIS_MIN_LEVEL
        && profile.questions_answered > FORCED_CRISIS_AFTER
        && profile.crisis_wins == 0
}

/// Authoritative deadline check. Only reports; does not mutate.
pub fn check(profile: &UserProfile, now: DateTime<Utc>) -> CrisisPhase {
    match profile.crisis {
        None => CrisisPhase::Idle,
        Some(crisis) if crisis.is_expired(now) => CrisisPhase::LossTimeout,
        Some(_) => CrisisPhase::Active,
    }
}

pub fn begin(profile: &mut UserProfile, question_id: i64, now: DateTime<Utc>) -> ActiveCrisis {
    let crisis = ActiveCrisis::new(question_id, now);
    profile.crisis = Some(crisis);
    CRISIS_TRANSITIONS_TOTAL
        .with_label_values(&[CrisisPhase::Active.as_str()])
        .inc();
    info!(identity = %profile.identity, question_id, "Crisis started");
    crisis
}

/// Apply a terminal transition to the profile and return the events it raises.
/// The caller persists the profile.
pub fn resolve(profile: &mut UserProfile, phase: CrisisPhase) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    match phase {
        CrisisPhase::Win => {
            profile.lives = MAX_LIVES;
            profile.crisis_wins += 1;
            events.push(ProgressEvent::CrisisWon {
                first: profile.crisis_wins == 1,
            });
        }
        CrisisPhase::LossTimeout | CrisisPhase::LossWrongAnswer => {
            profile.lives = profile.lives.saturating_sub(CRISIS_PENALTY);
            events.push(ProgressEvent::CrisisFailed { phase });
        }
        CrisisPhase::Idle | CrisisPhase::Active => return events,
    }

    profile.crisis = None;
    CRISIS_TRANSITIONS_TOTAL
        .with_label_values(&[phase.as_str()])
        .inc();
    info!(identity = %profile.identity, phase = phase.as_str(), lives = profile.lives, "Crisis resolved");
    events
}

pub fn status(profile: &UserProfile, phase: CrisisPhase, now: DateTime<Utc>) -> CrisisStatus {
    let active = profile.crisis.filter(|_| phase == CrisisPhase::Active);
    CrisisStatus {
        phase,
        deadline: active.map(|c| c.deadline()),
        remaining_ms: active.map(|c| c.remaining_ms(now)),
        lives: profile.lives,
    }
}

/// Time's-up handling shared by the client signal, the next-question path and
/// the background sweep.
pub struct CrisisService {
    store: LocalStore,
    replication: ReplicationWorker,
    clock: Arc<dyn Clock>,
}

impl CrisisService {
    pub fn new(store: LocalStore, replication: ReplicationWorker, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            replication,
            clock,
        }
    }

    /// Re-check the deadline and apply the timeout penalty if it has really
    /// passed. Early or replayed signals leave the crisis untouched.
    pub async fn expire_if_due(&self, identity: &str) -> EngineResult<CrisisStatus> {
        let now = self.clock.now();
        let owner = identity.to_string();
        let (report, changed) = self
            .store
            .write(
                "crisis_timeout",
                move |tx| -> EngineResult<(CrisisStatus, bool)> {
                    let mut profile = profiles::load(tx, &owner)?
                        .ok_or_else(|| EngineError::ProfileNotFound(owner.clone()))?;
                    let phase = check(&profile, now);
                    if phase != CrisisPhase::LossTimeout {
                        return Ok((status(&profile, phase, now), false));
                    }
                    resolve(&mut profile, CrisisPhase::LossTimeout);
                    profiles::save(tx, &profile)?;
                    Ok((status(&profile, CrisisPhase::LossTimeout, now), true))
                },
            )
            .await?;

        if changed {
            self.replication.mirror(MirrorJob::profile(identity));
        }
        Ok(report)
    }

    /// Expire every overdue crisis. Returns how many were resolved.
    pub async fn sweep(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let open = self.store.read("crisis_scan", profiles::in_crisis).await?;
        CRISIS_ACTIVE.set(open.len() as i64);

        let mut resolved = 0;
        for profile in open.iter().filter(|p| check(p, now) == CrisisPhase::LossTimeout) {
            match self.expire_if_due(&profile.identity).await {
                Ok(report) if report.phase == CrisisPhase::LossTimeout => resolved += 1,
                Ok(_) => {}
                Err(EngineError::Store(e)) => return Err(e),
                Err(_) => {}
            }
        }
        CRISIS_ACTIVE.set((open.len() - resolved) as i64);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn profile_at(level: u32, lives: u32) -> UserProfile {
        let mut profile = UserProfile::new("id", "Ada", "ada@example.com");
        profile.level = level;
        profile.lives = lives;
        profile
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn trigger_requires_level_and_lives() {
        assert!(!should_trigger(&profile_at(2, 5), 0.0, 0.10));
        assert!(!should_trigger(&profile_at(3, 2), 0.0, 0.10));
        assert!(should_trigger(&profile_at(3, 3), 0.05, 0.10));
        assert!(!should_trigger(&profile_at(3, 3), 0.50, 0.10));
    }

    #[test]
    fn first_crisis_is_forced_late_in_level_three() {
        let mut profile = profile_at(3, 3);
        profile.questions_answered = 371;
        assert!(should_trigger(&profile, 0.99, 0.10));
        profile.crisis_wins = 1;
        assert!(!should_trigger(&profile, 0.99, 0.10));
    }

    #[test]
    fn check_reports_timeout_only_after_grace() {
        let mut profile = profile_at(3, 4);
        begin(&mut profile, 11, t0());
        assert_eq!(
            check(&profile, t0() + Duration::milliseconds(29_000)),
            CrisisPhase::Active
        );
        assert_eq!(
            check(&profile, t0() + Duration::milliseconds(30_200)),
            CrisisPhase::LossTimeout
        );
    }

    #[test]
    fn win_restores_all_lives() {
        let mut profile = profile_at(3, 3);
        begin(&mut profile, 11, t0());
        let events = resolve(&mut profile, CrisisPhase::Win);
        assert_eq!(profile.lives, MAX_LIVES);
        assert_eq!(profile.crisis_wins, 1);
        assert!(profile.crisis.is_none());
        assert_eq!(events, vec![ProgressEvent::CrisisWon { first: true }]);
    }

    #[test]
    fn losses_cost_two_lives_floored() {
        let mut profile = profile_at(3, 1);
        begin(&mut profile, 11, t0());
        resolve(&mut profile, CrisisPhase::LossWrongAnswer);
        assert_eq!(profile.lives, 0);
        assert!(profile.crisis.is_none());
    }
}
