//! Proactive question bank refill.
//!
//! When the non-seed pool for a level runs low, a triad for the learner's
//! current curriculum module is requested in the background. One refill per
//! level at a time, and never more often than the configured interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::metrics::BANK_REFILLS_TOTAL;
use crate::models::question::QuestionOrigin;
use crate::rules::{level_for, module_for, question_level_for};
use crate::store::{questions, LocalStore};
use crate::utils::clock::Clock;

use super::content_service::{parse_generated, ContentProvider, GenerationRequest};

#[derive(Debug, Default)]
struct Slot {
    in_flight: bool,
    last_started: Option<Instant>,
}

/// Per-level single-flight gate with a minimum re-trigger interval.
#[derive(Clone)]
pub struct RefillGuard {
    slots: Arc<Mutex<HashMap<u32, Slot>>>,
    min_interval: Duration,
}

/// Held for the duration of one refill. Releases the level on drop.
pub struct RefillTicket {
    guard: RefillGuard,
    level: u32,
}

impl RefillGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            min_interval,
        }
    }

    pub fn try_acquire(&self, level: u32) -> Option<RefillTicket> {
        let mut slots = self.slots.lock().ok()?;
        let slot = slots.entry(level).or_default();
        if slot.in_flight {
            return None;
        }
        if let Some(last) = slot.last_started {
            if last.elapsed() < self.min_interval {
                return None;
            }
        }
        slot.in_flight = true;
        slot.last_started = Some(Instant::now());
        Some(RefillTicket {
            guard: self.clone(),
            level,
        })
    }
}

impl Drop for RefillTicket {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.guard.slots.lock() {
            if let Some(slot) = slots.get_mut(&self.level) {
                slot.in_flight = false;
            }
        }
    }
}

#[derive(Clone)]
pub struct BankRefiller {
    store: LocalStore,
    content: Arc<dyn ContentProvider>,
    guard: RefillGuard,
    clock: Arc<dyn Clock>,
    low_watermark: u32,
    max_size: Option<u32>,
}

impl BankRefiller {
    pub fn new(
        store: LocalStore,
        content: Arc<dyn ContentProvider>,
        clock: Arc<dyn Clock>,
        low_watermark: u32,
        min_interval: Duration,
        max_size: Option<u32>,
    ) -> Self {
        Self {
            store,
            content,
            guard: RefillGuard::new(min_interval),
            clock,
            low_watermark,
            max_size,
        }
    }

    /// Spawn a refill if the pool for the learner's level is at or below the
    /// watermark. Returns whether a refill was started.
    pub async fn maybe_refill(&self, questions_answered: u32) -> bool {
        let level = question_level_for(level_for(questions_answered));
        let fresh = match self
            .store
            .read("count_fresh", move |conn| questions::count_fresh(conn, level))
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(level, "Could not count fresh questions: {}", e);
                return false;
            }
        };
        if fresh > self.low_watermark {
            return false;
        }

        let Some(ticket) = self.guard.try_acquire(level) else {
            debug!(level, "Refill already running or too recent");
            return false;
        };

        let refiller = self.clone();
        let topic = module_for(questions_answered);
        tokio::spawn(async move {
            refiller.refill(level, topic).await;
            drop(ticket);
        });
        true
    }

    /// Ask for one triad and bank whatever passes validation.
    pub async fn refill(&self, level: u32, topic: &str) -> usize {
        let request = GenerationRequest::triad(topic, level);
        let raw = match self.content.generate(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                BANK_REFILLS_TOTAL.with_label_values(&["error"]).inc();
                warn!(level, topic, "Refill generation failed: {:#}", e);
                return 0;
            }
        };

        let batch = parse_generated(&raw, &request, QuestionOrigin::Generated);
        if batch.is_empty() {
            BANK_REFILLS_TOTAL.with_label_values(&["empty"]).inc();
            return 0;
        }

        let now = self.clock.now();
        let max_size = self.max_size;
        let inserted = self
            .store
            .write("refill_insert", move |tx| {
                let mut inserted = 0;
                for question in batch {
                    questions::insert(tx, question, now)?;
                    inserted += 1;
                }
                if let Some(max_size) = max_size {
                    let evicted = questions::evict_oldest(tx, max_size)?;
                    if evicted > 0 {
                        debug!(evicted, "Evicted oldest bank rows");
                    }
                }
                Ok::<_, crate::error::StoreError>(inserted)
            })
            .await;

        match inserted {
            Ok(inserted) => {
                BANK_REFILLS_TOTAL.with_label_values(&["success"]).inc();
                info!(level, topic, inserted, "Question bank refilled");
                inserted
            }
            Err(e) => {
                BANK_REFILLS_TOTAL.with_label_values(&["error"]).inc();
                warn!(level, topic, "Failed to store refill batch: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_ticket_per_level() {
        let guard = RefillGuard::new(Duration::ZERO);
        let ticket = guard.try_acquire(2);
        assert!(ticket.is_some());
        assert!(guard.try_acquire(2).is_none());
        assert!(guard.try_acquire(3).is_some());

        drop(ticket);
        assert!(guard.try_acquire(2).is_some());
    }

    #[test]
    fn min_interval_blocks_retrigger() {
        let guard = RefillGuard::new(Duration::from_secs(60));
        drop(guard.try_acquire(1));
        assert!(guard.try_acquire(1).is_none());
    }
}
