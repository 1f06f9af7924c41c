//! Write-behind mirroring to the remote store and pull-on-resume.
//!
//! Every local commit that touches a tracked table hands a [`MirrorJob`] to the
//! worker. The job is spawned and retried off the request path; the payload is
//! read from the local store when the task runs, so late deliveries carry the
//! newest committed row.

use anyhow::{Context, Result};
use mongodb::bson::{self, doc, Document};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics::{track_replication, PULLS_TOTAL};
use crate::models::mirror::{CategoryStatRow, GlossaryRow, MirrorTable, ProfileRow, SolvedRow};
use crate::models::progress::GlossaryEntry;
use crate::store::{profiles, progress, LocalStore};
use crate::utils::retry::{retry_with_backoff, RetryPolicy};

use super::remote::RemoteStore;

/// One row to copy to the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorJob {
    Profile { identity: String },
    Solved { identity: String, fingerprint: String },
    CategoryStat { identity: String, category: String },
    Glossary { identity: String, term: String },
}

impl MirrorJob {
    pub fn profile(identity: &str) -> Self {
        MirrorJob::Profile {
            identity: identity.to_string(),
        }
    }

    pub fn table(&self) -> MirrorTable {
        match self {
            MirrorJob::Profile { .. } => MirrorTable::Profiles,
            MirrorJob::Solved { .. } => MirrorTable::Solved,
            MirrorJob::CategoryStat { .. } => MirrorTable::CategoryStats,
            MirrorJob::Glossary { .. } => MirrorTable::Glossary,
        }
    }

    fn key(&self) -> Document {
        match self {
            MirrorJob::Profile { identity } => doc! { "identity": identity },
            MirrorJob::Solved {
                identity,
                fingerprint,
            } => doc! { "identity": identity, "fingerprint": fingerprint },
            MirrorJob::CategoryStat { identity, category } => {
                doc! { "identity": identity, "category": category }
            }
            MirrorJob::Glossary { identity, term } => doc! { "identity": identity, "term": term },
        }
    }
}

/// Remote state for one identity, as fetched during a pull.
struct Snapshot {
    profile: ProfileRow,
    solved: Vec<SolvedRow>,
    categories: Vec<CategoryStatRow>,
    glossary: Vec<GlossaryRow>,
}

#[derive(Clone)]
pub struct ReplicationWorker {
    store: LocalStore,
    remote: Option<Arc<dyn RemoteStore>>,
    retry: RetryPolicy,
    pull_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl ReplicationWorker {
    pub fn new(
        store: LocalStore,
        remote: Option<Arc<dyn RemoteStore>>,
        retry: RetryPolicy,
        pull_timeout: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            retry,
            pull_timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Queue one row for mirroring. Returns immediately; failures are logged
    /// and never reach the caller.
    pub fn mirror(&self, job: MirrorJob) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let worker = self.clone();
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let table = job.table();
            match worker.push(remote.as_ref(), &job).await {
                Ok(()) => debug!(table = table.name(), ?job, "Mirrored row"),
                Err(e) => warn!(table = table.name(), ?job, "Mirror write failed: {:#}", e),
            }
            worker.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn mirror_all(&self, jobs: impl IntoIterator<Item = MirrorJob>) {
        for job in jobs {
            self.mirror(job);
        }
    }

    async fn push(&self, remote: &dyn RemoteStore, job: &MirrorJob) -> Result<()> {
        let Some(row) = self.payload(job).await? else {
            debug!(?job, "Row vanished locally before mirroring");
            return Ok(());
        };
        let table = job.table();
        let key = job.key();

        retry_with_backoff(&self.retry, table.name(), || {
            track_replication(table.name(), remote.upsert(table, key.clone(), row.clone()))
        })
        .await
    }

    /// Current local value of the row a job refers to.
    async fn payload(&self, job: &MirrorJob) -> Result<Option<Document>> {
        let document = match job.clone() {
            MirrorJob::Profile { identity } => {
                let profile = self
                    .store
                    .read("mirror_profile", move |conn| profiles::load(conn, &identity))
                    .await?;
                match profile {
                    Some(profile) => Some(bson::to_document(&ProfileRow::from(&profile))?),
                    None => None,
                }
            }
            MirrorJob::Solved {
                identity,
                fingerprint,
            } => Some(bson::to_document(&SolvedRow {
                identity,
                fingerprint,
            })?),
            MirrorJob::CategoryStat { identity, category } => {
                let key = (identity.clone(), category.clone());
                let correct_count = self
                    .store
                    .read("mirror_category", move |conn| {
                        progress::category_count(conn, &key.0, &key.1)
                    })
                    .await?;
                Some(bson::to_document(&CategoryStatRow {
                    identity,
                    category,
                    correct_count,
                })?)
            }
            MirrorJob::Glossary { identity, term } => {
                let key = (identity.clone(), term);
                let entry = self
                    .store
                    .read("mirror_glossary", move |conn| {
                        progress::glossary_entry(conn, &key.0, &key.1)
                    })
                    .await?;
                match entry {
                    Some(entry) => Some(bson::to_document(&GlossaryRow {
                        identity,
                        term: entry.term,
                        definition: entry.definition,
                        category: entry.category,
                    })?),
                    None => None,
                }
            }
        };
        Ok(document)
    }

    /// Merge remote state for `identity` into the local store. Tracked profile
    /// fields are overwritten; set-like tables are unioned. Bounded by the
    /// pull timeout and fails open: on any error local state stays as it was.
    /// Returns whether remote state was applied.
    pub async fn pull(&self, identity: &str) -> bool {
        let Some(remote) = self.remote.as_ref() else {
            return false;
        };

        let fetched = tokio::time::timeout(self.pull_timeout, fetch(remote.as_ref(), identity)).await;
        let snapshot = match fetched {
            Ok(Ok(Some(snapshot))) => snapshot,
            Ok(Ok(None)) => {
                PULLS_TOTAL.with_label_values(&["empty"]).inc();
                debug!(identity, "No remote profile to pull");
                return false;
            }
            Ok(Err(e)) => {
                PULLS_TOTAL.with_label_values(&["error"]).inc();
                warn!(identity, "Pull failed, keeping local state: {:#}", e);
                return false;
            }
            Err(_) => {
                PULLS_TOTAL.with_label_values(&["timeout"]).inc();
                warn!(identity, timeout_ms = self.pull_timeout.as_millis() as u64, "Pull timed out, keeping local state");
                return false;
            }
        };

        match self.apply(identity, snapshot).await {
            Ok(()) => {
                PULLS_TOTAL.with_label_values(&["success"]).inc();
                info!(identity, "Pulled remote state");
                true
            }
            Err(e) => {
                PULLS_TOTAL.with_label_values(&["error"]).inc();
                warn!(identity, "Failed to apply pulled state: {}", e);
                false
            }
        }
    }

    async fn apply(&self, identity: &str, snapshot: Snapshot) -> crate::error::StoreResult<()> {
        let identity = identity.to_string();
        self.store
            .write("pull_merge", move |tx| {
                let identity = identity.as_str();
                let local = profiles::load(tx, identity)?;
                let profile = snapshot.profile.into_profile(local);
                profiles::save(tx, &profile)?;

                for row in snapshot.solved.iter().filter(|r| r.identity == identity) {
                    progress::insert_solved(tx, identity, &row.fingerprint)?;
                }
                for row in snapshot.categories.iter().filter(|r| r.identity == identity) {
                    progress::merge_category(tx, identity, &row.category, row.correct_count)?;
                }
                for row in snapshot.glossary.into_iter().filter(|r| r.identity == identity) {
                    progress::insert_glossary(
                        tx,
                        identity,
                        &GlossaryEntry {
                            term: row.term,
                            definition: row.definition,
                            category: row.category,
                        },
                    )?;
                }
                Ok(())
            })
            .await
    }

    /// Identity registered remotely under `email`, for logins on a device
    /// that has never seen the learner. Fails open like `pull`.
    pub async fn lookup_identity(&self, email: &str) -> Option<String> {
        let remote = self.remote.as_ref()?;
        let query = remote.select(MirrorTable::Profiles, doc! { "email": email.to_lowercase() });
        match tokio::time::timeout(self.pull_timeout, query).await {
            Ok(Ok(rows)) => rows
                .into_iter()
                .find_map(|row| bson::from_document::<ProfileRow>(row).ok())
                .map(|row| row.identity),
            Ok(Err(e)) => {
                warn!("Remote identity lookup failed: {:#}", e);
                None
            }
            Err(_) => {
                warn!("Remote identity lookup timed out");
                None
            }
        }
    }

    /// Wait for spawned mirror tasks to finish. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

async fn fetch(remote: &dyn RemoteStore, identity: &str) -> Result<Option<Snapshot>> {
    let filter = doc! { "identity": identity };

    let Some(profile) = remote
        .select(MirrorTable::Profiles, filter.clone())
        .await?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    let profile: ProfileRow =
        bson::from_document(profile).context("Malformed remote profile row")?;

    let solved = decode_rows(remote.select(MirrorTable::Solved, filter.clone()).await?);
    let categories = decode_rows(remote.select(MirrorTable::CategoryStats, filter.clone()).await?);
    let glossary = decode_rows(remote.select(MirrorTable::Glossary, filter).await?);

    Ok(Some(Snapshot {
        profile,
        solved,
        categories,
        glossary,
    }))
}

/// Decode rows, skipping any that do not fit the expected shape.
fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Document>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match bson::from_document(row) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping malformed mirror row: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::UserProfile;
    use crate::services::remote::InMemoryMirror;

    fn worker(remote: Arc<InMemoryMirror>) -> (LocalStore, ReplicationWorker) {
        let store = LocalStore::open_in_memory().unwrap();
        let worker = ReplicationWorker::new(
            store.clone(),
            Some(remote),
            RetryPolicy::none(),
            Duration::from_millis(200),
        );
        (store, worker)
    }

    #[tokio::test]
    async fn mirrored_profile_lands_remotely() {
        let remote = Arc::new(InMemoryMirror::new());
        let (store, worker) = worker(remote.clone());
        let mut profile = UserProfile::new("id-1", "Ada", "ada@example.com");
        profile.xp = 60;
        store
            .write("test", move |tx| profiles::save(tx, &profile))
            .await
            .unwrap();

        worker.mirror(MirrorJob::profile("id-1"));
        assert!(worker.drain(Duration::from_secs(1)).await);

        let rows = remote.rows(MirrorTable::Profiles);
        assert_eq!(rows.len(), 1);
        let row: ProfileRow = bson::from_document(rows[0].clone()).unwrap();
        assert_eq!(row.xp, 60);
    }

    #[tokio::test]
    async fn remote_failure_is_swallowed() {
        let remote = Arc::new(InMemoryMirror::new());
        remote.set_fail_writes(true);
        let (store, worker) = worker(remote.clone());
        let profile = UserProfile::new("id-1", "Ada", "ada@example.com");
        store
            .write("test", move |tx| profiles::save(tx, &profile))
            .await
            .unwrap();

        worker.mirror(MirrorJob::profile("id-1"));
        assert!(worker.drain(Duration::from_secs(1)).await);
        assert!(remote.rows(MirrorTable::Profiles).is_empty());
    }

    #[tokio::test]
    async fn pull_without_remote_row_keeps_local() {
        let remote = Arc::new(InMemoryMirror::new());
        let (_store, worker) = worker(remote);
        assert!(!worker.pull("missing").await);
    }

    #[tokio::test]
    async fn disabled_worker_does_nothing() {
        let store = LocalStore::open_in_memory().unwrap();
        let worker = ReplicationWorker::new(store, None, RetryPolicy::none(), Duration::from_millis(10));
        worker.mirror(MirrorJob::profile("id-1"));
        assert!(worker.drain(Duration::from_millis(50)).await);
        assert!(!worker.pull("id-1").await);
        assert!(worker.lookup_identity("ada@example.com").await.is_none());
    }
}
