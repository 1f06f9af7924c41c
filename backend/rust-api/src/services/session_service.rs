use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{EngineError, EngineResult};
use crate::models::profile::{LoginRequest, RegisterRequest, SessionResponse, UserProfile};
use crate::store::{profiles, LocalStore};
use crate::utils::clock::Clock;

use super::replication::{MirrorJob, ReplicationWorker};

/// Identities resumed by this process. Engine calls for anyone else are
/// refused until they log in or resume, so a pull always precedes play.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    resumed: RwLock<HashSet<String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_resumed(&self, identity: &str) {
        if let Ok(mut resumed) = self.resumed.write() {
            resumed.insert(identity.to_string());
        }
    }

    pub fn is_resumed(&self, identity: &str) -> bool {
        self.resumed
            .read()
            .map(|resumed| resumed.contains(identity))
            .unwrap_or(false)
    }

    pub fn ensure_resumed(&self, identity: &str) -> EngineResult<()> {
        if self.is_resumed(identity) {
            Ok(())
        } else {
            Err(EngineError::SessionNotResumed(identity.to_string()))
        }
    }
}

pub struct SessionService {
    store: LocalStore,
    replication: ReplicationWorker,
    sessions: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(
        store: LocalStore,
        replication: ReplicationWorker,
        sessions: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            replication,
            sessions,
            clock,
        }
    }

    /// Create a learner with a fresh identity.
    pub async fn register(&self, req: &RegisterRequest) -> EngineResult<SessionResponse> {
        req.validate()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;

        let email = req.email.trim().to_lowercase();
        let mut profile = UserProfile::new(Uuid::new_v4().to_string(), req.name.trim(), &email);
        profile.last_seen = Some(self.clock.now());

        let row = profile.clone();
        self.store
            .write("register", move |tx| -> EngineResult<()> {
                if profiles::find_by_email(tx, &email)?.is_some() {
                    return Err(EngineError::DuplicateEmail(email));
                }
                profiles::save(tx, &row)?;
                Ok(())
            })
            .await?;

        info!(identity = %profile.identity, "Learner registered");
        self.replication.mirror(MirrorJob::profile(&profile.identity));
        self.sessions.mark_resumed(&profile.identity);

        Ok(SessionResponse {
            profile,
            restored_from_mirror: false,
        })
    }

    /// Log in by email. Falls back to the remote mirror when this device has
    /// never seen the learner.
    pub async fn login(&self, req: &LoginRequest) -> EngineResult<SessionResponse> {
        req.validate()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let email = req.email.trim().to_lowercase();

        let lookup = email.clone();
        let local = self
            .store
            .read("find_by_email", move |conn| profiles::find_by_email(conn, &lookup))
            .await?;
        let identity = match local {
            Some(profile) => profile.identity,
            None => match self.replication.lookup_identity(&email).await {
                Some(identity) => identity,
                None => {
                    warn!("Login for unknown email");
                    return Err(EngineError::ProfileNotFound(email));
                }
            },
        };

        self.resume_identity(&identity).await
    }

    pub async fn resume(&self, identity: &str) -> EngineResult<SessionResponse> {
        self.resume_identity(identity).await
    }

    /// Pull, then hand back whatever local state exists.
    async fn resume_identity(&self, identity: &str) -> EngineResult<SessionResponse> {
        let restored_from_mirror = self.replication.pull(identity).await;

        let now = self.clock.now();
        let owner = identity.to_string();
        let profile = self
            .store
            .write("resume", move |tx| -> EngineResult<UserProfile> {
                profiles::touch(tx, &owner, now)?;
                profiles::load(tx, &owner)?.ok_or(EngineError::ProfileNotFound(owner))
            })
            .await?;

        self.sessions.mark_resumed(identity);
        info!(identity, restored_from_mirror, "Session resumed");
        Ok(SessionResponse {
            profile,
            restored_from_mirror,
        })
    }
}
