use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::store::LocalStore;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::retry::RetryPolicy;

use content_service::{ContentProvider, HttpContentProvider};
use crisis::CrisisService;
use crisis_sweeper::CrisisSweeper;
use refill::BankRefiller;
use remote::{MongoMirror, RemoteStore};
use replication::ReplicationWorker;
use session_service::SessionRegistry;

pub struct AppState {
    pub config: Config,
    pub store: LocalStore,
    pub replication: ReplicationWorker,
    pub content: Arc<dyn ContentProvider>,
    pub refiller: BankRefiller,
    pub sessions: Arc<SessionRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire production collaborators: SQLite on disk, MongoDB mirror when a
    /// URI is configured, HTTP content provider.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = LocalStore::open(
            &config.local_store.path,
            config.local_store.reader_connections,
        )?;

        let remote: Option<Arc<dyn RemoteStore>> = match &config.mirror.mongo_uri {
            Some(uri) => {
                tracing::info!("Connecting remote mirror (database {})", config.mirror.database);
                let mirror = MongoMirror::connect(uri, &config.mirror.database).await?;
                Some(Arc::new(mirror))
            }
            None => {
                tracing::warn!("No mirror URI configured, replication disabled");
                None
            }
        };

        let content: Arc<dyn ContentProvider> = Arc::new(HttpContentProvider::new(
            config.content.api_url.clone(),
            config.content.timeout(),
        ));

        Ok(Self::from_parts(
            config,
            store,
            remote,
            content,
            Arc::new(SystemClock),
        ))
    }

    pub fn from_parts(
        config: Config,
        store: LocalStore,
        remote: Option<Arc<dyn RemoteStore>>,
        content: Arc<dyn ContentProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let replication = ReplicationWorker::new(
            store.clone(),
            remote,
            RetryPolicy::default(),
            config.sync.pull_timeout(),
        );
        let refiller = BankRefiller::new(
            store.clone(),
            content.clone(),
            clock.clone(),
            config.bank.refill_low_watermark,
            Duration::from_secs(config.bank.refill_min_interval_secs),
            config.bank.max_size,
        );

        Self {
            config,
            store,
            replication,
            content,
            refiller,
            sessions: Arc::new(SessionRegistry::new()),
            clock,
        }
    }

    pub fn crisis_service(&self) -> CrisisService {
        CrisisService::new(self.store.clone(), self.replication.clone(), self.clock.clone())
    }

    pub fn sweeper(&self) -> CrisisSweeper {
        CrisisSweeper::new(
            self.crisis_service(),
            self.store.clone(),
            self.clock.clone(),
            Duration::from_secs(self.config.crisis.sweep_interval_secs.max(1)),
        )
    }
}

pub mod answer_service;
pub mod badges;
pub mod content_service;
pub mod crisis;
pub mod crisis_sweeper;
pub mod lifeline_service;
pub mod question_service;
pub mod refill;
pub mod remote;
pub mod replication;
pub mod seed;
pub mod selector;
pub mod session_service;
