#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use mentor_api::{
    config::Config,
    create_router,
    error::StoreResult,
    models::profile::UserProfile,
    models::question::{AnswerOption, NewQuestion, QuestionOrigin},
    services::content_service::{ContentProvider, GenerationRequest},
    services::remote::{InMemoryMirror, RemoteStore},
    services::AppState,
    store::{profiles, questions, LocalStore},
    utils::clock::{Clock, ManualClock},
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Content provider fed from queues: one for single questions, one for
/// refill triads. An empty queue behaves like an unreachable generator.
#[derive(Default)]
pub struct ScriptedContent {
    singles: Mutex<VecDeque<String>>,
    triads: Mutex<VecDeque<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedContent {
    pub fn push_single(&self, raw: impl Into<String>) {
        self.singles.lock().unwrap().push_back(raw.into());
    }

    pub fn push_triad(&self, raw: impl Into<String>) {
        self.triads.lock().unwrap().push_back(raw.into());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for ScriptedContent {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queue = if request.triad {
            &self.triads
        } else {
            &self.singles
        };
        queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("generator unavailable"))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mirror: Arc<InMemoryMirror>,
    pub content: Arc<ScriptedContent>,
    pub clock: Arc<ManualClock>,
}

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

/// Defaults with randomness switched off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.crisis.probability = 0.0;
    config.selector.fresh_bias = 0.0;
    config.sync.pull_timeout_ms = 500;
    config.bank.refill_min_interval_secs = 3600;
    config
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = LocalStore::open_in_memory().expect("Failed to open in-memory store");
    let mirror = Arc::new(InMemoryMirror::new());
    let content = Arc::new(ScriptedContent::default());
    let clock = Arc::new(ManualClock::new(t0()));

    let remote: Arc<dyn RemoteStore> = mirror.clone();
    let provider: Arc<dyn ContentProvider> = content.clone();
    let time: Arc<dyn Clock> = clock.clone();
    let state = Arc::new(AppState::from_parts(
        config,
        store,
        Some(remote),
        provider,
        time,
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        mirror,
        content,
        clock,
    }
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn register(&self, name: &str, email: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/api/v1/learners",
                Some(serde_json::json!({ "name": name, "email": email })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["profile"]["identity"].as_str().unwrap().to_string()
    }

    pub async fn answer(&self, identity: &str, question_id: i64, answer: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            &format!("/api/v1/learners/{}/answers", identity),
            Some(serde_json::json!({ "question_id": question_id, "answer": answer })),
        )
        .await
    }

    pub fn store(&self) -> &LocalStore {
        &self.state.store
    }

    pub async fn insert_question(
        &self,
        prompt: &str,
        level: u32,
        category: &str,
        concept: Option<&str>,
    ) -> i64 {
        let question = question(prompt, level, category, concept);
        let now = self.clock.now();
        self.store()
            .write("test_insert", move |tx| questions::insert(tx, question, now))
            .await
            .unwrap()
    }

    pub async fn profile(&self, identity: &str) -> UserProfile {
        let identity = identity.to_string();
        self.store()
            .read("test_load", move |conn| profiles::load(conn, &identity))
            .await
            .unwrap()
            .expect("profile exists")
    }

    pub async fn update_profile(
        &self,
        identity: &str,
        change: impl FnOnce(&mut UserProfile) + Send + 'static,
    ) {
        let identity = identity.to_string();
        self.store()
            .write("test_update", move |tx| -> StoreResult<()> {
                let mut profile = profiles::load(tx, &identity)?.expect("profile exists");
                change(&mut profile);
                profiles::save(tx, &profile)
            })
            .await
            .unwrap();
    }

    pub async fn save_profile(&self, profile: &UserProfile) {
        let profile = profile.clone();
        self.store()
            .write("test_save", move |tx| profiles::save(tx, &profile))
            .await
            .unwrap();
    }

    pub async fn drain_replication(&self) {
        assert!(
            self.state.replication.drain(Duration::from_secs(5)).await,
            "replication did not settle"
        );
    }
}

/// Two-option question whose correct label is "A".
pub fn question(prompt: &str, level: u32, category: &str, concept: Option<&str>) -> NewQuestion {
    NewQuestion {
        category: category.to_string(),
        concept: concept.map(str::to_string),
        level,
        prompt: prompt.to_string(),
        options: vec![
            AnswerOption {
                label: "A".to_string(),
                text: "Right".to_string(),
            },
            AnswerOption {
                label: "B".to_string(),
                text: "Wrong".to_string(),
            },
            AnswerOption {
                label: "C".to_string(),
                text: "Also wrong".to_string(),
            },
        ],
        correct: "A".to_string(),
        explanation: format!("Explanation for {}", prompt),
        theory: None,
        example: None,
        tip: None,
        triad_id: None,
        triad_position: 0,
        origin: QuestionOrigin::Seed,
    }
}

/// Generator output holding one question.
pub fn generated_json(prompt: &str, category: &str) -> String {
    format!(
        "Here you go:\n[{{\"question\":\"{prompt}\",\"options\":{{\"A\":\"yes\",\"B\":\"no\"}},\
         \"correct\":\"A\",\"explanation\":\"because\",\"category\":\"{category}\",\
         \"concept_key\":\"Safety Stock\"}}]"
    )
}
