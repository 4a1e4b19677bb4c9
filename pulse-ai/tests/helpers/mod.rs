//! Test helper utilities
//!
//! Shared setup for the pulse-ai integration suites: a scripted provider,
//! an app wired to an in-memory database, and request helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use pulse_ai::provider::{AiProvider, CompletionParams, Prompt, ProviderError};
use pulse_ai::queue::{OperationQueue, OperationSnapshot};
use pulse_ai::settings::{Settings, SettingsHandle};
use pulse_ai::AppState;
use pulse_common::auth::{AuthenticatedUser, Role};
use pulse_common::db::configurations::seed_defaults;
use pulse_common::db::connect_in_memory;
use pulse_common::db::sessions::create_session;
use pulse_common::events::EventBus;
use pulse_common::operations::OperationState;
use pulse_common::settings::DEFAULT_ENVIRONMENT;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use uuid::Uuid;

/// Provider that answers after a fixed delay with a fixed outcome
pub struct ScriptedProvider {
    delay: Duration,
    reply: Option<String>,
    calls: AtomicU32,
    seen: Mutex<Vec<(Prompt, CompletionParams)>>,
}

impl ScriptedProvider {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Some(reply.into()),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with HTTP 500
    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Parameters of every call so far
    pub fn params(&self) -> Vec<CompletionParams> {
        self.seen.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.seen.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        params: &CompletionParams,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((prompt.clone(), params.clone()));
        tokio::time::sleep(self.delay).await;
        match &self.reply {
            Some(text) => Ok(text.clone()),
            None => Err(ProviderError::Status {
                status: 500,
                body: "scripted failure".into(),
            }),
        }
    }
}

/// App, queue and database for one test
pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub queue: Arc<OperationQueue>,
    pub event_bus: EventBus,
    pub settings: SettingsHandle,
    pub admin: AuthenticatedUser,
    pub admin_token: String,
    pub member: AuthenticatedUser,
    pub member_token: String,
    pub viewer_token: String,
    shutdown: CancellationToken,
    reload_listener: Option<JoinHandle<()>>,
}

pub fn user(role: Role, name: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        display_name: name.to_string(),
        role,
    }
}

impl TestApp {
    /// Seeded database, settings adjusted by `configure`, workers not started
    pub async fn new(provider: Arc<dyn AiProvider>, configure: impl FnOnce(&mut Settings)) -> Self {
        let pool = connect_in_memory().await.expect("in-memory database");
        seed_defaults(&pool, DEFAULT_ENVIRONMENT).await.expect("seed defaults");

        let mut settings = Settings::load(&pool, DEFAULT_ENVIRONMENT)
            .await
            .expect("load settings");
        configure(&mut settings);
        let settings = SettingsHandle::new(settings, DEFAULT_ENVIRONMENT);

        let event_bus = EventBus::new(100);
        let shutdown = CancellationToken::new();
        let reload_listener =
            settings.spawn_reload_listener(pool.clone(), &event_bus, shutdown.clone());

        let queue = Arc::new(OperationQueue::new(
            provider,
            settings.clone(),
            event_bus.clone(),
            pool.clone(),
        ));
        let state = AppState::new(pool.clone(), event_bus.clone(), queue.clone(), settings.clone());
        let router = pulse_ai::build_router(state);

        let admin = user(Role::Admin, "Admin");
        let member = user(Role::Member, "Member");
        let viewer = user(Role::Viewer, "Viewer");
        let admin_token = create_session(&pool, &admin, None).await.unwrap();
        let member_token = create_session(&pool, &member, None).await.unwrap();
        let viewer_token = create_session(&pool, &viewer, None).await.unwrap();

        Self {
            router,
            pool,
            queue,
            event_bus,
            settings,
            admin,
            admin_token,
            member,
            member_token,
            viewer_token,
            shutdown,
            reload_listener: Some(reload_listener),
        }
    }

    /// Token for an additional user
    pub async fn token_for(&self, user: &AuthenticatedUser) -> String {
        create_session(&self.pool, user, None).await.unwrap()
    }

    /// Send a request and decode the JSON body (`Value::Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    /// Stop workers and the settings listener
    pub async fn shutdown(mut self) {
        self.queue.stop().await;
        self.shutdown.cancel();
        if let Some(listener) = self.reload_listener.take() {
            let _ = listener.await;
        }
    }
}

/// Poll until the operation reaches `state`
pub async fn wait_for_state(
    queue: &OperationQueue,
    id: Uuid,
    state: OperationState,
    timeout: Duration,
) -> OperationSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = queue
            .get_operation(id)
            .await
            .unwrap()
            .expect("operation exists");
        if snapshot.status == state {
            return snapshot;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "operation {} still {} after {:?}, expected {}",
                id, snapshot.status, timeout, state
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until `check` holds or the timeout expires
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
