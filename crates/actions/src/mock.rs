//! Test doubles for the action collaborators.
//!
//! Every double records what it was asked to do so tests can assert on
//! side effects, and most can be told to fail.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use db::models::PubRow;

use crate::traits::{
    ExportRequest, Exporter, HttpClient, HttpRequest, HttpResponse, MoveRequest, Notifier,
    OutgoingEmail, PubMover,
};
use crate::{ActionContext, ActionError, Integrations, Services};

/// What a double does when called.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    Succeed,
    FailRetryable(String),
    FailFatal(String),
}

impl MockBehaviour {
    fn outcome(&self) -> Result<(), ActionError> {
        match self {
            Self::Succeed => Ok(()),
            Self::FailRetryable(msg) => Err(ActionError::Retryable(msg.clone())),
            Self::FailFatal(msg) => Err(ActionError::Fatal(msg.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Records every email. A configured delay is applied before recording,
/// which lets tests hit the action timeout.
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutgoingEmail>>,
    behaviour: Mutex<MockBehaviour>,
    delay: Mutex<Option<Duration>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            behaviour: Mutex::new(MockBehaviour::Succeed),
            delay: Mutex::new(None),
        }
    }
}

impl RecordingNotifier {
    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_email(&self, email: OutgoingEmail) -> Result<(), ActionError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(email);
        let behaviour = self.behaviour.lock().unwrap().clone();
        behaviour.outcome()
    }
}

// ---------------------------------------------------------------------------
// MockHttpClient
// ---------------------------------------------------------------------------

/// Answers every request with a canned response (200 `{"ok": true}` unless
/// told otherwise).
pub struct MockHttpClient {
    requests: Mutex<Vec<HttpRequest>>,
    response: Mutex<Result<HttpResponse, ActionError>>,
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            response: Mutex::new(Ok(HttpResponse { status: 200, body: json!({ "ok": true }) })),
        }
    }
}

impl MockHttpClient {
    pub fn respond_with(&self, status: u16, body: Value) {
        *self.response.lock().unwrap() = Ok(HttpResponse { status, body });
    }

    /// Simulate a transport failure.
    pub fn fail_with(&self, error: ActionError) {
        *self.response.lock().unwrap() = Err(error);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ActionError> {
        self.requests.lock().unwrap().push(request);
        self.response.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// MockExporter
// ---------------------------------------------------------------------------

/// Pretends to render the pub and returns a fake artifact URL.
pub struct MockExporter {
    requests: Mutex<Vec<ExportRequest>>,
    behaviour: Mutex<MockBehaviour>,
}

impl Default for MockExporter {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            behaviour: Mutex::new(MockBehaviour::Succeed),
        }
    }
}

impl MockExporter {
    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn requests(&self) -> Vec<ExportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exporter for MockExporter {
    async fn export(&self, request: ExportRequest) -> Result<Value, ActionError> {
        let out = json!({
            "format": request.format,
            "url": format!("https://files.example.org/{}.{}", request.pub_row.id, request.format),
        });
        self.requests.lock().unwrap().push(request);
        let behaviour = self.behaviour.lock().unwrap().clone();
        behaviour.outcome().map(|_| out)
    }
}

// ---------------------------------------------------------------------------
// RecordingMover
// ---------------------------------------------------------------------------

/// Records move requests without touching any stage.
#[derive(Default)]
pub struct RecordingMover {
    requests: Mutex<Vec<MoveRequest>>,
}

impl RecordingMover {
    pub fn requests(&self) -> Vec<MoveRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PubMover for RecordingMover {
    async fn move_pub(&self, request: MoveRequest) -> Result<Value, ActionError> {
        self.requests.lock().unwrap().push(request);
        Ok(json!({ "pubId": request.pub_id, "toStageId": request.to_stage_id }))
    }
}

// ---------------------------------------------------------------------------
// MockServices
// ---------------------------------------------------------------------------

/// One of each double, with typed handles for assertions.
pub struct MockServices {
    pub notifier: Arc<RecordingNotifier>,
    pub http: Arc<MockHttpClient>,
    pub exporter: Arc<MockExporter>,
    pub mover: Arc<RecordingMover>,
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServices {
    pub fn new() -> Self {
        Self {
            notifier: Arc::new(RecordingNotifier::default()),
            http: Arc::new(MockHttpClient::default()),
            exporter: Arc::new(MockExporter::default()),
            mover: Arc::new(RecordingMover::default()),
        }
    }

    /// The doubles minus the mover, for wiring into an engine.
    pub fn integrations(&self) -> Integrations {
        Integrations {
            notifier: self.notifier.clone(),
            http: self.http.clone(),
            exporter: self.exporter.clone(),
        }
    }

    pub fn services(&self) -> Services {
        self.integrations().with_mover(self.mover.clone())
    }

    /// A context for a throwaway pub with the given instance config and
    /// empty params.
    pub fn context(&self, config: Value) -> ActionContext {
        let community_id = Uuid::new_v4();
        ActionContext {
            action_instance_id: Uuid::new_v4(),
            action_instance_name: "test action".into(),
            community_id,
            stage_id: Uuid::new_v4(),
            pub_row: PubRow {
                id: Uuid::new_v4(),
                community_id,
                pub_type_id: Uuid::new_v4(),
                values: json!({}),
                created_at: Utc::now(),
            },
            config,
            params: json!({}),
            dedup_key: "test".into(),
            cascade_depth: 0,
            services: self.services(),
        }
    }
}
