//! Collaborator capabilities an action may call.
//!
//! The engine treats these as opaque; each action only relies on the
//! `Result` contract. Every request carries the invocation's dedup key so
//! implementations can pass it on as an idempotency key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::models::PubRow;

use crate::ActionError;

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub idempotency_key: String,
}

/// Sends notifications (email).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, email: OutgoingEmail) -> Result<(), ActionError>;
}

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Upper-case method name, e.g. `"POST"`.
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON body, or the raw text as a JSON string.
    pub body: Value,
}

/// Performs outbound HTTP calls. Transport failures should be `Retryable`;
/// status codes are interpreted by the calling action.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ActionError>;
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Target format, e.g. `"pdf"`.
    pub format: String,
    pub pub_row: PubRow,
    pub options: Value,
    pub idempotency_key: String,
}

/// Renders a pub into an external artifact and returns a description of it
/// (typically a URL).
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, request: ExportRequest) -> Result<Value, ActionError>;
}

// ---------------------------------------------------------------------------
// PubMover
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub pub_id: Uuid,
    pub from_stage_id: Option<Uuid>,
    pub to_stage_id: Uuid,
    /// How many action-triggered moves led to this one.
    pub cascade_depth: u32,
}

/// Moves a pub between stages. Implemented by the workflow engine, so a
/// move issued by an action fires the same rules as any other move.
#[async_trait]
pub trait PubMover: Send + Sync {
    async fn move_pub(&self, request: MoveRequest) -> Result<Value, ActionError>;
}
