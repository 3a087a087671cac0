//! The bundle of collaborator handles passed to every action, plus the
//! stand-in collaborators used when no real integration is configured.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::traits::{
    ExportRequest, Exporter, HttpClient, Notifier, OutgoingEmail, PubMover,
};
use crate::ActionError;

/// Capability handles shared by all action runs.
#[derive(Clone)]
pub struct Services {
    pub notifier: Arc<dyn Notifier>,
    pub http: Arc<dyn HttpClient>,
    pub exporter: Arc<dyn Exporter>,
    pub mover: Arc<dyn PubMover>,
}

/// The externally supplied collaborators. The mover is missing because it
/// is the engine itself; see [`Integrations::with_mover`].
#[derive(Clone)]
pub struct Integrations {
    pub notifier: Arc<dyn Notifier>,
    pub http: Arc<dyn HttpClient>,
    pub exporter: Arc<dyn Exporter>,
}

impl Integrations {
    pub fn with_mover(self, mover: Arc<dyn PubMover>) -> Services {
        Services {
            notifier: self.notifier,
            http: self.http,
            exporter: self.exporter,
            mover,
        }
    }
}

/// Writes outgoing email to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, email: OutgoingEmail) -> Result<(), ActionError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            idempotency_key = %email.idempotency_key,
            "email delivery is not configured; logging message instead"
        );
        Ok(())
    }
}

/// Rejects every export; used when no rendering service is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredExporter;

#[async_trait]
impl Exporter for UnconfiguredExporter {
    async fn export(&self, request: ExportRequest) -> Result<Value, ActionError> {
        Err(ActionError::Fatal(format!(
            "no exporter configured for format '{}'",
            request.format
        )))
    }
}
