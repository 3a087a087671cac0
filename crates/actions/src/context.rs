//! The context handed to an action's `run`.

use serde_json::Value;
use uuid::Uuid;

use db::models::PubRow;

use crate::{ActionError, Services};

/// Everything one invocation needs: resolved settings, the target pub and
/// collaborator handles.
///
/// `config` and `params` have already been validated against the kind's
/// schemas and had their defaults applied.
#[derive(Clone)]
pub struct ActionContext {
    pub action_instance_id: Uuid,
    pub action_instance_name: String,
    pub community_id: Uuid,
    /// Stage the action instance is configured on.
    pub stage_id: Uuid,
    pub pub_row: PubRow,
    pub config: Value,
    pub params: Value,
    /// `"{action_instance_id}:{pub_id}:{trigger_id}"`.
    pub dedup_key: String,
    /// Number of action-triggered moves that led to this invocation.
    pub cascade_depth: u32,
    pub services: Services,
}

impl ActionContext {
    /// Look up a setting, preferring a non-null run-time parameter over the
    /// instance configuration.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.params
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.config.get(key).filter(|v| !v.is_null()))
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.setting(key).and_then(Value::as_str)
    }

    /// Like [`Self::setting_str`] but a missing value is a fatal error.
    pub fn require_str(&self, key: &str) -> Result<&str, ActionError> {
        self.setting_str(key)
            .ok_or_else(|| ActionError::Fatal(format!("missing setting '{key}'")))
    }
}
