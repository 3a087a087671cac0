//! The closed action catalog.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kinds::{email, http, log, move_pub, pdf, push_to_v6};
use crate::{ActionContext, ActionError, UnknownActionKind};

/// Every action the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Log,
    Email,
    Http,
    Move,
    Pdf,
    #[serde(rename = "pushToV6")]
    PushToV6,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        Self::Log,
        Self::Email,
        Self::Http,
        Self::Move,
        Self::Pdf,
        Self::PushToV6,
    ];

    /// Wire name stored in `action_instances.action`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Email => "email",
            Self::Http => "http",
            Self::Move => "move",
            Self::Pdf => "pdf",
            Self::PushToV6 => "pushToV6",
        }
    }

    /// The registry entry for this kind.
    pub fn descriptor(&self) -> &'static ActionDescriptor {
        // `ALL` and `registry()` share one order.
        &registry()[*self as usize]
    }

    /// Execute the action. `ctx` must already hold validated settings.
    pub async fn run(&self, ctx: &ActionContext) -> Result<Value, ActionError> {
        match self {
            Self::Log => log::run(ctx).await,
            Self::Email => email::run(ctx).await,
            Self::Http => http::run(ctx).await,
            Self::Move => move_pub::run(ctx).await,
            Self::Pdf => pdf::run(ctx).await,
            Self::PushToV6 => push_to_v6::run(ctx).await,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownActionKind(s.to_owned()))
    }
}

/// Static description of one action kind.
#[derive(Debug, Clone, Serialize)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub name: &'static str,
    pub description: &'static str,
    pub config_schema: Value,
    pub params_schema: Value,
}

impl ActionDescriptor {
    fn new(kind: ActionKind, description: &'static str, config: Value, params: Value) -> Self {
        Self {
            kind,
            name: kind.as_str(),
            description,
            config_schema: config,
            params_schema: params,
        }
    }
}

/// The registration table, built once and indexed in [`ActionKind::ALL`] order.
pub fn registry() -> &'static [ActionDescriptor] {
    static REGISTRY: OnceLock<Vec<ActionDescriptor>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        ActionKind::ALL
            .into_iter()
            .map(|kind| match kind {
                ActionKind::Log => ActionDescriptor::new(
                    kind,
                    "Log the pub and an optional message",
                    log::config_schema().build(),
                    log::params_schema().build(),
                ),
                ActionKind::Email => ActionDescriptor::new(
                    kind,
                    "Send an email rendered from the pub's values",
                    email::config_schema().build(),
                    email::params_schema().build(),
                ),
                ActionKind::Http => ActionDescriptor::new(
                    kind,
                    "Call an HTTP endpoint with the pub's values",
                    http::config_schema().build(),
                    http::params_schema().build(),
                ),
                ActionKind::Move => ActionDescriptor::new(
                    kind,
                    "Move the pub to another stage",
                    move_pub::config_schema().build(),
                    move_pub::params_schema().build(),
                ),
                ActionKind::Pdf => ActionDescriptor::new(
                    kind,
                    "Render the pub as a PDF",
                    pdf::config_schema().build(),
                    pdf::params_schema().build(),
                ),
                ActionKind::PushToV6 => ActionDescriptor::new(
                    kind,
                    "Push the pub to a legacy PubPub v6 community",
                    push_to_v6::config_schema().build(),
                    push_to_v6::params_schema().build(),
                ),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_indexed_by_kind() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.descriptor().kind, kind);
            assert_eq!(kind.descriptor().name, kind.as_str());
        }
    }

    #[test]
    fn wire_names_parse_back() {
        assert_eq!("pushToV6".parse::<ActionKind>().unwrap(), ActionKind::PushToV6);
        assert_eq!(serde_json::to_value(ActionKind::PushToV6).unwrap(), "pushToV6");
        assert_eq!(
            "sms".parse::<ActionKind>().unwrap_err(),
            UnknownActionKind("sms".into())
        );
    }

    #[test]
    fn every_schema_is_an_object_schema() {
        for d in registry() {
            assert_eq!(d.config_schema["type"], "object", "{}", d.name);
            assert_eq!(d.params_schema["type"], "object", "{}", d.name);
        }
    }
}
