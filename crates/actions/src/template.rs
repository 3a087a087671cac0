//! `{{placeholder}}` expansion for user-authored action text.
//!
//! Supported placeholders:
//! - `{{pub.id}}`
//! - `{{pub.values.<slug>}}`
//! - `{{action.name}}`
//!
//! Unknown placeholders are left untouched.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::ActionContext;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Expand the placeholders in `template` from `ctx`.
pub fn render(template: &str, ctx: &ActionContext) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| {
            lookup(&caps[1], ctx).unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

fn lookup(path: &str, ctx: &ActionContext) -> Option<String> {
    match path {
        "pub.id" => Some(ctx.pub_row.id.to_string()),
        "action.name" => Some(ctx.action_instance_name.clone()),
        _ => {
            let slug = path.strip_prefix("pub.values.")?;
            ctx.pub_row.values.get(slug).map(display_value)
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
