//! `email`: send a templated message through the notifier.

use schemas::{CoreSchemaType, ObjectSchema};
use serde_json::{json, Value};

use crate::traits::OutgoingEmail;
use crate::{template, ActionContext, ActionError};

pub fn config_schema() -> ObjectSchema {
    ObjectSchema::new()
        .required("recipient", CoreSchemaType::Email, "Address to send to")
        .required("subject", CoreSchemaType::String, "Subject line; supports {{placeholders}}")
        .required("body", CoreSchemaType::String, "Message body; supports {{placeholders}}")
}

pub fn params_schema() -> ObjectSchema {
    ObjectSchema::new()
        .optional("recipient", CoreSchemaType::Email, "")
        .optional("subject", CoreSchemaType::String, "")
        .optional("body", CoreSchemaType::String, "")
}

pub async fn run(ctx: &ActionContext) -> Result<Value, ActionError> {
    let to = ctx.require_str("recipient")?.to_owned();
    let subject = template::render(ctx.require_str("subject")?, ctx);
    let body = template::render(ctx.require_str("body")?, ctx);

    ctx.services
        .notifier
        .send_email(OutgoingEmail {
            to: to.clone(),
            subject: subject.clone(),
            body,
            idempotency_key: ctx.dedup_key.clone(),
        })
        .await?;

    Ok(json!({ "recipient": to, "subject": subject }))
}
