//! `POST /save-chat`: manual chat persistence.
//!
//! Unlike the completion endpoints, storing the row is the whole request,
//! so a store failure is reported to the caller.

use serde_json::{json, Value};

use super::row;
use crate::audit::{AuditBatch, AuditLogger};
use crate::envelope::{as_object, non_empty_str};
use crate::error::PipelineError;

pub const COLLECTION: &str = "chat_history";
pub const PATH: &str = "/save-chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(PipelineError::InvalidField {
                field: "role",
                reason: format!("expected \"user\" or \"assistant\", got {:?}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveChatRequest {
    pub user_id: String,
    pub role: ChatRole,
    pub message: String,
}

impl SaveChatRequest {
    /// All three fields are required; every missing one is reported at once.
    pub fn from_body(body: &Value) -> Result<Self, PipelineError> {
        let map = as_object(body);
        let user_id = non_empty_str(map, "user_id");
        let role = non_empty_str(map, "role");
        let message = non_empty_str(map, "message");

        let mut missing = Vec::new();
        if user_id.is_none() {
            missing.push("user_id");
        }
        if role.is_none() {
            missing.push("role");
        }
        if message.is_none() {
            missing.push("message");
        }
        match (user_id, role, message) {
            (Some(user_id), Some(role), Some(message)) => Ok(Self {
                user_id: user_id.to_string(),
                role: role.parse()?,
                message: message.to_string(),
            }),
            _ => Err(PipelineError::Validation { missing }),
        }
    }

    fn into_batch(self) -> AuditBatch {
        AuditBatch::single(
            COLLECTION,
            row(json!({
                "user_id": self.user_id,
                "role": self.role.as_str(),
                "message": self.message,
            })),
        )
    }
}

/// Validate and store one chat row.
pub async fn save(audit: &AuditLogger, body: &Value) -> Result<(), PipelineError> {
    let request = SaveChatRequest::from_body(body)?;
    audit.write(request.into_batch()).await?;
    Ok(())
}
