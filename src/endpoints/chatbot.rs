use serde_json::json;

use super::save_chat::{ChatRole, COLLECTION};
use super::{row, Endpoint};
use crate::audit::AuditBatch;
use crate::envelope::Envelope;
use crate::interpret::{Interpretation, OutputMode};

const INSTRUCTION: &str = "You are a helpful assistant. Answer clearly and concisely.";

/// `POST /chatbot`: single-turn chat.
///
/// When the caller identifies itself with a `user_id`, the exchange is kept
/// in `chat_history` as a user row followed by an assistant row, sent in one
/// insert. Anonymous exchanges are not recorded.
#[derive(Default)]
pub struct Chatbot;

impl Endpoint for Chatbot {
    fn name(&self) -> &'static str {
        "chatbot"
    }

    fn path(&self) -> &'static str {
        "/chatbot"
    }

    fn text_fields(&self) -> &'static [&'static str] {
        &["message"]
    }

    fn system_instruction(&self) -> Option<&'static str> {
        Some(INSTRUCTION)
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Plain { fallback: "No reply" }
    }

    fn response_key(&self) -> &'static str {
        "reply"
    }

    fn audit(&self, envelope: &Envelope, result: &Interpretation) -> Option<AuditBatch> {
        if !envelope.identified {
            return None;
        }
        Some(AuditBatch {
            collection: COLLECTION,
            rows: vec![
                row(json!({
                    "user_id": envelope.user_id,
                    "role": ChatRole::User.as_str(),
                    "message": envelope.text,
                })),
                row(json!({
                    "user_id": envelope.user_id,
                    "role": ChatRole::Assistant.as_str(),
                    "message": result.to_audit_text(),
                })),
            ],
        })
    }
}
