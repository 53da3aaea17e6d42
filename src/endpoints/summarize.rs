use serde_json::json;

use super::{row, Endpoint};
use crate::audit::AuditBatch;
use crate::envelope::Envelope;
use crate::interpret::{Interpretation, OutputMode};

pub const COLLECTION: &str = "summary_logs";

/// `POST /summarize`
///
/// Sends no system instruction; the request is a single user message that
/// embeds the text after a fixed lead-in.
#[derive(Default)]
pub struct Summarizer;

impl Endpoint for Summarizer {
    fn name(&self) -> &'static str {
        "summarize"
    }

    fn path(&self) -> &'static str {
        "/summarize"
    }

    fn text_fields(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn system_instruction(&self) -> Option<&'static str> {
        None
    }

    fn user_content(&self, envelope: &Envelope) -> String {
        format!("Summarize the following text concisely:\n\n{}", envelope.text)
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Plain {
            fallback: "No summary",
        }
    }

    fn response_key(&self) -> &'static str {
        "summary"
    }

    fn audit(&self, envelope: &Envelope, result: &Interpretation) -> Option<AuditBatch> {
        Some(AuditBatch::single(
            COLLECTION,
            row(json!({
                "user_id": envelope.user_id,
                "text": envelope.text,
                "summary": result.to_audit_text(),
                "ip_address": envelope.ip_address,
            })),
        ))
    }
}
