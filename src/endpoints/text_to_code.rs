use serde_json::json;

use super::{row, Endpoint};
use crate::audit::AuditBatch;
use crate::envelope::Envelope;
use crate::interpret::{Interpretation, OutputMode};

pub const COLLECTION: &str = "code_generation_logs";

const INSTRUCTION: &str = "\
You turn natural-language descriptions into working code.
Return only the code. No explanations, no markdown fences.";

/// `POST /text-to-code`
#[derive(Default)]
pub struct TextToCode;

impl Endpoint for TextToCode {
    fn name(&self) -> &'static str {
        "text_to_code"
    }

    fn path(&self) -> &'static str {
        "/text-to-code"
    }

    fn text_fields(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn system_instruction(&self) -> Option<&'static str> {
        Some(INSTRUCTION)
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Plain {
            fallback: "No code generated",
        }
    }

    fn response_key(&self) -> &'static str {
        "code"
    }

    fn audit(&self, envelope: &Envelope, result: &Interpretation) -> Option<AuditBatch> {
        Some(AuditBatch::single(
            COLLECTION,
            row(json!({
                "user_id": envelope.user_id,
                "prompt": envelope.text,
                "code": result.to_audit_text(),
                "ip_address": envelope.ip_address,
            })),
        ))
    }
}
