use serde_json::json;

use super::{row, Endpoint};
use crate::audit::AuditBatch;
use crate::envelope::Envelope;
use crate::interpret::{Interpretation, OutputMode};

pub const COLLECTION: &str = "code_extraction_logs";

/// Literal the model is told to answer with when the input holds no code.
pub const NO_CODE_FOUND: &str = "No code found.";

const INSTRUCTION: &str = "\
You are a strict CODE extractor.
Rules:
- Only extract code.
- No extra text.
- No new code.
- If no code found, return exactly: \"No code found.\"";

/// `POST /extract-code`: pull code fragments out of mixed text.
#[derive(Default)]
pub struct CodeExtractor;

impl Endpoint for CodeExtractor {
    fn name(&self) -> &'static str {
        "extract_code"
    }

    fn path(&self) -> &'static str {
        "/extract-code"
    }

    fn text_fields(&self) -> &'static [&'static str] {
        &["input_text", "input"]
    }

    fn system_instruction(&self) -> Option<&'static str> {
        Some(INSTRUCTION)
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Plain {
            fallback: "No code found",
        }
    }

    fn response_key(&self) -> &'static str {
        "extracted_code"
    }

    fn audit(&self, envelope: &Envelope, result: &Interpretation) -> Option<AuditBatch> {
        Some(AuditBatch::single(
            COLLECTION,
            row(json!({
                "user_id": envelope.user_id,
                "input_text": envelope.text,
                "extracted_code": result.to_audit_text(),
                "ip_address": envelope.ip_address,
            })),
        ))
    }
}
