use serde_json::json;

use super::{row, Endpoint};
use crate::audit::AuditBatch;
use crate::envelope::Envelope;
use crate::interpret::{Interpretation, OutputMode};

pub const COLLECTION: &str = "scam_detection_logs";

const INSTRUCTION: &str = "\
You analyze messages for scam risk (phishing, fraud, impersonation, advance-fee, \
gift-card or crypto payment requests, fake urgency).
Respond with a JSON object and nothing else, using exactly these keys:
- \"label\": \"scam\" or \"safe\"
- \"confidence\": a number from 0 to 100
- \"reason\": one short sentence explaining the decision";

/// `POST /analyze-scam`: structured scam classification.
///
/// Rows are flagged only when the verdict label is `scam`.
#[derive(Default)]
pub struct ScamAnalyzer;

impl Endpoint for ScamAnalyzer {
    fn name(&self) -> &'static str {
        "analyze_scam"
    }

    fn path(&self) -> &'static str {
        "/analyze-scam"
    }

    fn text_fields(&self) -> &'static [&'static str] {
        &["message"]
    }

    fn system_instruction(&self) -> Option<&'static str> {
        Some(INSTRUCTION)
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Verdict
    }

    fn response_key(&self) -> &'static str {
        "result"
    }

    fn audit(&self, envelope: &Envelope, result: &Interpretation) -> Option<AuditBatch> {
        let is_flagged = result.as_verdict().map(|v| v.is_scam()).unwrap_or(false);
        Some(AuditBatch::single(
            COLLECTION,
            row(json!({
                "user_id": envelope.user_id,
                "message": envelope.text,
                "scan_result": result.to_audit_text(),
                "ip_address": envelope.ip_address,
                "is_flagged": is_flagged,
            })),
        ))
    }
}
