//! Endpoint definitions.
//!
//! Every completion-backed route is one [`Endpoint`]: it names the body
//! field it reads, the fixed instruction it sends upstream, how the answer
//! is interpreted, the key it is returned under and the audit rows it
//! leaves behind. The generic [`crate::pipeline::Pipeline`] does the rest.
//! `save-chat` has no completion stage and lives in [`save_chat`].

use std::sync::Arc;

use serde_json::Value;

use crate::audit::AuditBatch;
use crate::envelope::Envelope;
use crate::interpret::{Interpretation, OutputMode};
use crate::store::Row;

pub mod chatbot;
pub mod extract;
pub mod save_chat;
pub mod scam;
pub mod summarize;
pub mod text_to_code;

use self::chatbot::Chatbot;
use self::extract::CodeExtractor;
use self::scam::ScamAnalyzer;
use self::summarize::Summarizer;
use self::text_to_code::TextToCode;

/// Name under which the manual chat-save route is enabled.
pub const SAVE_CHAT: &str = "save_chat";

pub trait Endpoint: Send + Sync {
    /// Stable identifier used in configuration, metrics and telemetry.
    fn name(&self) -> &'static str;
    fn path(&self) -> &'static str;
    /// Accepted names of the primary text field, most preferred first.
    fn text_fields(&self) -> &'static [&'static str];
    /// Fixed system instruction, if the endpoint sends one.
    fn system_instruction(&self) -> Option<&'static str>;
    /// User-role message content. Defaults to the input verbatim.
    fn user_content(&self, envelope: &Envelope) -> String {
        envelope.text.clone()
    }
    fn output_mode(&self) -> OutputMode;
    /// Key of the success body that carries the result.
    fn response_key(&self) -> &'static str;
    /// Rows describing this interaction, or `None` when nothing is recorded.
    fn audit(&self, envelope: &Envelope, result: &Interpretation) -> Option<AuditBatch>;
}

/// All endpoint names in routing order.
pub fn default_order() -> Vec<String> {
    [
        "analyze_scam",
        "extract_code",
        "chatbot",
        "text_to_code",
        "summarize",
        SAVE_CHAT,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Parse `PROMPTRELAY_ENDPOINTS`. Unset or blank means every endpoint.
/// Names are trimmed and lower-cased; dashes are accepted in place of
/// underscores.
pub fn parse_endpoint_order() -> Vec<String> {
    match std::env::var("PROMPTRELAY_ENDPOINTS") {
        Ok(var) if !var.trim().is_empty() => var
            .split(',')
            .map(|s| s.trim().to_lowercase().replace('-', "_"))
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default_order(),
    }
}

/// Map configured names to endpoint implementations. Unknown names are
/// skipped with a warning; `save_chat` is not a completion endpoint and is
/// ignored here.
pub fn build(order: &[String]) -> Vec<Arc<dyn Endpoint>> {
    let mut endpoints: Vec<Arc<dyn Endpoint>> = Vec::new();
    for name in order {
        match name.as_str() {
            "analyze_scam" => endpoints.push(Arc::new(ScamAnalyzer)),
            "extract_code" => endpoints.push(Arc::new(CodeExtractor)),
            "chatbot" => endpoints.push(Arc::new(Chatbot)),
            "text_to_code" => endpoints.push(Arc::new(TextToCode)),
            "summarize" => endpoints.push(Arc::new(Summarizer)),
            SAVE_CHAT => {}
            other => tracing::warn!(endpoint = %other, "unknown endpoint name, skipping"),
        }
    }
    endpoints
}

pub(crate) fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}
