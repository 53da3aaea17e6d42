//! The request handler pipeline.
//!
//! One request runs four stages in order: validate the body into an
//! [`Envelope`], call the completion service once, interpret the content,
//! then record the audit batch. Validation and upstream failures abort the
//! request; audit failures are carried in the output and never abort it.

use std::sync::Arc;

use serde_json::Value;

use crate::audit::{AuditLogger, AuditOutcome};
use crate::completion::{ChatMessage, CompletionRequest, CompletionService, ResponseFormat};
use crate::endpoints::Endpoint;
use crate::envelope::Envelope;
use crate::error::PipelineError;
use crate::interpret::{interpret, Interpretation, OutputMode};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub result: Interpretation,
    pub audit: AuditOutcome,
}

#[derive(Clone)]
pub struct Pipeline {
    completion: Arc<dyn CompletionService>,
    audit: AuditLogger,
}

impl Pipeline {
    pub fn new(completion: Arc<dyn CompletionService>, audit: AuditLogger) -> Self {
        Self { completion, audit }
    }

    pub fn completion_name(&self) -> &str {
        self.completion.name()
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub async fn run(
        &self,
        endpoint: &dyn Endpoint,
        body: &Value,
    ) -> Result<PipelineOutput, PipelineError> {
        let envelope = Envelope::from_body(body, endpoint.text_fields())?;

        let request = build_prompt(endpoint, &envelope);
        let content = self.completion.complete(request).await.map_err(|err| {
            tracing::warn!(endpoint = endpoint.name(), error = %err, "completion failed");
            err
        })?;

        let result = interpret(endpoint.output_mode(), content);

        let audit = self.audit.record(endpoint.audit(&envelope, &result)).await;
        Ok(PipelineOutput { result, audit })
    }
}

/// Fill the endpoint's fixed template with the request input.
pub fn build_prompt(endpoint: &dyn Endpoint, envelope: &Envelope) -> CompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(instruction) = endpoint.system_instruction() {
        messages.push(ChatMessage::system(instruction));
    }
    messages.push(ChatMessage::user(endpoint.user_content(envelope)));
    let response_format = match endpoint.output_mode() {
        OutputMode::Verdict => ResponseFormat::JsonObject,
        OutputMode::Plain { .. } => ResponseFormat::Text,
    };
    CompletionRequest {
        messages,
        response_format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Role;
    use crate::endpoints::{extract::CodeExtractor, scam::ScamAnalyzer, summarize::Summarizer};
    use crate::error::{PersistenceError, UpstreamError};
    use crate::store::{Row, RowStore};
    use serde_json::json;

    struct Echo;

    #[async_trait::async_trait]
    impl CompletionService for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
            Ok(request.messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl RowStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }
        async fn insert_rows(&self, _collection: &str, _rows: Vec<Row>) -> Result<(), PersistenceError> {
            Err(PersistenceError::new("timeout"))
        }
    }

    fn envelope(text: &str) -> Envelope {
        Envelope {
            text: text.into(),
            user_id: "anonymous_user".into(),
            ip_address: "0.0.0.0".into(),
            identified: false,
        }
    }

    #[test]
    fn structured_endpoint_requests_json_object() {
        let req = build_prompt(&ScamAnalyzer, &envelope("win a prize"));
        assert_eq!(req.response_format, ResponseFormat::JsonObject);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].content, "win a prize");
    }

    #[test]
    fn plain_endpoint_carries_input_verbatim() {
        let req = build_prompt(&CodeExtractor, &envelope("see `let x = 1;`\n"));
        assert_eq!(req.response_format, ResponseFormat::Text);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.messages[1].content, "see `let x = 1;`\n");
    }

    #[test]
    fn single_message_template_embeds_input() {
        let req = build_prompt(&Summarizer, &envelope("long text"));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert!(req.messages[0].content.ends_with("long text"));
    }

    #[tokio::test]
    async fn lost_audit_is_reported_once_in_the_output() {
        let audit = AuditLogger::new(Arc::new(DownStore));
        let pipeline = Pipeline::new(Arc::new(Echo), audit);

        let out = pipeline
            .run(&Summarizer, &json!({"text": "keep this short"}))
            .await
            .unwrap();

        assert!(out.result.to_audit_text().ends_with("keep this short"));
        assert_eq!(
            out.audit,
            AuditOutcome::Failed {
                collection: "summary_logs",
                error: "timeout".into()
            }
        );
        assert_eq!(pipeline.audit().write_failures_total(), 1);
    }
}
