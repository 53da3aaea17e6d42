//! Response interpretation.
//!
//! Turns raw completion content into what the endpoint returns. Nothing in
//! here can fail: empty plain content falls back to an endpoint string and
//! unparseable structured content degrades to [`Verdict::unknown`].

use serde::Serialize;
use serde_json::{Number, Value};

pub const NON_JSON_REASON: &str = "Model returned non-JSON response.";
pub const MISSING_REASON: &str = "No reason available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Scam,
    Safe,
    Unknown,
}

impl Label {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "scam" => Label::Scam,
            "safe" => Label::Safe,
            _ => Label::Unknown,
        }
    }
}

/// Structured scam classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub label: Label,
    /// 0 to 100. Kept as a JSON number so integral model output stays integral.
    pub confidence: Number,
    pub reason: String,
}

impl Verdict {
    pub fn unknown() -> Self {
        Self {
            label: Label::Unknown,
            confidence: Number::from(0),
            reason: NON_JSON_REASON.to_string(),
        }
    }

    pub fn is_scam(&self) -> bool {
        self.label == Label::Scam
    }
}

/// The interpreted result of one completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Text(String),
    Verdict(Verdict),
}

impl Interpretation {
    pub fn to_json(&self) -> Value {
        match self {
            Interpretation::Text(s) => Value::String(s.clone()),
            Interpretation::Verdict(v) => serde_json::to_value(v).unwrap_or(Value::Null),
        }
    }

    /// Text form written to audit rows: the string itself, or the verdict as
    /// compact JSON.
    pub fn to_audit_text(&self) -> String {
        match self {
            Interpretation::Text(s) => s.clone(),
            Interpretation::Verdict(v) => serde_json::to_string(v).unwrap_or_default(),
        }
    }

    pub fn as_verdict(&self) -> Option<&Verdict> {
        match self {
            Interpretation::Verdict(v) => Some(v),
            Interpretation::Text(_) => None,
        }
    }
}

/// How an endpoint wants its completion content read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Free text; empty content becomes `fallback`.
    Plain { fallback: &'static str },
    /// JSON object with `label`, `confidence`, `reason`.
    Verdict,
}

pub fn interpret(mode: OutputMode, content: String) -> Interpretation {
    match mode {
        OutputMode::Plain { fallback } => Interpretation::Text(interpret_plain(content, fallback)),
        OutputMode::Verdict => Interpretation::Verdict(interpret_verdict(&content)),
    }
}

pub fn interpret_plain(content: String, fallback: &str) -> String {
    if content.is_empty() {
        fallback.to_string()
    } else {
        content
    }
}

pub fn interpret_verdict(content: &str) -> Verdict {
    let obj = match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) | Err(_) => {
            tracing::debug!(len = content.len(), "structured completion was not a JSON object");
            return Verdict::unknown();
        }
    };

    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .map(Label::parse)
        .unwrap_or(Label::Unknown);
    let confidence = obj
        .get("confidence")
        .and_then(|v| match v {
            Value::Number(n) => Some(clamp_confidence(n)),
            _ => None,
        })
        .unwrap_or_else(|| Number::from(0));
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or(MISSING_REASON)
        .to_string();

    Verdict {
        label,
        confidence,
        reason,
    }
}

fn clamp_confidence(n: &Number) -> Number {
    match n.as_f64() {
        Some(f) if f < 0.0 => Number::from(0),
        Some(f) if f > 100.0 => Number::from(100),
        _ => n.clone(),
    }
}
