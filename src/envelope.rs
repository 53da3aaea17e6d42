//! Input validation and defaulting.
//!
//! Request bodies arrive as untyped JSON. Only presence and emptiness are
//! checked; accepted values are copied through unchanged (no trimming, no
//! case folding).

use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Stored in place of a missing `user_id`. Carries no identity meaning.
pub const ANONYMOUS_USER: &str = "anonymous_user";
/// Stored in place of a missing `ip_address`.
pub const UNKNOWN_IP: &str = "0.0.0.0";

/// Normalized, defaulted view of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The primary text the endpoint works on.
    pub text: String,
    pub user_id: String,
    pub ip_address: String,
    /// True when the caller supplied its own `user_id`.
    pub identified: bool,
}

impl Envelope {
    /// Build an envelope from a request body.
    ///
    /// `text_fields` lists the accepted names for the primary field, most
    /// preferred first; the first one is reported when none is usable.
    pub fn from_body(body: &Value, text_fields: &[&'static str]) -> Result<Self, PipelineError> {
        let canonical = text_fields.first().copied().unwrap_or("message");
        let map = as_object(body);
        let text = text_fields
            .iter()
            .find_map(|field| non_empty_str(map, field))
            .ok_or_else(|| PipelineError::missing(canonical))?;

        let supplied_user = non_empty_str(map, "user_id");
        Ok(Self {
            text: text.to_string(),
            user_id: supplied_user.unwrap_or(ANONYMOUS_USER).to_string(),
            ip_address: non_empty_str(map, "ip_address")
                .unwrap_or(UNKNOWN_IP)
                .to_string(),
            identified: supplied_user.is_some(),
        })
    }
}

/// Treat anything other than a JSON object as an empty mapping.
pub fn as_object(body: &Value) -> Option<&Map<String, Value>> {
    body.as_object()
}

/// A string field that is present and not empty. `null`, numbers and other
/// non-string values count as absent.
pub fn non_empty_str<'a>(map: Option<&'a Map<String, Value>>, field: &str) -> Option<&'a str> {
    map?.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
