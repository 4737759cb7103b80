use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire shape of a validation response. `status` drives the outcome; every
/// other field is display data the endpoint may or may not send. Unknown
/// fields are preserved in `extra` and passed through opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a single validation attempt. Produced once per call; never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Confirmed(ValidationResponse),
    Denied { reason: Option<String> },
    /// The response parsed but its shape is not one we recognize.
    Malformed,
    /// Timeout, abort, bad status, or transport failure.
    NetworkFailure(String),
}

impl ValidationOutcome {
    /// Map a parsed response onto an outcome by its `status` field.
    pub fn from_response(response: ValidationResponse) -> Self {
        match response.status.as_str() {
            "confirmed" => Self::Confirmed(response),
            "denied" => Self::Denied {
                reason: response.reason,
            },
            _ => Self::Malformed,
        }
    }
}
