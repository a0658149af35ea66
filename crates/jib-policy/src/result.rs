use serde::Serialize;
use serde_json::{json, Value};

/// Public struct `PolicyResult` used across Jib policy checks.
///
/// A decision is immutable once constructed: `allowed` carries the verdict,
/// `reason` a human-readable explanation, and `details` optional structured
/// context for the caller (never for enforcement).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyResult {
    pub allowed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl PolicyResult {
    /// Builds an allow decision with `reason`.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            details: None,
        }
    }

    /// Builds an allow decision carrying structured `details`.
    pub fn allow_with_details(reason: impl Into<String>, details: Value) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            details: Some(details),
        }
    }

    /// Builds a deny decision with `reason`.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            details: None,
        }
    }

    /// Builds a deny decision carrying structured `details`.
    pub fn deny_with_details(reason: impl Into<String>, details: Value) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            details: Some(details),
        }
    }

    /// Projects the decision into the JSON shape embedded in API responses.
    pub fn to_json(&self) -> Value {
        json!({
            "allowed": self.allowed,
            "reason": self.reason,
            "details": self.details.clone().unwrap_or(Value::Null),
        })
    }
}
