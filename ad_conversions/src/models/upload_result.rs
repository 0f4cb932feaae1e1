use serde_json::{Value, json};

/// Structured outcome of an accepted upload request.
///
/// A partial failure is data: the batch was accepted and the platform reported
/// per-item problems in `partial_failure`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResult {
    /// One entry per submitted item, in request order.
    pub items: Vec<Value>,
    /// Batch-level partial failure status, if any.
    pub partial_failure: Option<Value>,
    /// The full platform response(s).
    pub raw: Value,
    /// The request only asked the platform to validate; nothing was recorded.
    pub validate_only: bool,
}

impl UploadResult {
    /// An item counts as successful when the platform echoed a non-empty object.
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.as_object().is_some_and(|m| !m.is_empty()))
            .count()
    }

    /// Human-readable partial failure message.
    pub fn partial_failure_message(&self) -> Option<&str> {
        self.partial_failure
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(Value::as_str)
    }

    /// JSON stored in the conversion ledger.
    pub fn to_ledger_json(&self) -> Value {
        json!({
            "succeeded": self.succeeded(),
            "items": self.items,
            "partial_failure": self.partial_failure,
            "raw": self.raw,
            "validate_only": self.validate_only,
        })
    }
}
