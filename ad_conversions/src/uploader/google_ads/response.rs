//! Parsing of upload responses and error bodies.

use serde_json::Value;
use tracing::warn;

use crate::models::upload_result::UploadResult;
use crate::uploader::UploadError;

const MESSAGE_CHARS: usize = 500;

/// Decode a success body. Non-JSON reads as `Null` and is logged.
pub fn decode_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(body).unwrap_or_else(|e| {
        warn!(kind = "malformed_upstream", error = %e, "ads API body is not JSON");
        Value::Null
    })
}

/// Partial failure status, when present and non-empty.
pub fn partial_failure(raw: &Value) -> Option<Value> {
    match raw.get("partialFailureError") {
        Some(Value::Object(m)) if !m.is_empty() => Some(Value::Object(m.clone())),
        _ => None,
    }
}

/// `uploadClickConversions` response into per-item results.
pub fn click_upload_result(raw: Value, validate_only: bool) -> UploadResult {
    let items = raw
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    UploadResult {
        items,
        partial_failure: partial_failure(&raw),
        raw,
        validate_only,
    }
}

/// Job resource name from an `offlineUserDataJobs:create` response.
pub fn job_resource_name(raw: &Value) -> Option<String> {
    raw.get("resourceName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map a non-success answer to [`UploadError::Rejected`].
///
/// The code is the first `errorCode` entry of the failure details
/// (`"<kind>:<value>"`), else the RPC status name. The request id comes from
/// the `request-id` header, else the failure details.
pub fn rejection(status: u16, header_request_id: Option<String>, body: &str) -> UploadError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = parsed.get("error").unwrap_or(&Value::Null);
    let details = error
        .get("details")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let detail_error = details
        .iter()
        .filter_map(|d| d.get("errors").and_then(Value::as_array))
        .flatten()
        .next();

    let code = detail_error
        .and_then(|e| e.get("errorCode"))
        .and_then(Value::as_object)
        .and_then(|m| m.iter().next())
        .map(|(k, v)| match v.as_str() {
            Some(v) => format!("{k}:{v}"),
            None => k.clone(),
        })
        .or_else(|| error.get("status").and_then(Value::as_str).map(str::to_string));

    let message = detail_error
        .and_then(|e| e.get("message"))
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(MESSAGE_CHARS).collect());

    let request_id = header_request_id.filter(|r| !r.is_empty()).or_else(|| {
        details
            .iter()
            .find_map(|d| d.get("requestId").and_then(Value::as_str))
            .map(str::to_string)
    });

    UploadError::Rejected {
        status,
        code,
        message,
        request_id,
    }
}
