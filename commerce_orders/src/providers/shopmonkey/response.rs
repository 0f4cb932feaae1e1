//! Parsing of Shopmonkey list responses.
//!
//! The API has shipped several envelope shapes. Items may sit under `data`,
//! `orders` or `items`, or the body may be a bare array; the continuation token
//! may be spelled `next`, `nextPageToken` or `pageToken`. Shapes are tried in
//! that fixed order. Anything unrecognised is logged as malformed upstream data
//! and read as "no items" instead of failing the lookup.

use serde_json::{Map, Value};
use tracing::warn;

use crate::models::order::Order;
use crate::providers::ProviderError;

/// Envelope keys that may hold the item list, in priority order.
pub const LIST_FIELDS: [&str; 3] = ["data", "orders", "items"];

/// Continuation token spellings, in priority order.
pub const TOKEN_FIELDS: [&str; 3] = ["next", "nextPageToken", "pageToken"];

/// Markers that identify a bot-protection challenge page.
const BOT_MARKERS: [&str; 4] = ["cloudflare", "<html", "cf-chl", "captcha"];

/// Maximum body length kept in error messages.
const BODY_SNIPPET_CHARS: usize = 500;

/// Where the items of one page were found.
#[derive(Debug, PartialEq)]
pub enum PageShape {
    /// Items under one of [`LIST_FIELDS`].
    Keyed {
        /// The envelope key that matched.
        field: &'static str,
        /// The raw items.
        items: Vec<Value>,
    },
    /// The body itself is the list.
    Bare(Vec<Value>),
    /// Nothing list-shaped.
    Empty,
}

impl PageShape {
    /// Inspect a decoded body.
    pub fn of(payload: &Value) -> Self {
        match payload {
            Value::Array(items) => Self::Bare(items.clone()),
            Value::Object(map) => LIST_FIELDS
                .iter()
                .copied()
                .find_map(|field| match map.get(field) {
                    Some(Value::Array(items)) if !items.is_empty() => Some(Self::Keyed {
                        field,
                        items: items.clone(),
                    }),
                    _ => None,
                })
                .unwrap_or(Self::Empty),
            _ => Self::Empty,
        }
    }

    /// The raw items, empty for [`PageShape::Empty`].
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Keyed { items, .. } | Self::Bare(items) => items,
            Self::Empty => Vec::new(),
        }
    }
}

/// Decode a response body; non-JSON is malformed upstream data and reads as `Null`.
pub fn decode_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| {
        warn!(kind = "malformed_upstream", error = %e, "commerce API body is not JSON");
        Value::Null
    })
}

/// The token field present in `payload`, checked in [`TOKEN_FIELDS`] order.
///
/// Presence of the key counts even when its value is null; the spelling is
/// fixed for the rest of the lookup once discovered.
pub fn discover_token_field(payload: &Value) -> Option<&'static str> {
    let map = payload.as_object()?;
    TOKEN_FIELDS.iter().copied().find(|f| map.contains_key(*f))
}

/// Non-empty continuation token under `field`.
pub fn token_value(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert one raw item into an [`Order`].
///
/// Non-object items and items without an `id` are skipped: an order that
/// cannot be told apart from others cannot be reported exactly once.
pub fn order_from_value(item: Value) -> Option<Order> {
    let Value::Object(map) = &item else {
        warn!(kind = "malformed_upstream", "order item is not an object; skipping");
        return None;
    };

    let id = match map.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            warn!(kind = "malformed_upstream", "order item has no id; skipping");
            return None;
        }
    };

    let total_cents = ["totalCostCents", "total_cents", "totalCents"]
        .iter()
        .find_map(|k| map.get(*k))
        .map(cents_from_value)
        .unwrap_or(0);

    let completed_at = ["completedAt", "completed_at"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::to_string);

    Some(Order {
        id,
        total_cents,
        archived: flag(map, "archived"),
        paid: flag(map, "paid"),
        invoiced: flag(map, "invoiced"),
        completed_at,
        raw: item,
    })
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

// Integers, integral floats and numeric strings; everything else is 0.
fn cents_from_value(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

/// True for a 403 challenge page served by bot protection.
pub fn is_bot_protection_page(status: u16, content_type: &str, body: &str) -> bool {
    if status != 403 || !content_type.to_ascii_lowercase().contains("text/html") {
        return false;
    }
    let head: String = body.chars().take(300).collect::<String>().to_lowercase();
    BOT_MARKERS.iter().any(|m| head.contains(m))
}

/// Classify a non-success, non-429 answer.
pub fn classify_failure(status: u16, content_type: &str, body: &str) -> ProviderError {
    if is_bot_protection_page(status, content_type, body) {
        return ProviderError::Blocked { status };
    }
    match status {
        401 | 403 => ProviderError::Unauthorized { status },
        500..=599 => ProviderError::Transient(format!("HTTP {status}")),
        _ => ProviderError::Status {
            status,
            body: body.chars().take(BODY_SNIPPET_CHARS).collect(),
        },
    }
}
