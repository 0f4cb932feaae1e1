use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the Shopmonkey order lookup. Secrets are passed separately.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ShopmonkeySettings {
    /// API root, e.g. `https://api.shopmonkey.cloud/v3`.
    pub base_url: String,
    /// Items requested per page (`limit`).
    pub page_size: u32,
    /// Hard cap on pages fetched per lookup.
    pub max_pages: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Client-side pacing of outgoing requests.
    pub requests_per_second: u32,
    /// Sleep before retrying a throttled page: `base + step * page_index`.
    pub throttle_base_ms: u64,
    /// See `throttle_base_ms`.
    pub throttle_step_ms: u64,
    /// Consecutive 429 answers tolerated on one page.
    pub max_throttle_retries: u32,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ShopmonkeySettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.shopmonkey.cloud/v3".into(),
            page_size: 100,
            max_pages: 50,
            timeout_secs: 20,
            requests_per_second: 5,
            throttle_base_ms: 2_000,
            throttle_step_ms: 1_000,
            max_throttle_retries: 5,
            user_agent: "leadbridge/1.0".into(),
        }
    }
}

impl ShopmonkeySettings {
    /// Backoff applied to a 429 on the zero-based `page`.
    pub fn throttle_delay(&self, page: u32) -> Duration {
        Duration::from_millis(
            self.throttle_base_ms
                .saturating_add(self.throttle_step_ms.saturating_mul(u64::from(page))),
        )
    }

    pub(crate) fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url.trim_end_matches('/'))
    }
}

/// Query string for one page of the orders listing.
pub(crate) fn construct_params(
    settings: &ShopmonkeySettings,
    phone_e164: &str,
    page_token: Option<&str>,
) -> Vec<(String, String)> {
    let mut query = vec![
        ("customerPhone".to_string(), phone_e164.to_string()),
        ("limit".to_string(), settings.page_size.to_string()),
    ];
    if let Some(token) = page_token {
        query.push(("pageToken".to_string(), token.to_string()));
    }
    query
}
