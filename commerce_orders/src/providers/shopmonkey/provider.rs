use std::{num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use shared_utils::{env::get_env_var, identity::to_e164};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    models::order::Order,
    providers::{
        ClientBuildSnafu, InvalidApiKeySnafu, MissingEnvVarSnafu, OrderProvider, ProviderError,
        ProviderInitError,
        shopmonkey::{
            params::{ShopmonkeySettings, construct_params},
            response::{
                PageShape, classify_failure, decode_body, discover_token_field, order_from_value,
                token_value,
            },
        },
    },
};

/// Environment variable holding the Shopmonkey API key.
pub const API_KEY_ENV: &str = "SHOPMONKEY_API_KEY";

pub struct ShopmonkeyProvider {
    client: Client,
    settings: ShopmonkeySettings,
    limiter: DefaultDirectRateLimiter,
    _api_key: SecretString,
}

impl ShopmonkeyProvider {
    /// Creates a new Shopmonkey provider from explicit settings and key.
    pub fn new(
        settings: ShopmonkeySettings,
        api_key: SecretString,
    ) -> Result<Self, ProviderInitError> {
        let mut auth = header::HeaderValue::from_str(&format!(
            "Bearer {}",
            api_key.expose_secret()
        ))
        .context(InvalidApiKeySnafu)?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context(ClientBuildSnafu)?;

        let rps = NonZeroU32::new(settings.requests_per_second).unwrap_or(nonzero!(5u32));

        Ok(Self {
            client,
            settings,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            _api_key: api_key,
        })
    }

    /// Creates a provider reading the API key from `SHOPMONKEY_API_KEY`.
    pub fn from_env(settings: ShopmonkeySettings) -> Result<Self, ProviderInitError> {
        let api_key = SecretString::new(get_env_var(API_KEY_ENV).context(MissingEnvVarSnafu)?.into());
        Self::new(settings, api_key)
    }

    /// GET one page, absorbing 429s with a bounded, page-scaled sleep.
    async fn get_page(&self, query: &[(String, String)], page: u32) -> Result<Value, ProviderError> {
        let url = self.settings.orders_url();
        let mut throttled = 0u32;

        loop {
            self.limiter.until_ready().await;
            let response = self.client.get(&url).query(query).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                throttled += 1;
                if throttled > self.settings.max_throttle_retries {
                    return Err(ProviderError::RateLimited {
                        attempts: throttled,
                    });
                }
                let delay = self.settings.throttle_delay(page);
                warn!(
                    page,
                    attempt = throttled,
                    delay_ms = delay.as_millis() as u64,
                    "commerce API throttled; backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = response.text().await?;

            if !status.is_success() {
                return Err(classify_failure(status.as_u16(), &content_type, &body));
            }
            return Ok(decode_body(&body));
        }
    }
}

#[async_trait]
impl OrderProvider for ShopmonkeyProvider {
    async fn fetch_orders_by_contact(&self, phone: &str) -> Result<Vec<Order>, ProviderError> {
        let Some(phone_e164) = to_e164(phone) else {
            debug!("no usable phone number; skipping order lookup");
            return Ok(Vec::new());
        };

        let mut orders = Vec::new();
        let mut token_field: Option<&'static str> = None;
        let mut page_token: Option<String> = None;
        let mut page: u32 = 0;

        loop {
            let query = construct_params(&self.settings, &phone_e164, page_token.as_deref());
            let payload = self.get_page(&query, page).await?;

            orders.extend(
                PageShape::of(&payload)
                    .into_items()
                    .into_iter()
                    .filter_map(order_from_value),
            );

            if token_field.is_none() {
                token_field = discover_token_field(&payload);
            }
            page_token = token_field.and_then(|f| token_value(&payload, f));
            if page_token.is_none() {
                break;
            }

            page += 1;
            if page >= self.settings.max_pages {
                warn!(
                    max_pages = self.settings.max_pages,
                    "order lookup hit the page cap; remaining pages ignored"
                );
                break;
            }
        }

        debug!(pages = page + 1, orders = orders.len(), "order lookup finished");
        Ok(orders)
    }
}
