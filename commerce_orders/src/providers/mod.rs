//! Provider abstraction for commerce order sources.
//!
//! This module defines the [`OrderProvider`] trait, the unified interface for
//! looking up the orders placed by one customer contact. Each concrete commerce
//! backend implements it and owns its vendor-specific paging, throttling and
//! error classification.
//!
//! The trait is async and object safe, so callers can hold an
//! `Arc<dyn OrderProvider>` chosen at startup.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use commerce_orders::models::order::Order;
//! use commerce_orders::providers::{OrderProvider, ProviderError};
//!
//! struct NoOrders;
//!
//! #[async_trait]
//! impl OrderProvider for NoOrders {
//!     async fn fetch_orders_by_contact(&self, _phone: &str) -> Result<Vec<Order>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod errors;
pub mod shopmonkey;

pub use errors::ProviderError;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::order::Order;

/// Looks up the orders associated with a customer's phone number.
#[async_trait]
pub trait OrderProvider: Send + Sync {
    /// Fetches every order tied to `phone`, across all pages.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Order>)` - possibly empty; unusable phone numbers yield an
    ///   empty list without any request.
    /// * `Err(ProviderError)` - classified failure, see [`ProviderError`].
    async fn fetch_orders_by_contact(&self, phone: &str) -> Result<Vec<Order>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API key contains invalid characters.
    #[snafu(display("Invalid API key format: {source}"))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    struct Fixed(Vec<Order>);
    struct Down;

    #[async_trait]
    impl OrderProvider for Fixed {
        async fn fetch_orders_by_contact(&self, _phone: &str) -> Result<Vec<Order>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[async_trait]
    impl OrderProvider for Down {
        async fn fetch_orders_by_contact(&self, _phone: &str) -> Result<Vec<Order>, ProviderError> {
            Err(ProviderError::Transient("connection refused".into()))
        }
    }

    // Chosen at runtime; only works through `dyn OrderProvider`.
    fn pick(name: &str) -> Arc<dyn OrderProvider> {
        if name == "down" {
            Arc::new(Down)
        } else {
            Arc::new(Fixed(vec![Order {
                id: "o-1".into(),
                total_cents: 1500,
                archived: false,
                paid: true,
                invoiced: false,
                completed_at: None,
                raw: serde_json::json!({"id": "o-1"}),
            }]))
        }
    }

    #[tokio::test]
    async fn providers_are_usable_as_trait_objects() {
        let orders = pick("fixed")
            .fetch_orders_by_contact("5551234567")
            .await
            .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, "o-1");

        let err = pick("down")
            .fetch_orders_by_contact("5551234567")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
