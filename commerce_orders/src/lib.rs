//! Client side of the commerce system: order lookup by customer contact.
//!
//! - [`models`]: the vendor-agnostic [`models::order::Order`] snapshot.
//! - [`providers`]: the [`providers::OrderProvider`] trait and its REST
//!   implementation for the Shopmonkey API.

pub mod models;
pub mod providers;
