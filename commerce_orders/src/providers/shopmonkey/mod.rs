//! Shopmonkey REST provider.

pub mod params;
pub mod provider;
pub mod response;

pub use params::ShopmonkeySettings;
pub use provider::ShopmonkeyProvider;
