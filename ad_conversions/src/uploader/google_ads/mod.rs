//! Google Ads REST uploader.

pub mod client;
pub mod params;
pub mod request;
pub mod response;

pub use client::GoogleAdsClient;
pub use params::GoogleAdsSettings;
