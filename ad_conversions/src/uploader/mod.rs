//! Uploader abstraction for offline conversions.
//!
//! [`ConversionUploader`] reports one conversion to an ad platform, either by
//! the click identifier captured with the lead or by hashed customer
//! identifiers. Implementations own the wire format and error mapping.

pub mod errors;
pub mod google_ads;

pub use errors::UploadError;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{
    conversion::{ClickConversion, HashedConversion},
    upload_result::UploadResult,
};

/// Reports offline conversions to an ad platform.
#[async_trait]
pub trait ConversionUploader: Send + Sync {
    /// Upload a single conversion keyed by ad click identifier.
    async fn upload_by_click_identifier(
        &self,
        conversion: &ClickConversion,
    ) -> Result<UploadResult, UploadError>;

    /// Upload a single conversion keyed by hashed phone and/or email.
    ///
    /// `Ok(None)` means nothing usable came back: either no identifier was
    /// supplied (and no request was made) or the platform returned no job.
    async fn upload_by_hashed_identity(
        &self,
        conversion: &HashedConversion,
    ) -> Result<Option<UploadResult>, UploadError>;
}

/// Errors that can occur while constructing an uploader.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UploadInitError {
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

    /// A credential or account id is not a valid header value.
    #[snafu(display("Invalid header value for {header}: {source}"))]
    InvalidHeader {
        header: &'static str,
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },

    /// Required account setting left empty.
    #[snafu(display("Missing ads setting: {name}"))]
    MissingSetting { name: &'static str },
}
