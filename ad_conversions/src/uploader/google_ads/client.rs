use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use shared_utils::env::get_env_var;
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    models::{
        conversion::{ClickConversion, HashedConversion},
        upload_result::UploadResult,
    },
    uploader::{
        ClientBuildSnafu, ConversionUploader, InvalidHeaderSnafu, MissingEnvVarSnafu,
        MissingSettingSnafu, UploadError, UploadInitError,
        google_ads::{
            params::GoogleAdsSettings,
            request::{add_operations_body, click_conversion_body, create_job_body},
            response::{click_upload_result, decode_body, job_resource_name, partial_failure, rejection},
        },
    },
};

/// Environment variable holding the developer token.
pub const DEVELOPER_TOKEN_ENV: &str = "GOOGLE_ADS_DEVELOPER_TOKEN";
/// Environment variable holding the OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_ADS_ACCESS_TOKEN";

pub struct GoogleAdsClient {
    client: Client,
    settings: GoogleAdsSettings,
    _developer_token: SecretString,
    _access_token: SecretString,
}

fn sensitive(
    name: &'static str,
    value: &str,
) -> Result<header::HeaderValue, UploadInitError> {
    let mut v = header::HeaderValue::from_str(value).context(InvalidHeaderSnafu { header: name })?;
    v.set_sensitive(true);
    Ok(v)
}

impl GoogleAdsClient {
    /// Creates a client from explicit settings and tokens.
    pub fn new(
        settings: GoogleAdsSettings,
        developer_token: SecretString,
        access_token: SecretString,
    ) -> Result<Self, UploadInitError> {
        if settings.customer_id_digits().is_empty() {
            return MissingSettingSnafu { name: "customer_id" }.fail();
        }
        if settings.conversion_action.trim().is_empty() {
            return MissingSettingSnafu {
                name: "conversion_action",
            }
            .fail();
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            sensitive(
                "authorization",
                &format!("Bearer {}", access_token.expose_secret()),
            )?,
        );
        headers.insert(
            "developer-token",
            sensitive("developer-token", developer_token.expose_secret())?,
        );
        if let Some(login) = settings.login_customer_id_digits() {
            headers.insert(
                "login-customer-id",
                header::HeaderValue::from_str(&login)
                    .context(InvalidHeaderSnafu { header: "login-customer-id" })?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            settings,
            _developer_token: developer_token,
            _access_token: access_token,
        })
    }

    /// Creates a client reading both tokens from the environment.
    pub fn from_env(settings: GoogleAdsSettings) -> Result<Self, UploadInitError> {
        let developer_token =
            SecretString::new(get_env_var(DEVELOPER_TOKEN_ENV).context(MissingEnvVarSnafu)?.into());
        let access_token =
            SecretString::new(get_env_var(ACCESS_TOKEN_ENV).context(MissingEnvVarSnafu)?.into());
        Self::new(settings, developer_token, access_token)
    }

    pub fn settings(&self) -> &GoogleAdsSettings {
        &self.settings
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, UploadError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let request_id = response
            .headers()
            .get("request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        if !status.is_success() {
            let err = rejection(status.as_u16(), request_id, &text);
            warn!(url, error = %err, "ads API rejected request");
            return Err(err);
        }
        debug!(url, request_id = request_id.as_deref().unwrap_or("-"), "ads API accepted request");
        Ok(decode_body(&text))
    }
}

#[async_trait]
impl ConversionUploader for GoogleAdsClient {
    async fn upload_by_click_identifier(
        &self,
        conversion: &ClickConversion,
    ) -> Result<UploadResult, UploadError> {
        let url = self.settings.customer_url("uploadClickConversions");
        let body = click_conversion_body(&self.settings, conversion);
        let result = click_upload_result(self.post(&url, &body).await?, self.settings.validate_only);

        if let Some(message) = result.partial_failure_message() {
            warn!(
                order_id = conversion.order_id.as_deref().unwrap_or("-"),
                partial_failure = message,
                "click conversion accepted with partial failure"
            );
        } else {
            info!(
                order_id = conversion.order_id.as_deref().unwrap_or("-"),
                succeeded = result.succeeded(),
                validate_only = self.settings.validate_only,
                "click conversion uploaded"
            );
        }
        Ok(result)
    }

    async fn upload_by_hashed_identity(
        &self,
        conversion: &HashedConversion,
    ) -> Result<Option<UploadResult>, UploadError> {
        if !conversion.has_identifier() {
            debug!("no hashed identifier; skipping store sales upload");
            return Ok(None);
        }

        let created = self
            .post(&self.settings.jobs_url(), &create_job_body(&self.settings))
            .await?;
        let Some(job) = job_resource_name(&created) else {
            warn!(response = %created, "offline user data job create returned no resource name");
            return Ok(None);
        };

        let added = self
            .post(
                &self.settings.resource_url(&job, "addOperations"),
                &add_operations_body(&self.settings, conversion),
            )
            .await?;
        let ran = self
            .post(&self.settings.resource_url(&job, "run"), &json!({}))
            .await?;

        let result = UploadResult {
            items: vec![json!({ "resourceName": job })],
            partial_failure: partial_failure(&added),
            raw: json!({ "create": created, "addOperations": added, "run": ran }),
            validate_only: self.settings.validate_only,
        };
        info!(
            job = %job,
            order_id = conversion.order_id.as_deref().unwrap_or("-"),
            partial_failure = result.partial_failure_message().unwrap_or("-"),
            "store sales conversion uploaded"
        );
        Ok(Some(result))
    }
}
