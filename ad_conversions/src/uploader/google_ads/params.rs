use serde::{Deserialize, Serialize};

/// Account settings for the Google Ads uploader. Tokens are passed separately.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GoogleAdsSettings {
    pub base_url: String,
    /// Path segment such as `v21`.
    pub api_version: String,
    /// Account receiving conversions; dashes are allowed and stripped.
    pub customer_id: String,
    /// Manager account used for access, if any.
    pub login_customer_id: Option<String>,
    /// Conversion action id or full resource name.
    pub conversion_action: String,
    pub currency: String,
    /// Ask the platform to validate without applying.
    pub validate_only: bool,
    pub timeout_secs: u64,
}

impl Default for GoogleAdsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://googleads.googleapis.com".into(),
            api_version: "v21".into(),
            customer_id: String::new(),
            login_customer_id: None,
            conversion_action: String::new(),
            currency: "USD".into(),
            validate_only: false,
            timeout_secs: 15,
        }
    }
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

impl GoogleAdsSettings {
    /// `123-456-7890` -> `1234567890`.
    pub fn customer_id_digits(&self) -> String {
        digits(&self.customer_id)
    }

    pub fn login_customer_id_digits(&self) -> Option<String> {
        self.login_customer_id
            .as_deref()
            .map(digits)
            .filter(|d| !d.is_empty())
    }

    /// `customers/{cid}/conversionActions/{id}`, unless already a resource name.
    pub fn conversion_action_resource(&self) -> String {
        let action = self.conversion_action.trim();
        if action.starts_with("customers/") {
            action.to_string()
        } else {
            format!(
                "customers/{}/conversionActions/{}",
                self.customer_id_digits(),
                action
            )
        }
    }

    fn api_root(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    /// Customer-level custom method, e.g. `uploadClickConversions`.
    pub(crate) fn customer_url(&self, method: &str) -> String {
        format!(
            "{}/customers/{}:{method}",
            self.api_root(),
            self.customer_id_digits()
        )
    }

    /// Custom method on a resource returned by the API.
    pub(crate) fn resource_url(&self, resource_name: &str, method: &str) -> String {
        format!("{}/{}:{method}", self.api_root(), resource_name.trim_matches('/'))
    }

    /// `offlineUserDataJobs:create` is addressed under the customer path.
    pub(crate) fn jobs_url(&self) -> String {
        format!(
            "{}/customers/{}/offlineUserDataJobs:create",
            self.api_root(),
            self.customer_id_digits()
        )
    }
}
