//! Choice of the identifier a conversion is reported under.

use serde_json::Value;
use shared_utils::identity::{hash_identity, to_e164};

/// Payload keys searched for the customer's email, in order.
pub const EMAIL_FIELDS: [&str; 2] = ["customer_email", "email"];

/// How a lead's conversions are matched on the ad platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStrategy {
    /// The ad click identifier captured with the lead.
    Click { click_id: String },
    /// SHA-256 digests of the E.164 phone and/or the email.
    Hashed {
        phone_sha256: Option<String>,
        email_sha256: Option<String>,
    },
    /// Nothing usable to match on.
    Unmatchable,
}

impl MatchStrategy {
    /// Click id when present, else hashed identity, else nothing.
    pub fn for_lead(phone: &str, click_id: Option<&str>, payload: &Value) -> Self {
        if let Some(click_id) = click_id.map(str::trim).filter(|c| !c.is_empty()) {
            return Self::Click {
                click_id: click_id.to_string(),
            };
        }

        let phone_sha256 = to_e164(phone).and_then(|p| hash_identity(&p));
        let email_sha256 = EMAIL_FIELDS
            .iter()
            .find_map(|k| {
                payload
                    .get(*k)
                    .and_then(Value::as_str)
                    .filter(|v| !v.trim().is_empty())
            })
            .and_then(hash_identity);

        if phone_sha256.is_none() && email_sha256.is_none() {
            Self::Unmatchable
        } else {
            Self::Hashed {
                phone_sha256,
                email_sha256,
            }
        }
    }

    /// Ledger key: the click id, else the phone digest, else the email digest.
    pub fn matching_key(&self) -> Option<&str> {
        match self {
            Self::Click { click_id } => Some(click_id.as_str()),
            Self::Hashed {
                phone_sha256,
                email_sha256,
            } => phone_sha256.as_deref().or(email_sha256.as_deref()),
            Self::Unmatchable => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Hashed { .. } => "hashed",
            Self::Unmatchable => "none",
        }
    }
}
