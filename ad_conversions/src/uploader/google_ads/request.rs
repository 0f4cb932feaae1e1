//! Request bodies for the conversion upload endpoints.

use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value, json};

use crate::datetime::format_ads_datetime;
use crate::models::conversion::{ClickConversion, HashedConversion, value_to_micros};
use crate::uploader::google_ads::params::GoogleAdsSettings;

/// Offline user data job type for first-party store sales.
pub const STORE_SALES_JOB_TYPE: &str = "STORE_SALES_UPLOAD_FIRST_PARTY";

/// `customers/{cid}:uploadClickConversions` with a single conversion.
pub fn click_conversion_body(settings: &GoogleAdsSettings, c: &ClickConversion) -> Value {
    let mut conversion = Map::new();
    conversion.insert("gclid".into(), json!(c.click_id));
    conversion.insert(
        "conversionAction".into(),
        json!(settings.conversion_action_resource()),
    );
    conversion.insert(
        "conversionDateTime".into(),
        json!(format_ads_datetime(&c.conversion_time)),
    );
    conversion.insert(
        "conversionValue".into(),
        json!(c.value.to_f64().unwrap_or(0.0)),
    );
    conversion.insert("currencyCode".into(), json!(settings.currency));
    if let Some(order_id) = c.order_id.as_deref().filter(|o| !o.is_empty()) {
        conversion.insert("orderId".into(), json!(order_id));
    }

    json!({
        "conversions": [Value::Object(conversion)],
        "partialFailure": true,
        "validateOnly": settings.validate_only,
    })
}

/// `offlineUserDataJobs:create` for a store sales job.
pub fn create_job_body(settings: &GoogleAdsSettings) -> Value {
    json!({
        "job": {
            "type": STORE_SALES_JOB_TYPE,
            "storeSalesMetadata": {
                "loyaltyFraction": 1.0,
                "transactionUploadFraction": 1.0
            }
        },
        "validateOnly": settings.validate_only,
    })
}

/// `{job}:addOperations` with one create operation.
pub fn add_operations_body(settings: &GoogleAdsSettings, c: &HashedConversion) -> Value {
    let mut identifiers = Vec::new();
    if let Some(phone) = &c.phone_sha256 {
        identifiers.push(json!({"hashedPhoneNumber": phone}));
    }
    if let Some(email) = &c.email_sha256 {
        identifiers.push(json!({"hashedEmail": email}));
    }

    let mut transaction = Map::new();
    transaction.insert(
        "conversionAction".into(),
        json!(settings.conversion_action_resource()),
    );
    transaction.insert("currencyCode".into(), json!(settings.currency));
    // int64 fields are strings in the JSON mapping.
    transaction.insert(
        "transactionAmountMicros".into(),
        json!(value_to_micros(c.value).to_string()),
    );
    transaction.insert(
        "transactionDateTime".into(),
        json!(format_ads_datetime(&c.conversion_time)),
    );
    if let Some(order_id) = c.order_id.as_deref().filter(|o| !o.is_empty()) {
        transaction.insert("orderId".into(), json!(order_id));
    }

    json!({
        "enablePartialFailure": true,
        "validateOnly": settings.validate_only,
        "operations": [{
            "create": {
                "userIdentifiers": identifiers,
                "transactionAttribute": Value::Object(transaction),
            }
        }],
    })
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;
    use crate::models::conversion::value_from_cents;

    fn settings() -> GoogleAdsSettings {
        GoogleAdsSettings {
            customer_id: "123-456-7890".into(),
            conversion_action: "55".into(),
            ..Default::default()
        }
    }

    fn at() -> chrono::DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 10, 10, 0, 0)
            .unwrap()
    }

    #[test]
    fn click_body_shape() {
        let body = click_conversion_body(
            &settings(),
            &ClickConversion {
                click_id: "gclid-1".into(),
                order_id: Some("o-1".into()),
                value: value_from_cents(2500),
                conversion_time: at(),
            },
        );
        let c = &body["conversions"][0];
        assert_eq!(c["gclid"], "gclid-1");
        assert_eq!(c["conversionAction"], "customers/1234567890/conversionActions/55");
        assert_eq!(c["conversionDateTime"], "2025-01-10 10:00:00-05:00");
        assert_eq!(c["conversionValue"], 25.0);
        assert_eq!(c["currencyCode"], "USD");
        assert_eq!(c["orderId"], "o-1");
        assert_eq!(body["partialFailure"], true);
        assert_eq!(body["validateOnly"], false);
    }

    #[test]
    fn hashed_body_only_lists_present_identifiers() {
        let body = add_operations_body(
            &settings(),
            &HashedConversion {
                phone_sha256: None,
                email_sha256: Some("e".repeat(64)),
                order_id: None,
                value: value_from_cents(1999),
                conversion_time: at(),
            },
        );
        let create = &body["operations"][0]["create"];
        assert_eq!(create["userIdentifiers"].as_array().unwrap().len(), 1);
        assert!(create["userIdentifiers"][0].get("hashedEmail").is_some());
        let tx = &create["transactionAttribute"];
        assert_eq!(tx["transactionAmountMicros"], "19990000");
        assert_eq!(tx["transactionDateTime"], "2025-01-10 10:00:00-05:00");
        assert!(tx.get("orderId").is_none());
        assert_eq!(body["enablePartialFailure"], true);
    }

    #[test]
    fn job_body_names_store_sales_type() {
        assert_eq!(create_job_body(&settings())["job"]["type"], STORE_SALES_JOB_TYPE);
    }
}
