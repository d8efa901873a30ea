// Square-specific error types and mappings

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::{GatewayErrorDetail, GatewayFailure};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SquareErrorCategory {
    ApiError,
    AuthenticationError,
    InvalidRequestError,
    RateLimitError,
    PaymentMethodError,
    RefundError,
    MerchantSubscriptionError,
    ExternalVendorError,
    Unknown,
}

impl From<&str> for SquareErrorCategory {
    fn from(s: &str) -> Self {
        match s {
            "API_ERROR" => SquareErrorCategory::ApiError,
            "AUTHENTICATION_ERROR" => SquareErrorCategory::AuthenticationError,
            "INVALID_REQUEST_ERROR" => SquareErrorCategory::InvalidRequestError,
            "RATE_LIMIT_ERROR" => SquareErrorCategory::RateLimitError,
            "PAYMENT_METHOD_ERROR" => SquareErrorCategory::PaymentMethodError,
            "REFUND_ERROR" => SquareErrorCategory::RefundError,
            "MERCHANT_SUBSCRIPTION_ERROR" => SquareErrorCategory::MerchantSubscriptionError,
            "EXTERNAL_VENDOR_ERROR" => SquareErrorCategory::ExternalVendorError,
            _ => SquareErrorCategory::Unknown,
        }
    }
}

// Square REST error envelope: { errors: [ { category, code, detail, field } ] }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<SquareErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareErrorBody {
    pub category: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl SquareErrorEnvelope {
    pub fn to_api_error_with_status(self, status: Option<u16>) -> SquareApiError {
        let first = self.errors.first().cloned();
        SquareApiError::Square {
            category: first
                .as_ref()
                .map(|e| SquareErrorCategory::from(e.category.as_str()))
                .unwrap_or(SquareErrorCategory::Unknown),
            errors: self
                .errors
                .into_iter()
                .map(|e| GatewayErrorDetail::new(e.code, e.detail.unwrap_or_default()))
                .collect(),
            field: first.and_then(|e| e.field),
            status,
        }
    }
}

#[derive(Debug, Error)]
pub enum SquareApiError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("square error: {category:?} status={status:?} errors={errors:?} field={field:?}")]
    Square {
        category: SquareErrorCategory,
        errors: Vec<GatewayErrorDetail>,
        field: Option<String>,
        status: Option<u16>,
    },
}

// Centralized mapper from SquareApiError -> GatewayFailure
impl From<SquareApiError> for GatewayFailure {
    fn from(e: SquareApiError) -> Self {
        match e {
            SquareApiError::Http(msg) => GatewayFailure::single("CONNECTION_ERROR", msg),
            SquareApiError::Decode(msg) => GatewayFailure::single("DECODE_ERROR", msg),
            SquareApiError::Square { errors, status, .. } => {
                if errors.is_empty() {
                    GatewayFailure::single("HTTP_ERROR", format!("status={status:?}"))
                } else {
                    GatewayFailure { errors }
                }
            }
        }
    }
}

// Helper indicating whether an error is likely transient (5xx or rate limited)
pub fn is_transient(http_status: Option<u16>, category: Option<&SquareErrorCategory>) -> bool {
    if let Some(s) = http_status {
        if (500..600).contains(&s) || s == 429 {
            return true;
        }
    }
    matches!(category, Some(SquareErrorCategory::RateLimitError))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_maps_all_errors() {
        let body = r#"{"errors":[
            {"category":"PAYMENT_METHOD_ERROR","code":"CARD_DECLINED","detail":"Card declined."},
            {"category":"PAYMENT_METHOD_ERROR","code":"CVV_FAILURE"}
        ]}"#;
        let env: SquareErrorEnvelope = serde_json::from_str(body).unwrap();
        let err = env.to_api_error_with_status(Some(402));
        match &err {
            SquareApiError::Square { category, errors, status, .. } => {
                assert_eq!(*category, SquareErrorCategory::PaymentMethodError);
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[1].detail, "");
                assert_eq!(*status, Some(402));
            }
            other => panic!("unexpected {other:?}"),
        }
        let failure = GatewayFailure::from(err);
        assert_eq!(failure.first(), GatewayErrorDetail::new("CARD_DECLINED", "Card declined."));
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(Some(503), None));
        assert!(is_transient(Some(429), None));
        assert!(is_transient(None, Some(&SquareErrorCategory::RateLimitError)));
        assert!(!is_transient(Some(400), Some(&SquareErrorCategory::InvalidRequestError)));
        assert!(!is_transient(None, None));
    }

    #[test]
    fn test_transport_errors_become_failures() {
        let f = GatewayFailure::from(SquareApiError::Http("connection reset".into()));
        assert_eq!(f.first().code, "CONNECTION_ERROR");
    }
}
