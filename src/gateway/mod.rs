// Payment gateway seam: the capabilities the adapter needs from a card processor

pub mod square;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AdapterError;
use crate::model::Address;
use crate::order_builder::{GatewayOrder, Money};
use crate::settings::Config;

/// One `{code, detail}` entry of a gateway error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayErrorDetail {
    pub code: String,
    pub detail: String,
}

impl GatewayErrorDetail {
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for GatewayErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.code, self.detail)
    }
}

/// Error side of every gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", first_error(.errors))]
pub struct GatewayFailure {
    pub errors: Vec<GatewayErrorDetail>,
}

fn first_error(errors: &[GatewayErrorDetail]) -> GatewayErrorDetail {
    errors
        .first()
        .cloned()
        .unwrap_or_else(|| GatewayErrorDetail::new("UNKNOWN_ERROR", "gateway returned no error detail"))
}

impl GatewayFailure {
    pub fn single(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            errors: vec![GatewayErrorDetail::new(code, detail)],
        }
    }

    /// First error, or a generic entry when the gateway sent none.
    pub fn first(&self) -> GatewayErrorDetail {
        first_error(&self.errors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Completed,
    Approved,
    Pending,
    Canceled,
    Rejected,
    Failed,
    Other(String),
}

impl From<&str> for PaymentStatus {
    fn from(s: &str) -> Self {
        match s {
            "COMPLETED" => PaymentStatus::Completed,
            "APPROVED" => PaymentStatus::Approved,
            "PENDING" => PaymentStatus::Pending,
            "CANCELED" => PaymentStatus::Canceled,
            "REJECTED" => PaymentStatus::Rejected,
            "FAILED" => PaymentStatus::Failed,
            other => PaymentStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Canceled => "CANCELED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStatus {
    Authorized,
    Captured,
    Voided,
    Failed,
    Other(String),
}

impl From<&str> for CardStatus {
    fn from(s: &str) -> Self {
        match s {
            "AUTHORIZED" => CardStatus::Authorized,
            "CAPTURED" => CardStatus::Captured,
            "VOIDED" => CardStatus::Voided,
            "FAILED" => CardStatus::Failed,
            other => CardStatus::Other(other.to_string()),
        }
    }
}

/// Gateway view of a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: String,
    pub order_id: Option<String>,
    pub status: PaymentStatus,
    /// Absent when the gateway omitted card details.
    pub card_status: Option<CardStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tender {
    pub id: Option<String>,
    pub amount: Option<Money>,
    pub card_status: Option<CardStatus>,
}

/// Gateway view of a completed hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: String,
    pub reference_id: Option<String>,
    pub order_id: Option<String>,
    pub tenders: Vec<Tender>,
}

impl TransactionRecord {
    /// Express the first tender's card status in payment vocabulary.
    pub fn to_payment_record(&self) -> PaymentRecord {
        let card_status = self.tenders.first().and_then(|t| t.card_status.clone());
        let status = match &card_status {
            Some(CardStatus::Captured) => PaymentStatus::Completed,
            Some(CardStatus::Authorized) => PaymentStatus::Approved,
            Some(CardStatus::Voided) => PaymentStatus::Canceled,
            Some(CardStatus::Failed) => PaymentStatus::Failed,
            Some(CardStatus::Other(s)) => PaymentStatus::Other(s.clone()),
            None => PaymentStatus::Other("NO_TENDER".to_string()),
        };
        PaymentRecord {
            id: self.id.clone(),
            order_id: self.order_id.clone(),
            status,
            card_status,
        }
    }
}

/// What the gateway said about a payment, fed to transaction validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResponse {
    Payment(PaymentRecord),
    Error(GatewayErrorDetail),
}

impl From<Result<PaymentRecord, GatewayFailure>> for GatewayResponse {
    fn from(r: Result<PaymentRecord, GatewayFailure>) -> Self {
        match r {
            Ok(p) => GatewayResponse::Payment(p),
            Err(f) => GatewayResponse::Error(f.first()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingAddress {
    pub address: Address,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub idempotency_key: String,
    pub order_idempotency_key: String,
    pub order: GatewayOrder,
    pub ask_for_shipping_address: bool,
    pub merchant_support_email: String,
    pub buyer_email: String,
    pub shipping_address: ShippingAddress,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_page_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub idempotency_key: String,
    pub amount: Money,
    /// Stored card id or one-time nonce.
    pub source_id: String,
    pub autocomplete: bool,
    pub customer_id: Option<String>,
    pub order_id: String,
    pub reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRequest {
    pub idempotency_key: String,
    pub given_name: String,
    pub family_name: String,
    pub email: Option<String>,
    pub address: Address,
    pub phone: Option<String>,
    pub reference_id: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRequest {
    pub idempotency_key: String,
    pub customer_id: String,
    pub card_nonce: String,
    pub billing_address: Address,
    pub cardholder_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecord {
    pub id: String,
    pub last_4: Option<String>,
}

/// Card-processing gateway client.
///
/// Every mutating request carries the idempotency key it was given, so a
/// retried call whose response was lost is deduplicated by the gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayFailure>;

    /// Returns the gateway-assigned order id.
    async fn create_order(&self, order: &GatewayOrder, idempotency_key: &str) -> Result<String, GatewayFailure>;

    async fn create_payment(&self, req: PaymentRequest) -> Result<PaymentRecord, GatewayFailure>;

    /// Capture an authorized payment.
    async fn complete_payment(&self, payment_id: &str) -> Result<PaymentRecord, GatewayFailure>;

    /// Void an authorized payment.
    async fn cancel_payment(&self, payment_id: &str) -> Result<PaymentRecord, GatewayFailure>;

    async fn retrieve_transaction(&self, transaction_id: &str) -> Result<TransactionRecord, GatewayFailure>;

    /// Returns the gateway customer id.
    async fn create_customer(&self, req: CustomerRequest) -> Result<String, GatewayFailure>;

    async fn create_customer_card(&self, req: CardRequest) -> Result<CardRecord, GatewayFailure>;

    async fn delete_customer_card(&self, customer_id: &str, card_id: &str) -> Result<(), GatewayFailure>;
}

/// Provider selection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Square,
}

impl FromStr for GatewayKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "square" => Ok(GatewayKind::Square),
            other => Err(AdapterError::Configuration(format!("unknown payment provider '{other}'"))),
        }
    }
}

/// Build the gateway client selected by `cfg.provider`.
pub fn build_gateway(cfg: &Config) -> Result<Arc<dyn PaymentGateway>, AdapterError> {
    cfg.validate()?;
    match cfg.provider {
        GatewayKind::Square => Ok(Arc::new(square::SquareGateway::new(cfg.square.clone())?)),
    }
}
