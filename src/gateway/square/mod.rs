// Square provider module

pub mod errors;
pub mod rest;
pub mod types;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use self::rest::{SquareRestClient, SQUARE_PRODUCTION_BASE, SQUARE_SANDBOX_BASE};
use self::types::{CreateCheckoutRequest, CreateOrderRequest, CreatePaymentRequest, SquareOrder};
use crate::error::AdapterError;
use crate::gateway::{
    CardRecord, CardRequest, CheckoutRequest, CheckoutSession, CustomerRequest, GatewayFailure,
    PaymentGateway, PaymentRecord, PaymentRequest, TransactionRecord,
};
use crate::order_builder::GatewayOrder;
use crate::settings::{SquareEnvironment, SquareSettings};

#[derive(Clone)]
pub struct SquareGateway {
    pub(crate) rest: SquareRestClient,
    pub(crate) location_id: String,
}

impl SquareGateway {
    // Build reqwest client with rustls and timeout from cfg.
    pub fn new(cfg: SquareSettings) -> Result<Self, AdapterError> {
        let timeout = std::time::Duration::from_millis(if cfg.timeout_ms > 0 { cfg.timeout_ms } else { 15_000 });
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Configuration(format!("http client: {e}")))?;

        let base_url = match (&cfg.base_url, cfg.environment) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, SquareEnvironment::Sandbox) => SQUARE_SANDBOX_BASE.to_string(),
            (_, SquareEnvironment::Production) => SQUARE_PRODUCTION_BASE.to_string(),
        };

        let rest = SquareRestClient::new(http, cfg.access_token.clone(), base_url)
            .with_version(if cfg.api_version.is_empty() { None } else { Some(cfg.api_version.clone()) })
            .with_retry(cfg.max_retries, cfg.retry_base_delay_ms, cfg.retry_max_delay_ms);

        Ok(Self::with_client(rest, cfg.location_id))
    }

    pub fn with_client(rest: SquareRestClient, location_id: impl Into<String>) -> Self {
        Self {
            rest,
            location_id: location_id.into(),
        }
    }
}

fn log_failure(op: &str, f: GatewayFailure) -> GatewayFailure {
    let first = f.first();
    warn!(target: "square", op = %op, code = %first.code, detail = %first.detail, "Square call failed");
    f
}

#[async_trait]
impl PaymentGateway for SquareGateway {
    fn name(&self) -> &'static str {
        "square"
    }

    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayFailure> {
        let body = CreateCheckoutRequest::from_gateway(req, &self.location_id);
        let resp = self
            .rest
            .create_checkout(&self.location_id, &body)
            .await
            .map_err(|e| log_failure("create_checkout", e.into()))?;
        debug!(checkout_id = %resp.checkout.id, "Created hosted checkout");
        Ok(resp.checkout.into())
    }

    async fn create_order(&self, order: &GatewayOrder, idempotency_key: &str) -> Result<String, GatewayFailure> {
        let body = CreateOrderRequest {
            idempotency_key: idempotency_key.to_string(),
            order: SquareOrder::from_gateway(order, &self.location_id),
        };
        let resp = self
            .rest
            .create_order(&body)
            .await
            .map_err(|e| log_failure("create_order", e.into()))?;
        Ok(resp.order.id)
    }

    async fn create_payment(&self, req: PaymentRequest) -> Result<PaymentRecord, GatewayFailure> {
        let body = CreatePaymentRequest::from_gateway(req, &self.location_id);
        let resp = self
            .rest
            .create_payment(&body)
            .await
            .map_err(|e| log_failure("create_payment", e.into()))?;
        Ok(resp.payment.into())
    }

    async fn complete_payment(&self, payment_id: &str) -> Result<PaymentRecord, GatewayFailure> {
        let resp = self
            .rest
            .complete_payment(payment_id)
            .await
            .map_err(|e| log_failure("complete_payment", e.into()))?;
        Ok(resp.payment.into())
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<PaymentRecord, GatewayFailure> {
        let resp = self
            .rest
            .cancel_payment(payment_id)
            .await
            .map_err(|e| log_failure("cancel_payment", e.into()))?;
        Ok(resp.payment.into())
    }

    async fn retrieve_transaction(&self, transaction_id: &str) -> Result<TransactionRecord, GatewayFailure> {
        let resp = self
            .rest
            .retrieve_transaction(&self.location_id, transaction_id)
            .await
            .map_err(|e| log_failure("retrieve_transaction", e.into()))?;
        Ok(resp.transaction.into())
    }

    async fn create_customer(&self, req: CustomerRequest) -> Result<String, GatewayFailure> {
        let resp = self
            .rest
            .create_customer(&req.into())
            .await
            .map_err(|e| log_failure("create_customer", e.into()))?;
        Ok(resp.customer.id)
    }

    async fn create_customer_card(&self, req: CardRequest) -> Result<CardRecord, GatewayFailure> {
        let resp = self
            .rest
            .create_card(&req.into())
            .await
            .map_err(|e| log_failure("create_card", e.into()))?;
        Ok(resp.card.into())
    }

    async fn delete_customer_card(&self, customer_id: &str, card_id: &str) -> Result<(), GatewayFailure> {
        debug!(customer_id = %customer_id, card_id = %card_id, "Disabling customer card");
        self.rest
            .disable_card(card_id)
            .await
            .map_err(|e| log_failure("disable_card", e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{CardStatus, PaymentStatus};
    use crate::order_builder::{GatewayLineItem, Money};

    fn gateway(url: String) -> SquareGateway {
        let rest = SquareRestClient::new(Client::new(), "sq-token".into(), url).with_retry(0, 1, 1);
        SquareGateway::with_client(rest, "L1")
    }

    #[tokio::test]
    async fn test_create_order_returns_gateway_id() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v2/orders")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "idempotency_key": "ORDER-9-x-y",
                "order": {"location_id": "L1", "reference_id": "S9"}
            })))
            .with_status(200)
            .with_body(r#"{"order":{"id":"ord_9"}}"#)
            .create_async()
            .await;

        let order = GatewayOrder {
            reference: "S9".into(),
            line_items: vec![GatewayLineItem {
                name: "Lamp".into(),
                quantity: "1.0".into(),
                base_price: Money {
                    amount: 999,
                    currency: "USD".into(),
                },
                discounts: vec![],
            }],
            taxes: vec![],
            discounts: vec![],
        };
        let id = gateway(server.url()).create_order(&order, "ORDER-9-x-y").await.unwrap();
        assert_eq!(id, "ord_9");
    }

    #[tokio::test]
    async fn test_complete_payment_maps_record() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v2/payments/pay_1/complete")
            .with_status(200)
            .with_body(r#"{"payment":{"id":"pay_1","status":"COMPLETED","card_details":{"status":"CAPTURED"}}}"#)
            .create_async()
            .await;

        let rec = gateway(server.url()).complete_payment("pay_1").await.unwrap();
        assert_eq!(rec.status, PaymentStatus::Completed);
        assert_eq!(rec.card_status, Some(CardStatus::Captured));
    }

    #[tokio::test]
    async fn test_delete_card_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v2/cards/card_1/disable")
            .with_status(404)
            .with_body(r#"{"errors":[{"category":"INVALID_REQUEST_ERROR","code":"NOT_FOUND","detail":"Card not found"}]}"#)
            .create_async()
            .await;

        let err = gateway(server.url())
            .delete_customer_card("cust_1", "card_1")
            .await
            .unwrap_err();
        assert_eq!(err.first().code, "NOT_FOUND");
    }
}
