// Square REST client
// Implements the v2 endpoints the adapter needs, with idempotency keys in request bodies
// and jittered retries for transient failures.

use std::future::Future;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::gateway::square::errors::{is_transient, SquareApiError, SquareErrorEnvelope};
use crate::gateway::square::types::{
    CardResponse, CheckoutResponse, CreateCardRequest, CreateCheckoutRequest, CreateCustomerRequest,
    CreateOrderRequest, CreatePaymentRequest, CustomerResponse, OrderResponse, PaymentResponse,
    TransactionResponse,
};

pub const SQUARE_PRODUCTION_BASE: &str = "https://connect.squareup.com";
pub const SQUARE_SANDBOX_BASE: &str = "https://connect.squareupsandbox.com";

#[derive(Clone)]
pub struct SquareRestClient {
    pub(crate) http: Client,
    pub(crate) access_token: String,
    pub(crate) base_url: String,
    pub(crate) api_version: Option<String>,
    // Retry knobs with safe defaults
    pub(crate) max_retries: u32,
    pub(crate) base_delay_ms: u64,
    pub(crate) max_delay_ms: u64,
}

impl SquareRestClient {
    pub fn new(http: Client, access_token: String, base_url: impl Into<String>) -> Self {
        Self {
            http,
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: None,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }

    pub fn with_version(mut self, ver: impl Into<Option<String>>) -> Self {
        self.api_version = ver.into();
        self
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.base_delay_ms = base_delay_ms.max(1);
        self.max_delay_ms = max_delay_ms.max(self.base_delay_ms);
        self
    }

    fn apply_common_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut req = req
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json");
        if let Some(v) = &self.api_version {
            if !v.is_empty() {
                req = req.header("Square-Version", v);
            }
        }
        req
    }

    fn map_error(status: StatusCode, body: &str) -> SquareApiError {
        match serde_json::from_str::<SquareErrorEnvelope>(body) {
            Ok(env) if !env.errors.is_empty() => env.to_api_error_with_status(Some(status.as_u16())),
            _ => SquareApiError::Square {
                category: crate::gateway::square::errors::SquareErrorCategory::Unknown,
                errors: Vec::new(),
                field: None,
                status: Some(status.as_u16()),
            },
        }
    }

    async fn with_retries<F, Fut, T>(&self, desc: &str, max_retries: u32, mut op: F) -> Result<T, SquareApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SquareApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let (http_status, category) = match &e {
                        SquareApiError::Square { status, category, .. } => (*status, Some(category)),
                        SquareApiError::Http(_) => (Some(503), None),
                        SquareApiError::Decode(_) => (None, None),
                    };
                    if !is_transient(http_status, category) || attempt >= max_retries {
                        return Err(e);
                    }

                    // Exponential backoff with full jitter
                    let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
                    let cap = exp.min(self.max_delay_ms);
                    let delay_ms = if cap > self.base_delay_ms {
                        SmallRng::from_entropy().gen_range(self.base_delay_ms..=cap)
                    } else {
                        self.base_delay_ms
                    };

                    warn!(
                        target: "square",
                        desc = %desc,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        http_status = ?http_status,
                        category = ?category,
                        next_delay_ms = delay_ms,
                        "retrying transient Square error"
                    );

                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn execute<B, T>(
        &self,
        desc: &str,
        method: Method,
        path: &str,
        body: Option<&B>,
        max_retries: u32,
    ) -> Result<T, SquareApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        info!(target: "square", method = %method, path = %path, "square request");
        let url = format!("{}{}", self.base_url, path);
        self.with_retries(desc, max_retries, || {
            let mut req = self.http.request(method.clone(), url.as_str());
            if let Some(b) = body {
                req = req.json(b);
            }
            let req = self.apply_common_headers(req);
            async move {
                let resp = req.send().await.map_err(|e| SquareApiError::Http(e.to_string()))?;
                let status = resp.status();
                let text = resp.text().await.map_err(|e| SquareApiError::Decode(e.to_string()))?;
                if status.is_success() {
                    serde_json::from_str::<T>(&text).map_err(|e| SquareApiError::Decode(e.to_string()))
                } else {
                    Err(Self::map_error(status, &text))
                }
            }
        })
        .await
    }

    // POST /v2/locations/{location_id}/checkouts
    #[instrument(skip(self, body), fields(idempotency_key = %body.idempotency_key))]
    pub async fn create_checkout(
        &self,
        location_id: &str,
        body: &CreateCheckoutRequest,
    ) -> Result<CheckoutResponse, SquareApiError> {
        let path = format!("/v2/locations/{location_id}/checkouts");
        self.execute("create_checkout", Method::POST, &path, Some(body), self.max_retries)
            .await
    }

    // POST /v2/orders
    #[instrument(skip(self, body), fields(idempotency_key = %body.idempotency_key, reference = %body.order.reference_id))]
    pub async fn create_order(&self, body: &CreateOrderRequest) -> Result<OrderResponse, SquareApiError> {
        self.execute("create_order", Method::POST, "/v2/orders", Some(body), self.max_retries)
            .await
    }

    // POST /v2/payments
    #[instrument(skip(self, body), fields(idempotency_key = %body.idempotency_key, amount = body.amount_money.amount))]
    pub async fn create_payment(&self, body: &CreatePaymentRequest) -> Result<PaymentResponse, SquareApiError> {
        self.execute("create_payment", Method::POST, "/v2/payments", Some(body), self.max_retries)
            .await
    }

    // POST /v2/payments/{payment_id}/complete
    #[instrument(skip(self))]
    pub async fn complete_payment(&self, payment_id: &str) -> Result<PaymentResponse, SquareApiError> {
        let path = format!("/v2/payments/{payment_id}/complete");
        self.execute("complete_payment", Method::POST, &path, Some(&serde_json::json!({})), self.max_retries)
            .await
    }

    // POST /v2/payments/{payment_id}/cancel
    #[instrument(skip(self))]
    pub async fn cancel_payment(&self, payment_id: &str) -> Result<PaymentResponse, SquareApiError> {
        let path = format!("/v2/payments/{payment_id}/cancel");
        self.execute("cancel_payment", Method::POST, &path, Some(&serde_json::json!({})), self.max_retries)
            .await
    }

    // GET /v2/locations/{location_id}/transactions/{transaction_id}
    #[instrument(skip(self))]
    pub async fn retrieve_transaction(
        &self,
        location_id: &str,
        transaction_id: &str,
    ) -> Result<TransactionResponse, SquareApiError> {
        let path = format!("/v2/locations/{location_id}/transactions/{transaction_id}");
        // Keep retrieve lightweight: single retry only
        self.execute::<(), _>("retrieve_transaction", Method::GET, &path, None, 1)
            .await
    }

    // POST /v2/customers
    #[instrument(skip(self, body), fields(idempotency_key = %body.idempotency_key))]
    pub async fn create_customer(&self, body: &CreateCustomerRequest) -> Result<CustomerResponse, SquareApiError> {
        self.execute("create_customer", Method::POST, "/v2/customers", Some(body), self.max_retries)
            .await
    }

    // POST /v2/cards
    #[instrument(skip(self, body), fields(idempotency_key = %body.idempotency_key, customer_id = %body.card.customer_id))]
    pub async fn create_card(&self, body: &CreateCardRequest) -> Result<CardResponse, SquareApiError> {
        self.execute("create_card", Method::POST, "/v2/cards", Some(body), self.max_retries)
            .await
    }

    // POST /v2/cards/{card_id}/disable
    #[instrument(skip(self))]
    pub async fn disable_card(&self, card_id: &str) -> Result<CardResponse, SquareApiError> {
        let path = format!("/v2/cards/{card_id}/disable");
        self.execute("disable_card", Method::POST, &path, Some(&serde_json::json!({})), self.max_retries)
            .await
    }
}
