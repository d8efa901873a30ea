// Transaction orchestration: orders, charges, capture/void and the single
// state-transition function driven by gateway responses

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::AdapterError;
use crate::gateway::{
    CardStatus, CheckoutRequest, GatewayErrorDetail, GatewayResponse, PaymentGateway, PaymentRequest,
    PaymentStatus, ShippingAddress, TransactionRecord,
};
use crate::idempotency::KeyKind;
use crate::model::{Address, Transaction, TransactionState};
use crate::order_builder::{to_minor_units, DepositBases, GatewayOrder, Money, OrderBuilder};
use crate::settings::Config;
use crate::store::Context;

/// Invoked once when a transaction reaches `done`.
pub type PaymentCallback = Arc<dyn Fn(&Transaction) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    pub reference: String,
    pub state: TransactionState,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransactionResult {
    fn from_tx(tx: &Transaction, success: bool) -> Self {
        Self {
            reference: tx.reference.clone(),
            state: tx.state,
            success,
            message: tx.state_message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub capture_manually: bool,
    pub deposit_product_id: Option<String>,
    pub return_url: String,
    pub callback_delay: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            capture_manually: cfg.square.capture_manually,
            deposit_product_id: cfg.deposit_product_id.clone(),
            return_url: cfg.return_url(),
            callback_delay: cfg.callback_delay,
        }
    }
}

/// Buyer-facing request to start a hosted checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutStart {
    #[serde(default)]
    pub acquirer_id: Option<String>,
    #[serde(default)]
    pub reference: String,
    /// Merchant support address shown on the checkout page.
    #[serde(default)]
    pub partner_email: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// Query parameters the gateway appends to the return URL.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutReturn {
    #[serde(rename = "checkoutId")]
    pub checkout_id: String,
    #[serde(rename = "referenceId")]
    pub reference_id: String,
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
}

/// Side effects owed after a response was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub success: bool,
    /// Transaction was already done; nothing changed.
    pub unchanged: bool,
    pub run_callback: bool,
    pub verify_token: bool,
}

fn mark_error(tx: &mut Transaction, detail: &GatewayErrorDetail) -> Transition {
    tx.state = TransactionState::Error;
    tx.state_message = Some(detail.to_string());
    Transition::default()
}

/// Map a gateway response onto the transaction's state.
pub fn apply_response(tx: &mut Transaction, response: &GatewayResponse) -> Transition {
    if tx.state == TransactionState::Done {
        return Transition {
            success: true,
            unchanged: true,
            ..Default::default()
        };
    }

    let payment = match response {
        GatewayResponse::Payment(p) => p,
        GatewayResponse::Error(e) => return mark_error(tx, e),
    };

    match (&payment.status, &payment.card_status) {
        (PaymentStatus::Completed, _) => {
            tx.gateway_reference = Some(payment.id.clone());
            tx.gateway_order_id = payment.order_id.clone().or(tx.gateway_order_id.take());
            tx.state = TransactionState::Done;
            tx.state_message = None;
            Transition {
                success: true,
                run_callback: true,
                verify_token: true,
                ..Default::default()
            }
        }
        (PaymentStatus::Approved, Some(CardStatus::Authorized)) => {
            tx.gateway_reference = Some(payment.id.clone());
            tx.gateway_order_id = payment.order_id.clone().or(tx.gateway_order_id.take());
            tx.state = TransactionState::Authorized;
            tx.state_message = None;
            Transition {
                success: true,
                verify_token: true,
                ..Default::default()
            }
        }
        (PaymentStatus::Approved, None) => {
            tx.gateway_reference = Some(payment.id.clone());
            mark_error(
                tx,
                &GatewayErrorDetail::new("MISSING_CARD_DETAILS", "approved payment carries no card status"),
            )
        }
        (PaymentStatus::Pending, _) => {
            tx.gateway_reference = Some(payment.id.clone());
            tx.gateway_order_id = payment.order_id.clone().or(tx.gateway_order_id.take());
            tx.state = TransactionState::Pending;
            tx.state_message = None;
            Transition {
                success: true,
                ..Default::default()
            }
        }
        (PaymentStatus::Canceled | PaymentStatus::Rejected | PaymentStatus::Failed, _) => {
            tx.gateway_reference = Some(payment.id.clone());
            tx.state = TransactionState::Cancel;
            tx.state_message = Some(payment.status.to_string());
            Transition {
                success: true,
                ..Default::default()
            }
        }
        (status, card) => {
            tx.gateway_reference = Some(payment.id.clone());
            let detail = match card {
                Some(c) => format!("unexpected payment status {status} with card status {c:?}"),
                None => format!("unexpected payment status {status}"),
            };
            mark_error(tx, &GatewayErrorDetail::new("UNEXPECTED_STATUS", detail))
        }
    }
}

/// Per-reference locks so duplicate deliveries serialize their read-modify-write.
#[derive(Default)]
struct TransitionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TransitionLocks {
    async fn acquire(&self, reference: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(reference.to_string()).or_default().clone()
    }

    async fn release(&self, reference: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // map + ours: nobody else is waiting on it
        if Arc::strong_count(&lock) == 2 {
            locks.remove(reference);
        }
    }
}

pub struct TransactionOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    ctx: Context,
    builder: OrderBuilder,
    settings: OrchestratorSettings,
    callback: Option<PaymentCallback>,
    locks: TransitionLocks,
}

impl TransactionOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, ctx: Context, settings: OrchestratorSettings) -> Self {
        Self {
            gateway,
            ctx,
            builder: OrderBuilder::new(settings.deposit_product_id.clone()),
            settings,
            callback: None,
            locks: TransitionLocks::default(),
        }
    }

    pub fn with_callback(mut self, callback: PaymentCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Current record for `reference`.
    pub async fn transaction(&self, reference: &str) -> Result<Transaction, AdapterError> {
        self.ctx.transaction(reference).await
    }

    /// Store a transaction handed over by the host.
    #[instrument(skip(self, tx), fields(reference = %tx.reference))]
    pub async fn register_transaction(&self, tx: &Transaction) -> Result<(), AdapterError> {
        let lock = self.locks.acquire(&tx.reference).await;
        let result = {
            let _guard = lock.lock().await;
            self.ctx.register_transaction(tx).await
        };
        self.locks.release(&tx.reference, lock).await;
        result
    }

    /// Build the gateway order for a transaction without calling the gateway.
    pub async fn build_order(&self, tx: &Transaction) -> Result<GatewayOrder, AdapterError> {
        let name = tx.document_name();
        let document = self.ctx.documents.find_document(name).await?.ok_or_else(|| {
            AdapterError::validation(format!("no sale document {name} for reference {}", tx.reference))
        })?;

        let mut deposits = DepositBases::new();
        for origin in self.builder.deposit_origins(&document) {
            if let Some(order) = self.ctx.documents.find_document(origin).await? {
                deposits.insert(origin, order.amount_untaxed);
            }
        }
        self.builder.build(&tx.reference, &document, &deposits)
    }

    async fn apply_and_persist(
        &self,
        mut tx: Transaction,
        response: &GatewayResponse,
    ) -> Result<TransactionResult, AdapterError> {
        let t = apply_response(&mut tx, response);
        if t.unchanged {
            warn!(reference = %tx.reference, "trying to validate an already validated transaction");
            return Ok(TransactionResult::from_tx(&tx, true));
        }
        self.ctx.transactions.save_transaction(&tx).await?;

        if t.verify_token {
            if let Some(token_id) = &tx.payment_token_id {
                if let Some(mut token) = self.ctx.tokens.get_token(token_id).await? {
                    token.verified = true;
                    self.ctx.tokens.save_token(&token).await?;
                }
            }
        }
        if t.run_callback {
            if let Some(cb) = &self.callback {
                cb(&tx);
            }
        }

        if tx.state == TransactionState::Error {
            warn!(
                reference = %tx.reference,
                message = %tx.state_message.as_deref().unwrap_or(""),
                "Transaction moved to error"
            );
        } else {
            info!(reference = %tx.reference, state = ?tx.state, "Transaction validated");
        }
        Ok(TransactionResult::from_tx(&tx, t.success))
    }

    /// Apply a gateway response to the transaction identified by `reference`.
    #[instrument(skip(self, response))]
    pub async fn validate(
        &self,
        reference: &str,
        response: GatewayResponse,
    ) -> Result<TransactionResult, AdapterError> {
        let lock = self.locks.acquire(reference).await;
        let result = {
            let _guard = lock.lock().await;
            match self.ctx.transaction(reference).await {
                Ok(tx) => self.apply_and_persist(tx, &response).await,
                Err(e) => Err(e),
            }
        };
        self.locks.release(reference, lock).await;
        result
    }

    /// Register the transaction's order with the gateway and keep its id.
    #[instrument(skip(self))]
    pub async fn create_order(&self, reference: &str) -> Result<String, AdapterError> {
        let lock = self.locks.acquire(reference).await;
        let result = {
            let _guard = lock.lock().await;
            self.create_order_locked(reference).await
        };
        self.locks.release(reference, lock).await;
        result
    }

    async fn create_order_locked(&self, reference: &str) -> Result<String, AdapterError> {
        let mut tx = self.ctx.transaction(reference).await?;
        if tx.state == TransactionState::Done {
            warn!(reference = %reference, "order requested for an already validated transaction");
            return tx.gateway_order_id.ok_or_else(|| {
                AdapterError::invalid_state(format!("transaction {reference} is done without a gateway order"))
            });
        }
        let order = self.build_order(&tx).await?;
        let key = KeyKind::Order.generate(&tx.id);
        match self.gateway.create_order(&order, &key).await {
            Ok(order_id) => {
                debug!(reference = %reference, order_id = %order_id, "Created gateway order");
                tx.gateway_order_id = Some(order_id.clone());
                self.ctx.transactions.save_transaction(&tx).await?;
                Ok(order_id)
            }
            Err(f) => {
                self.apply_and_persist(tx, &GatewayResponse::Error(f.first())).await?;
                Err(f.into())
            }
        }
    }

    /// Charge a stored card for the transaction.
    #[instrument(skip(self))]
    pub async fn charge(&self, reference: &str, token_id: &str) -> Result<TransactionResult, AdapterError> {
        let lock = self.locks.acquire(reference).await;
        let result = {
            let _guard = lock.lock().await;
            self.charge_locked(reference, token_id).await
        };
        self.locks.release(reference, lock).await;
        result
    }

    async fn charge_locked(&self, reference: &str, token_id: &str) -> Result<TransactionResult, AdapterError> {
        let mut tx = self.ctx.transaction(reference).await?;
        if tx.state == TransactionState::Done {
            warn!(reference = %reference, "charge requested for an already validated transaction");
            return Ok(TransactionResult::from_tx(&tx, true));
        }
        let token = self
            .ctx
            .tokens
            .get_token(token_id)
            .await?
            .ok_or_else(|| AdapterError::NotFound(format!("payment token {token_id}")))?;
        tx.payment_token_id = Some(token.id.clone());

        let order = self.build_order(&tx).await?;
        let order_key = KeyKind::Order.generate(&tx.id);
        let order_id = match self.gateway.create_order(&order, &order_key).await {
            Ok(id) => id,
            Err(f) => return self.apply_and_persist(tx, &GatewayResponse::Error(f.first())).await,
        };
        tx.gateway_order_id = Some(order_id.clone());

        let req = PaymentRequest {
            idempotency_key: KeyKind::Payment.generate(&tx.id),
            amount: Money {
                amount: to_minor_units(tx.amount)?,
                currency: tx.currency.clone(),
            },
            source_id: token.gateway_card_id.clone(),
            autocomplete: !self.settings.capture_manually,
            customer_id: Some(token.customer_id.clone()),
            order_id,
            reference_id: tx.reference.clone(),
        };
        let response = GatewayResponse::from(self.gateway.create_payment(req).await);
        self.apply_and_persist(tx, &response).await
    }

    /// Capture an authorized transaction.
    #[instrument(skip(self))]
    pub async fn capture(&self, reference: &str) -> Result<TransactionResult, AdapterError> {
        self.settle_authorized(reference, Settle::Capture).await
    }

    /// Void an authorized transaction.
    #[instrument(skip(self))]
    pub async fn void(&self, reference: &str) -> Result<TransactionResult, AdapterError> {
        self.settle_authorized(reference, Settle::Void).await
    }

    async fn settle_authorized(&self, reference: &str, op: Settle) -> Result<TransactionResult, AdapterError> {
        let lock = self.locks.acquire(reference).await;
        let result = {
            let _guard = lock.lock().await;
            self.settle_locked(reference, op).await
        };
        self.locks.release(reference, lock).await;
        result
    }

    async fn settle_locked(&self, reference: &str, op: Settle) -> Result<TransactionResult, AdapterError> {
        let tx = self.ctx.transaction(reference).await?;
        if tx.state != TransactionState::Authorized {
            return Err(AdapterError::invalid_state(format!(
                "cannot {} transaction {} in state {:?}",
                op.verb(),
                tx.reference,
                tx.state
            )));
        }
        let payment_id = tx
            .gateway_reference
            .clone()
            .ok_or_else(|| AdapterError::invalid_state("Transaction ID Not Found"))?;

        let result = match op {
            Settle::Capture => self.gateway.complete_payment(&payment_id).await,
            Settle::Void => self.gateway.cancel_payment(&payment_id).await,
        };
        self.apply_and_persist(tx, &GatewayResponse::from(result)).await
    }

    /// Create a hosted checkout page and return its URL.
    #[instrument(skip(self, req), fields(reference = %req.reference))]
    pub async fn start_checkout(&self, req: CheckoutStart) -> Result<String, AdapterError> {
        if let Some(acquirer) = req.acquirer_id.as_deref().filter(|a| !a.is_empty()) {
            if acquirer != self.gateway.name() {
                return Err(AdapterError::validation(format!("unknown acquirer {acquirer}")));
            }
        }
        let tx = self.ctx.transaction(&req.reference).await?;
        let order = self.build_order(&tx).await?;

        let request = CheckoutRequest {
            idempotency_key: KeyKind::Checkout.generate(&tx.id),
            order_idempotency_key: KeyKind::Order.generate(&tx.id),
            order,
            ask_for_shipping_address: true,
            merchant_support_email: req.partner_email,
            buyer_email: req.email,
            shipping_address: ShippingAddress {
                address: Address {
                    line1: req.address1,
                    line2: req.address2,
                    locality: req.city,
                    administrative_district: req.state,
                    postal_code: req.zip_code,
                    country: req.country_code,
                },
                first_name: req.first_name,
                last_name: req.last_name,
            },
            redirect_url: req
                .redirect_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.settings.return_url.clone()),
        };

        let session = self.gateway.create_checkout(request).await?;
        info!(
            reference = %tx.reference,
            checkout_id = %session.id,
            "Hosted checkout created"
        );
        Ok(session.checkout_page_url)
    }

    /// Validate the transaction behind a hosted checkout return.
    ///
    /// The callback parameters only identify the transaction; its outcome is
    /// read back from the gateway.
    #[instrument(skip(self, ret), fields(reference = %ret.reference_id, checkout_id = %ret.checkout_id))]
    pub async fn handle_checkout_return(&self, ret: CheckoutReturn) -> Result<TransactionResult, AdapterError> {
        if !self.settings.callback_delay.is_zero() {
            tokio::time::sleep(self.settings.callback_delay).await;
        }
        let tx = self.ctx.transaction(&ret.reference_id).await?;
        let response = match self.gateway.retrieve_transaction(&ret.transaction_id).await {
            Ok(record) => {
                check_return_parameters(&tx, &record)?;
                GatewayResponse::Payment(record.to_payment_record())
            }
            Err(f) => GatewayResponse::Error(f.first()),
        };
        self.validate(&tx.reference, response).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Settle {
    Capture,
    Void,
}

impl Settle {
    fn verb(&self) -> &'static str {
        match self {
            Settle::Capture => "capture",
            Settle::Void => "void",
        }
    }
}

/// Reference and amount of a retrieved checkout must match the local transaction.
fn check_return_parameters(tx: &Transaction, record: &TransactionRecord) -> Result<(), AdapterError> {
    let mut invalid = Vec::new();
    if let Some(reference) = record.reference_id.as_deref() {
        if reference != tx.reference {
            invalid.push(format!("Reference: received {reference}, expected {}", tx.reference));
        }
    }
    if let Some(amount) = record.tenders.first().and_then(|t| t.amount.as_ref()) {
        let received = Decimal::new(amount.amount, 2);
        if received != tx.amount.round_dp(2) {
            invalid.push(format!("Amount: received {received}, expected {:.2}", tx.amount));
        }
    }
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(AdapterError::validation(format!(
            "invalid parameters for {}: {}",
            tx.reference,
            invalid.join("; ")
        )))
    }
}
