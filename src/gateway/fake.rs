// Scripted gateway for tests: canned results plus a call log

use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    CardRecord, CardRequest, CheckoutRequest, CheckoutSession, CustomerRequest, GatewayFailure,
    PaymentGateway, PaymentRecord, PaymentRequest, PaymentStatus, TransactionRecord,
};
use crate::order_builder::GatewayOrder;

pub(crate) struct FakeGateway {
    pub calls: Mutex<Vec<&'static str>>,
    pub checkout_requests: Mutex<Vec<CheckoutRequest>>,
    pub payment_requests: Mutex<Vec<PaymentRequest>>,
    pub customer_requests: Mutex<Vec<CustomerRequest>>,
    pub card_requests: Mutex<Vec<CardRequest>>,
    pub checkout: Mutex<Result<CheckoutSession, GatewayFailure>>,
    pub order: Mutex<Result<String, GatewayFailure>>,
    pub payment: Mutex<Result<PaymentRecord, GatewayFailure>>,
    pub transaction: Mutex<Result<TransactionRecord, GatewayFailure>>,
    pub customer: Mutex<Result<String, GatewayFailure>>,
    pub card: Mutex<Result<CardRecord, GatewayFailure>>,
    pub delete: Mutex<Result<(), GatewayFailure>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            checkout_requests: Mutex::new(Vec::new()),
            payment_requests: Mutex::new(Vec::new()),
            customer_requests: Mutex::new(Vec::new()),
            card_requests: Mutex::new(Vec::new()),
            checkout: Mutex::new(Ok(CheckoutSession {
                id: "chk_1".into(),
                checkout_page_url: "https://checkout.example/pay/chk_1".into(),
            })),
            order: Mutex::new(Ok("ord_1".into())),
            payment: Mutex::new(Ok(PaymentRecord {
                id: "pay_1".into(),
                order_id: Some("ord_1".into()),
                status: PaymentStatus::Completed,
                card_status: None,
            })),
            transaction: Mutex::new(Err(GatewayFailure::single("NOT_FOUND", "no transaction scripted"))),
            customer: Mutex::new(Ok("cust_1".into())),
            card: Mutex::new(Ok(CardRecord {
                id: "ccof:card_1".into(),
                last_4: Some("1111".into()),
            })),
            delete: Mutex::new(Ok(())),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &'static str {
        "square"
    }

    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayFailure> {
        self.record("create_checkout");
        self.checkout_requests.lock().unwrap().push(req);
        self.checkout.lock().unwrap().clone()
    }

    async fn create_order(&self, _order: &GatewayOrder, _key: &str) -> Result<String, GatewayFailure> {
        self.record("create_order");
        self.order.lock().unwrap().clone()
    }

    async fn create_payment(&self, req: PaymentRequest) -> Result<PaymentRecord, GatewayFailure> {
        self.record("create_payment");
        self.payment_requests.lock().unwrap().push(req);
        self.payment.lock().unwrap().clone()
    }

    async fn complete_payment(&self, _payment_id: &str) -> Result<PaymentRecord, GatewayFailure> {
        self.record("complete_payment");
        self.payment.lock().unwrap().clone()
    }

    async fn cancel_payment(&self, _payment_id: &str) -> Result<PaymentRecord, GatewayFailure> {
        self.record("cancel_payment");
        self.payment.lock().unwrap().clone()
    }

    async fn retrieve_transaction(&self, _transaction_id: &str) -> Result<TransactionRecord, GatewayFailure> {
        self.record("retrieve_transaction");
        self.transaction.lock().unwrap().clone()
    }

    async fn create_customer(&self, req: CustomerRequest) -> Result<String, GatewayFailure> {
        self.record("create_customer");
        self.customer_requests.lock().unwrap().push(req);
        self.customer.lock().unwrap().clone()
    }

    async fn create_customer_card(&self, req: CardRequest) -> Result<CardRecord, GatewayFailure> {
        self.record("create_customer_card");
        self.card_requests.lock().unwrap().push(req);
        self.card.lock().unwrap().clone()
    }

    async fn delete_customer_card(&self, _customer_id: &str, _card_id: &str) -> Result<(), GatewayFailure> {
        self.record("delete_customer_card");
        self.delete.lock().unwrap().clone()
    }
}
