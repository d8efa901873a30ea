// Minimal Square v2 DTOs and conversions from the gateway-neutral types
use serde::{Deserialize, Serialize};

use crate::gateway::{
    CardRecord, CardRequest, CardStatus, CheckoutRequest, CheckoutSession, CustomerRequest,
    PaymentRecord, PaymentRequest, PaymentStatus, Tender, TransactionRecord,
};
use crate::model::Address;
use crate::order_builder::{GatewayOrder, Money};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareMoney {
    pub amount: i64,
    pub currency: String,
}

impl From<&Money> for SquareMoney {
    fn from(m: &Money) -> Self {
        Self {
            amount: m.amount,
            currency: m.currency.clone(),
        }
    }
}

impl From<SquareMoney> for Money {
    fn from(m: SquareMoney) -> Self {
        Money {
            amount: m.amount,
            currency: m.currency,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareAddress {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address_line_1: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address_line_2: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locality: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub administrative_district_level_1: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
}

impl From<&Address> for SquareAddress {
    fn from(a: &Address) -> Self {
        Self {
            address_line_1: a.line1.clone(),
            address_line_2: a.line2.clone(),
            locality: a.locality.clone(),
            administrative_district_level_1: a.administrative_district.clone(),
            postal_code: a.postal_code.clone(),
            country: a.country.clone(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }
}

// Orders

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub discount_uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareLineItem {
    pub name: String,
    pub quantity: String,
    pub base_price_money: SquareMoney,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_discounts: Vec<AppliedDiscount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareDiscount {
    pub uid: String,
    pub name: String,
    pub percentage: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareTax {
    pub uid: String,
    pub name: String,
    pub percentage: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareOrder {
    pub location_id: String,
    pub reference_id: String,
    pub line_items: Vec<SquareLineItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taxes: Vec<SquareTax>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discounts: Vec<SquareDiscount>,
}

impl SquareOrder {
    /// Line discounts become LINE_ITEM-scoped discounts referenced by uid;
    /// document discounts and the blended tax are ORDER-scoped.
    pub fn from_gateway(order: &GatewayOrder, location_id: &str) -> Self {
        let mut discounts = Vec::new();
        let line_items = order
            .line_items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let applied_discounts = item
                    .discounts
                    .iter()
                    .enumerate()
                    .map(|(j, d)| {
                        let uid = format!("line-{i}-discount-{j}");
                        discounts.push(SquareDiscount {
                            uid: uid.clone(),
                            name: d.name.clone(),
                            percentage: d.percentage.clone(),
                            scope: "LINE_ITEM".to_string(),
                        });
                        AppliedDiscount { discount_uid: uid }
                    })
                    .collect();
                SquareLineItem {
                    name: item.name.clone(),
                    quantity: item.quantity.clone(),
                    base_price_money: SquareMoney::from(&item.base_price),
                    applied_discounts,
                }
            })
            .collect();

        discounts.extend(order.discounts.iter().enumerate().map(|(k, d)| SquareDiscount {
            uid: format!("order-discount-{k}"),
            name: d.name.clone(),
            percentage: d.percentage.clone(),
            scope: "ORDER".to_string(),
        }));

        let taxes = order
            .taxes
            .iter()
            .enumerate()
            .map(|(k, t)| SquareTax {
                uid: format!("order-tax-{k}"),
                name: t.name.clone(),
                percentage: t.percentage.clone(),
                scope: "ORDER".to_string(),
            })
            .collect();

        Self {
            location_id: location_id.to_string(),
            reference_id: order.reference.clone(),
            line_items,
            taxes,
            discounts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub idempotency_key: String,
    pub order: SquareOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order: CreatedOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: String,
}

// Payments

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub idempotency_key: String,
    pub amount_money: SquareMoney,
    pub source_id: String,
    pub autocomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub location_id: String,
    pub order_id: String,
    pub reference_id: String,
}

impl CreatePaymentRequest {
    pub fn from_gateway(req: PaymentRequest, location_id: &str) -> Self {
        Self {
            idempotency_key: req.idempotency_key,
            amount_money: SquareMoney::from(&req.amount),
            source_id: req.source_id,
            autocomplete: req.autocomplete,
            customer_id: req.customer_id.filter(|c| !c.is_empty()),
            location_id: location_id.to_string(),
            order_id: req.order_id,
            reference_id: req.reference_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardPaymentDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_details: Option<CardPaymentDetails>,
}

impl From<Payment> for PaymentRecord {
    fn from(p: Payment) -> Self {
        PaymentRecord {
            status: PaymentStatus::from(p.status.as_str()),
            card_status: p
                .card_details
                .and_then(|c| c.status)
                .map(|s| CardStatus::from(s.as_str())),
            id: p.id,
            order_id: p.order_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub payment: Payment,
}

// Hosted checkout

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub idempotency_key: String,
    pub order: CreateOrderRequest,
    pub ask_for_shipping_address: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub merchant_support_email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pre_populate_buyer_email: String,
    pub pre_populate_shipping_address: SquareAddress,
    pub redirect_url: String,
}

impl CreateCheckoutRequest {
    pub fn from_gateway(req: CheckoutRequest, location_id: &str) -> Self {
        let mut shipping = SquareAddress::from(&req.shipping_address.address);
        shipping.first_name = req.shipping_address.first_name;
        shipping.last_name = req.shipping_address.last_name;
        Self {
            idempotency_key: req.idempotency_key,
            order: CreateOrderRequest {
                idempotency_key: req.order_idempotency_key,
                order: SquareOrder::from_gateway(&req.order, location_id),
            },
            ask_for_shipping_address: req.ask_for_shipping_address,
            merchant_support_email: req.merchant_support_email,
            pre_populate_buyer_email: req.buyer_email,
            pre_populate_shipping_address: shipping,
            redirect_url: req.redirect_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub id: String,
    pub checkout_page_url: String,
}

impl From<Checkout> for CheckoutSession {
    fn from(c: Checkout) -> Self {
        CheckoutSession {
            id: c.id,
            checkout_page_url: c.checkout_page_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout: Checkout,
}

// Transactions (hosted checkout result)

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderCardDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareTender {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_money: Option<SquareMoney>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_details: Option<TenderCardDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareTransaction {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub tenders: Vec<SquareTender>,
}

impl From<SquareTransaction> for TransactionRecord {
    fn from(t: SquareTransaction) -> Self {
        TransactionRecord {
            id: t.id,
            reference_id: t.reference_id,
            order_id: t.order_id,
            tenders: t
                .tenders
                .into_iter()
                .map(|tender| Tender {
                    id: tender.id,
                    amount: tender.amount_money.map(Money::from),
                    card_status: tender
                        .card_details
                        .and_then(|c| c.status)
                        .map(|s| CardStatus::from(s.as_str())),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction: SquareTransaction,
}

// Customers and cards

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub idempotency_key: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    pub address: SquareAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub reference_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
}

impl From<CustomerRequest> for CreateCustomerRequest {
    fn from(req: CustomerRequest) -> Self {
        Self {
            idempotency_key: req.idempotency_key,
            given_name: req.given_name,
            family_name: req.family_name,
            email_address: req.email,
            address: SquareAddress::from(&req.address),
            phone_number: req.phone,
            reference_id: req.reference_id,
            note: req.note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub customer: Customer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSpec {
    pub customer_id: String,
    pub billing_address: SquareAddress,
    pub cardholder_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardRequest {
    pub idempotency_key: String,
    pub source_id: String,
    pub card: CardSpec,
}

impl From<CardRequest> for CreateCardRequest {
    fn from(req: CardRequest) -> Self {
        Self {
            idempotency_key: req.idempotency_key,
            source_id: req.card_nonce,
            card: CardSpec {
                customer_id: req.customer_id,
                billing_address: SquareAddress::from(&req.billing_address),
                cardholder_name: req.cardholder_name,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_4: Option<String>,
}

impl From<Card> for CardRecord {
    fn from(c: Card) -> Self {
        CardRecord {
            id: c.id,
            last_4: c.last_4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardResponse {
    pub card: Card,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_builder::{GatewayDiscount, GatewayLineItem, GatewayTax};

    #[test]
    fn test_order_discounts_are_scoped() {
        let order = GatewayOrder {
            reference: "INV-1".into(),
            line_items: vec![GatewayLineItem {
                name: "Chair".into(),
                quantity: "2.0".into(),
                base_price: Money {
                    amount: 4500,
                    currency: "USD".into(),
                },
                discounts: vec![GatewayDiscount {
                    name: "Discount 10.0".into(),
                    percentage: "10.0".into(),
                }],
            }],
            taxes: vec![GatewayTax {
                name: "TAX".into(),
                percentage: "15.0".into(),
            }],
            discounts: vec![GatewayDiscount {
                name: "Down payment".into(),
                percentage: "25.0".into(),
            }],
        };
        let sq = SquareOrder::from_gateway(&order, "L1");
        assert_eq!(sq.location_id, "L1");
        assert_eq!(sq.reference_id, "INV-1");
        assert_eq!(sq.line_items[0].applied_discounts[0].discount_uid, "line-0-discount-0");
        assert_eq!(sq.discounts.len(), 2);
        assert_eq!(sq.discounts[0].scope, "LINE_ITEM");
        assert_eq!(sq.discounts[1].scope, "ORDER");
        assert_eq!(sq.taxes[0].scope, "ORDER");

        let json = serde_json::to_value(&sq).unwrap();
        assert_eq!(json["line_items"][0]["base_price_money"]["amount"], 4500);
        assert_eq!(json["taxes"][0]["percentage"], "15.0");
    }

    #[test]
    fn test_payment_without_card_details() {
        let p: Payment = serde_json::from_str(r#"{"id":"p1","status":"APPROVED"}"#).unwrap();
        let rec = PaymentRecord::from(p);
        assert_eq!(rec.status, PaymentStatus::Approved);
        assert_eq!(rec.card_status, None);
    }

    #[test]
    fn test_empty_address_fields_are_omitted() {
        let addr = SquareAddress::from(&Address {
            line1: "1 Main St".into(),
            ..Default::default()
        });
        let json = serde_json::to_value(&addr).unwrap();
        assert_eq!(json, serde_json::json!({"address_line_1": "1 Main St"}));
    }
}
