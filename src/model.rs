//! Host-side records the adapter reads and mutates.
//!
//! Persistence belongs to the host; these are plain data carried through the
//! repositories in [`crate::store`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    SaleOrder,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::SaleOrder => "sale_order",
        }
    }
}

/// One invoice or order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub product_id: String,
    pub product_name: String,
    /// Invoiced quantity for invoices, ordered quantity for sale orders.
    pub quantity: Decimal,
    pub price_unit: Decimal,
    /// Line discount in percent, zero when none.
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub price_subtotal: Decimal,
    /// Name of the document this line was generated from (deposit lines).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Invoice or sale order, read-only to the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleDocument {
    pub kind: DocumentKind,
    pub name: String,
    pub currency: String,
    pub lines: Vec<DocumentLine>,
    pub amount_untaxed: Decimal,
    pub amount_tax: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Draft,
    Pending,
    Authorized,
    Done,
    Cancel,
    Error,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Done | TransactionState::Cancel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub state: TransactionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
}

impl Transaction {
    pub fn new(id: impl Into<String>, reference: impl Into<String>, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reference: reference.into(),
            amount,
            currency: currency.into(),
            state: TransactionState::Draft,
            state_message: None,
            gateway_reference: None,
            gateway_order_id: None,
            payment_token_id: None,
            partner_id: None,
        }
    }

    /// Name of the originating document encoded in the reference.
    ///
    /// `S00042x2` -> `S00042`, `INV/2024/0001-1` -> `INV/2024/0001`.
    pub fn document_name(&self) -> &str {
        let sep = if self.reference.contains('x') { 'x' } else { '-' };
        self.reference.split(sep).next().unwrap_or(&self.reference)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentToken {
    pub id: String,
    /// Masked card label shown to the buyer.
    pub name: String,
    pub gateway_card_id: String,
    pub customer_id: String,
    pub partner_id: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub administrative_district: String,
    #[serde(default)]
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub is_company: bool,
    #[serde(default)]
    pub address: Address,
    /// Designated invoice contact address for companies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_customer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    Individual,
    Business,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerBillingProfile {
    pub customer_type: CustomerType,
    pub billing: Address,
}

impl Partner {
    /// Given names and family name, split on the last word.
    pub fn split_name(&self) -> (String, String) {
        let words: Vec<&str> = self.name.split_whitespace().collect();
        match words.split_last() {
            Some((family, given)) => (given.join(" "), family.to_string()),
            None => (String::new(), String::new()),
        }
    }

    pub fn billing_profile(&self) -> PartnerBillingProfile {
        if self.is_company {
            PartnerBillingProfile {
                customer_type: CustomerType::Business,
                billing: self
                    .invoice_address
                    .clone()
                    .unwrap_or_else(|| self.address.clone()),
            }
        } else {
            PartnerBillingProfile {
                customer_type: CustomerType::Individual,
                billing: self.address.clone(),
            }
        }
    }
}
