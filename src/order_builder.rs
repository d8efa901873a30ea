// Converts host documents into gateway-neutral orders

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::model::{DocumentKind, SaleDocument};

pub const TAX_ENTRY_NAME: &str = "TAX";
const PERCENT_SCALE: u32 = 6;

/// Amount in the currency's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayDiscount {
    pub name: String,
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTax {
    pub name: String,
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayLineItem {
    pub name: String,
    pub quantity: String,
    pub base_price: Money,
    #[serde(default)]
    pub discounts: Vec<GatewayDiscount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub reference: String,
    pub line_items: Vec<GatewayLineItem>,
    pub taxes: Vec<GatewayTax>,
    pub discounts: Vec<GatewayDiscount>,
}

/// Untaxed totals of the orders deposit lines point back to, keyed by order name.
#[derive(Debug, Clone, Default)]
pub struct DepositBases(HashMap<String, Decimal>);

impl DepositBases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, origin: impl Into<String>, amount_untaxed: Decimal) {
        self.0.insert(origin.into(), amount_untaxed);
    }

    pub fn get(&self, origin: &str) -> Option<Decimal> {
        self.0.get(origin).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderBuilder {
    deposit_product_id: Option<String>,
}

impl OrderBuilder {
    pub fn new(deposit_product_id: Option<String>) -> Self {
        Self {
            deposit_product_id: deposit_product_id.filter(|id| !id.is_empty()),
        }
    }

    fn is_deposit_line(&self, kind: DocumentKind, product_id: &str, quantity: Decimal) -> bool {
        kind == DocumentKind::Invoice
            && quantity.is_sign_negative()
            && !quantity.is_zero()
            && self.deposit_product_id.as_deref() == Some(product_id)
    }

    /// Origins whose untaxed amount must be supplied in [`DepositBases`].
    pub fn deposit_origins<'a>(&self, document: &'a SaleDocument) -> Vec<&'a str> {
        document
            .lines
            .iter()
            .filter(|l| self.is_deposit_line(document.kind, &l.product_id, l.quantity))
            .filter_map(|l| l.origin.as_deref())
            .collect()
    }

    /// Assemble the gateway order for `reference` from `document`.
    ///
    /// Pure: the same inputs always produce the same order.
    pub fn build(
        &self,
        reference: &str,
        document: &SaleDocument,
        deposits: &DepositBases,
    ) -> Result<GatewayOrder, AdapterError> {
        let mut line_items = Vec::with_capacity(document.lines.len());
        let mut discounts = Vec::new();

        for line in &document.lines {
            if self.is_deposit_line(document.kind, &line.product_id, line.quantity) {
                let origin = line.origin.as_deref().ok_or_else(|| {
                    AdapterError::validation(format!(
                        "deposit line '{}' on {} has no origin",
                        line.product_name, document.name
                    ))
                })?;
                let base = deposits
                    .get(origin)
                    .filter(|b| !b.is_zero())
                    .ok_or_else(|| {
                        AdapterError::validation(format!(
                            "no untaxed amount for deposit origin {origin}"
                        ))
                    })?;
                let pct = percentage_of(line.price_subtotal, base)?.abs();
                discounts.push(GatewayDiscount {
                    name: line.product_name.clone(),
                    percentage: format_decimal(pct),
                });
                continue;
            }

            let mut line_discounts = Vec::new();
            if !line.discount.is_zero() {
                line_discounts.push(GatewayDiscount {
                    name: format!("Discount {}", format_decimal(line.discount)),
                    percentage: format_decimal(line.discount.round_dp(PERCENT_SCALE).abs()),
                });
            }
            line_items.push(GatewayLineItem {
                name: line.product_name.clone(),
                quantity: format_decimal(line.quantity.abs()),
                base_price: Money {
                    amount: to_minor_units(line.price_unit)?,
                    currency: document.currency.clone(),
                },
                discounts: line_discounts,
            });
        }

        let mut taxes = Vec::new();
        if let Some(pct) = blended_tax_percentage(document.amount_tax, document.amount_untaxed)? {
            taxes.push(GatewayTax {
                name: TAX_ENTRY_NAME.to_string(),
                percentage: format_decimal(pct),
            });
        }

        Ok(GatewayOrder {
            reference: reference.to_string(),
            line_items,
            taxes,
            discounts,
        })
    }
}

/// Single order-level tax percentage covering every tax line.
pub fn blended_tax_percentage(
    amount_tax: Decimal,
    amount_untaxed: Decimal,
) -> Result<Option<Decimal>, AdapterError> {
    if amount_tax.is_zero() {
        return Ok(None);
    }
    if amount_untaxed.is_zero() {
        return Err(AdapterError::validation(
            "document has tax but no untaxed amount",
        ));
    }
    percentage_of(amount_tax, amount_untaxed).map(Some)
}

/// `round(100 * part / whole, 6)`, failing instead of overflowing.
fn percentage_of(part: Decimal, whole: Decimal) -> Result<Decimal, AdapterError> {
    Decimal::ONE_HUNDRED
        .checked_mul(part)
        .and_then(|p| p.checked_div(whole))
        .map(|p| p.round_dp(PERCENT_SCALE))
        .ok_or_else(|| AdapterError::validation(format!("percentage of {part} over {whole} out of range")))
}

/// `round(amount * 100)` as an integer count of minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, AdapterError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|a| a.round().to_i64())
        .ok_or_else(|| AdapterError::validation(format!("amount {amount} out of range")))
}

/// Decimal string with at least one fractional digit: `15` -> `"15.0"`.
pub fn format_decimal(value: Decimal) -> String {
    let n = value.normalize();
    if n.scale() == 0 {
        format!("{n}.0")
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentLine;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(product: &str, qty: &str, price: &str) -> DocumentLine {
        DocumentLine {
            product_id: product.to_string(),
            product_name: format!("Product {product}"),
            quantity: d(qty),
            price_unit: d(price),
            discount: Decimal::ZERO,
            price_subtotal: d(qty) * d(price),
            origin: None,
        }
    }

    fn document(kind: DocumentKind, lines: Vec<DocumentLine>, untaxed: &str, tax: &str) -> SaleDocument {
        SaleDocument {
            kind,
            name: "INV/2024/0001".into(),
            currency: "USD".into(),
            lines,
            amount_untaxed: d(untaxed),
            amount_tax: d(tax),
        }
    }

    #[test]
    fn test_blended_tax_entry() {
        let doc = document(DocumentKind::Invoice, vec![line("1", "1", "100.00")], "100.00", "15.00");
        let order = OrderBuilder::default()
            .build("INV/2024/0001-1", &doc, &DepositBases::new())
            .unwrap();
        assert_eq!(
            order.taxes,
            vec![GatewayTax {
                name: "TAX".into(),
                percentage: "15.0".into()
            }]
        );
        assert_eq!(order.reference, "INV/2024/0001-1");
    }

    #[test]
    fn test_no_tax_means_no_tax_entry() {
        let doc = document(DocumentKind::SaleOrder, vec![line("1", "2", "9.99")], "19.98", "0");
        let order = OrderBuilder::default()
            .build("S1", &doc, &DepositBases::new())
            .unwrap();
        assert!(order.taxes.is_empty());
        assert!(order.discounts.is_empty());
    }

    #[test]
    fn test_tax_percentage_rounded_to_six_digits() {
        let pct = blended_tax_percentage(d("10"), d("30")).unwrap().unwrap();
        assert_eq!(format_decimal(pct), "33.333333");
    }

    #[test]
    fn test_tax_without_untaxed_amount_is_rejected() {
        assert!(matches!(
            blended_tax_percentage(d("1"), Decimal::ZERO),
            Err(AdapterError::Validation(_))
        ));
    }

    #[test]
    fn test_line_amounts_and_quantities() {
        let doc = document(
            DocumentKind::Invoice,
            vec![line("1", "-2", "10.015"), line("2", "3", "0.07")],
            "20.24",
            "0",
        );
        let order = OrderBuilder::default()
            .build("INV-1", &doc, &DepositBases::new())
            .unwrap();
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.line_items[0].quantity, "2.0");
        assert_eq!(order.line_items[0].base_price.amount, 1002);
        assert_eq!(order.line_items[0].base_price.currency, "USD");
        assert_eq!(order.line_items[1].base_price.amount, 7);
    }

    #[test]
    fn test_line_discount_attached_to_line() {
        let mut l = line("1", "1", "50");
        l.discount = d("12.5");
        let doc = document(DocumentKind::SaleOrder, vec![l], "43.75", "0");
        let order = OrderBuilder::default()
            .build("S1", &doc, &DepositBases::new())
            .unwrap();
        assert_eq!(
            order.line_items[0].discounts,
            vec![GatewayDiscount {
                name: "Discount 12.5".into(),
                percentage: "12.5".into()
            }]
        );
    }

    #[test]
    fn test_deposit_line_becomes_order_discount() {
        let mut deposit = line("DEP", "-1", "30");
        deposit.product_name = "Down payment".into();
        deposit.price_subtotal = d("-30");
        deposit.origin = Some("S00042".into());
        let doc = document(
            DocumentKind::Invoice,
            vec![line("1", "1", "120"), deposit],
            "90",
            "0",
        );
        let builder = OrderBuilder::new(Some("DEP".into()));
        assert_eq!(builder.deposit_origins(&doc), vec!["S00042"]);

        let mut bases = DepositBases::new();
        bases.insert("S00042", d("120"));
        let order = builder.build("INV-1", &doc, &bases).unwrap();
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(
            order.discounts,
            vec![GatewayDiscount {
                name: "Down payment".into(),
                percentage: "25.0".into()
            }]
        );
    }

    #[test]
    fn test_deposit_without_known_origin_fails() {
        let mut deposit = line("DEP", "-1", "30");
        deposit.origin = Some("S00042".into());
        let doc = document(DocumentKind::Invoice, vec![deposit], "0", "0");
        let err = OrderBuilder::new(Some("DEP".into()))
            .build("INV-1", &doc, &DepositBases::new())
            .unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }

    #[test]
    fn test_deposit_product_on_sale_order_is_a_normal_line() {
        let doc = document(DocumentKind::SaleOrder, vec![line("DEP", "-1", "30")], "-30", "0");
        let builder = OrderBuilder::new(Some("DEP".into()));
        assert!(builder.deposit_origins(&doc).is_empty());
        let order = builder.build("S1", &doc, &DepositBases::new()).unwrap();
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].quantity, "1.0");
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut l = line("1", "1.5", "19.99");
        l.discount = d("5");
        let doc = document(DocumentKind::Invoice, vec![l, line("2", "4", "1.25")], "33.49", "2.51");
        let builder = OrderBuilder::default();
        let a = builder.build("INV-7", &doc, &DepositBases::new()).unwrap();
        let b = builder.build("INV-7", &doc, &DepositBases::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(d("15")), "15.0");
        assert_eq!(format_decimal(d("15.000000")), "15.0");
        assert_eq!(format_decimal(d("7.250")), "7.25");
        assert_eq!(format_decimal(d("0")), "0.0");
    }

    #[test]
    fn test_overflow_is_a_validation_error() {
        assert!(matches!(to_minor_units(Decimal::MAX), Err(AdapterError::Validation(_))));
        assert!(matches!(
            blended_tax_percentage(Decimal::MAX, Decimal::new(1, 28)),
            Err(AdapterError::Validation(_))
        ));

        let doc = document(DocumentKind::Invoice, vec![line("1", "1", &Decimal::MAX.to_string())], "1", "0");
        let err = OrderBuilder::default().build("INV-1", &doc, &DepositBases::new()).unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }
}
