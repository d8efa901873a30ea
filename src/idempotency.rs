// Idempotency keys and locally generated customer references

use chrono::NaiveDate;
use uuid::Uuid;

/// Characters always left for the entity id when sizing the random suffixes.
const ENTITY_RESERVE: usize = 8;

/// Gateway endpoints that require an idempotency key, with their limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Payment,
    Order,
    Checkout,
    Customer,
    Card,
}

impl KeyKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyKind::Payment => "PAY",
            KeyKind::Order => "ORDER",
            KeyKind::Checkout => "CHECKOUT",
            KeyKind::Customer => "CUST",
            KeyKind::Card => "CARD",
        }
    }

    /// Length of each random suffix, shrunk so both fit next to the entity reserve.
    fn suffix_len(&self) -> usize {
        let nominal = match self {
            KeyKind::Checkout => 25,
            _ => 15,
        };
        let room = self.max_len() - self.prefix().len() - 3 - ENTITY_RESERVE;
        nominal.min(room / 2)
    }

    /// Maximum key length accepted by the endpoint.
    pub fn max_len(&self) -> usize {
        match self {
            KeyKind::Checkout => 70,
            _ => 35,
        }
    }

    /// `<PREFIX>-<entity>-<random>-<random>`, at most [`KeyKind::max_len`] long.
    ///
    /// Only the entity id is shortened to fit; the random suffixes are kept whole.
    pub fn generate(&self, entity_id: &str) -> String {
        let n = self.suffix_len();
        let entity_room = self.max_len() - self.prefix().len() - 3 - 2 * n;
        let entity: String = entity_id.chars().take(entity_room).collect();
        let a = Uuid::new_v4().simple().to_string();
        let b = Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}-{}", self.prefix(), entity, &a[..n], &b[..n])
    }
}

/// `<prefix><yymmdd><12 hex>` reference attached to a new gateway customer.
pub fn customer_reference(prefix: &str, today: NaiveDate) -> String {
    let rand = Uuid::new_v4().simple().to_string();
    format!("{}{}{}", prefix, today.format("%y%m%d"), &rand[..12])
}
