//! Repositories the host framework provides.
//!
//! The adapter never stores anything itself; every lookup goes through the
//! traits bundled in [`Context`]. [`MemoryStore`] implements all of them for
//! embedding hosts that keep records in memory, and for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AdapterError;
use crate::model::{DocumentKind, Partner, PaymentToken, SaleDocument, Transaction};

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Look up a document by name, invoices before sale orders.
    async fn find_document(&self, name: &str) -> Result<Option<SaleDocument>, AdapterError>;
    /// Insert or replace the document with the same kind and name.
    async fn save_document(&self, doc: &SaleDocument) -> Result<(), AdapterError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// All transactions carrying `reference`. More than one is a host-side inconsistency.
    async fn find_by_reference(&self, reference: &str) -> Result<Vec<Transaction>, AdapterError>;
    async fn save_transaction(&self, tx: &Transaction) -> Result<(), AdapterError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn get_token(&self, id: &str) -> Result<Option<PaymentToken>, AdapterError>;
    async fn save_token(&self, token: &PaymentToken) -> Result<(), AdapterError>;
    async fn delete_token(&self, id: &str) -> Result<(), AdapterError>;
}

#[async_trait]
pub trait PartnerRepository: Send + Sync {
    async fn get_partner(&self, id: &str) -> Result<Option<Partner>, AdapterError>;
    async fn save_partner(&self, partner: &Partner) -> Result<(), AdapterError>;
}

/// Explicit lookup context passed to every operation.
#[derive(Clone)]
pub struct Context {
    pub documents: Arc<dyn DocumentRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub partners: Arc<dyn PartnerRepository>,
}

impl Context {
    /// Use one store for every repository.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: DocumentRepository + TransactionRepository + TokenRepository + PartnerRepository + 'static,
    {
        Self {
            documents: store.clone(),
            transactions: store.clone(),
            tokens: store.clone(),
            partners: store,
        }
    }

    /// The single transaction for `reference`.
    pub async fn transaction(&self, reference: &str) -> Result<Transaction, AdapterError> {
        if reference.is_empty() {
            return Err(AdapterError::validation("received data with missing reference"));
        }
        let mut found = self.transactions.find_by_reference(reference).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(AdapterError::validation(format!(
                "received data for reference {reference}; no order found"
            ))),
            _ => Err(AdapterError::validation(format!(
                "received data for reference {reference}; multiple order found"
            ))),
        }
    }

    /// Store a host transaction, keeping references unique and terminal records untouched.
    pub async fn register_transaction(&self, tx: &Transaction) -> Result<(), AdapterError> {
        if tx.reference.is_empty() {
            return Err(AdapterError::validation("transaction has no reference"));
        }
        let existing = self.transactions.find_by_reference(&tx.reference).await?;
        if let Some(other) = existing.iter().find(|t| t.id != tx.id) {
            return Err(AdapterError::invalid_state(format!(
                "reference {} already belongs to transaction {}",
                tx.reference, other.id
            )));
        }
        if let Some(current) = existing.iter().find(|t| t.id == tx.id) {
            if current.state.is_terminal() {
                return Err(AdapterError::invalid_state(format!(
                    "transaction {} is {:?} and can no longer be replaced",
                    tx.reference, current.state
                )));
            }
        }
        self.transactions.save_transaction(tx).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(DocumentKind, String), SaleDocument>>,
    transactions: RwLock<HashMap<String, Transaction>>,
    tokens: RwLock<HashMap<String, PaymentToken>>,
    partners: RwLock<HashMap<String, Partner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_document(&self, doc: SaleDocument) {
        self.documents
            .write()
            .await
            .insert((doc.kind, doc.name.clone()), doc);
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn find_document(&self, name: &str) -> Result<Option<SaleDocument>, AdapterError> {
        let docs = self.documents.read().await;
        Ok(docs
            .get(&(DocumentKind::Invoice, name.to_string()))
            .or_else(|| docs.get(&(DocumentKind::SaleOrder, name.to_string())))
            .cloned())
    }

    async fn save_document(&self, doc: &SaleDocument) -> Result<(), AdapterError> {
        self.insert_document(doc.clone()).await;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn find_by_reference(&self, reference: &str) -> Result<Vec<Transaction>, AdapterError> {
        let txs = self.transactions.read().await;
        Ok(txs.values().filter(|t| t.reference == reference).cloned().collect())
    }

    async fn save_transaction(&self, tx: &Transaction) -> Result<(), AdapterError> {
        self.transactions.write().await.insert(tx.id.clone(), tx.clone());
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn get_token(&self, id: &str) -> Result<Option<PaymentToken>, AdapterError> {
        Ok(self.tokens.read().await.get(id).cloned())
    }

    async fn save_token(&self, token: &PaymentToken) -> Result<(), AdapterError> {
        self.tokens.write().await.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn delete_token(&self, id: &str) -> Result<(), AdapterError> {
        self.tokens.write().await.remove(id);
        Ok(())
    }
}

#[async_trait]
impl PartnerRepository for MemoryStore {
    async fn get_partner(&self, id: &str) -> Result<Option<Partner>, AdapterError> {
        Ok(self.partners.read().await.get(id).cloned())
    }

    async fn save_partner(&self, partner: &Partner) -> Result<(), AdapterError> {
        self.partners.write().await.insert(partner.id.clone(), partner.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionState;
    use rust_decimal::Decimal;

    fn doc(kind: DocumentKind, name: &str) -> SaleDocument {
        SaleDocument {
            kind,
            name: name.into(),
            currency: "USD".into(),
            lines: vec![],
            amount_untaxed: Decimal::ZERO,
            amount_tax: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn test_invoice_found_before_sale_order() {
        let store = MemoryStore::new();
        store.insert_document(doc(DocumentKind::SaleOrder, "S1")).await;
        assert_eq!(
            store.find_document("S1").await.unwrap().unwrap().kind,
            DocumentKind::SaleOrder
        );
        store.insert_document(doc(DocumentKind::Invoice, "S1")).await;
        assert_eq!(
            store.find_document("S1").await.unwrap().unwrap().kind,
            DocumentKind::Invoice
        );
    }

    #[tokio::test]
    async fn test_unique_transaction_lookup() {
        let store = Arc::new(MemoryStore::new());
        let ctx = Context::from_store(store.clone());

        assert!(matches!(ctx.transaction("").await, Err(AdapterError::Validation(_))));
        assert!(matches!(ctx.transaction("S1").await, Err(AdapterError::Validation(_))));

        store
            .save_transaction(&Transaction::new("1", "S1", Decimal::ONE, "USD"))
            .await
            .unwrap();
        assert_eq!(ctx.transaction("S1").await.unwrap().id, "1");

        store
            .save_transaction(&Transaction::new("2", "S1", Decimal::ONE, "USD"))
            .await
            .unwrap();
        let err = ctx.transaction("S1").await.unwrap_err();
        assert!(err.to_string().contains("multiple order found"));
    }

    #[tokio::test]
    async fn test_register_transaction() {
        let store = Arc::new(MemoryStore::new());
        let ctx = Context::from_store(store.clone());

        let mut tx = Transaction::new("1", "S1-1", Decimal::ONE, "USD");
        ctx.register_transaction(&tx).await.unwrap();
        tx.amount = Decimal::TWO;
        ctx.register_transaction(&tx).await.unwrap();
        assert_eq!(ctx.transaction("S1-1").await.unwrap().amount, Decimal::TWO);

        let dup = Transaction::new("2", "S1-1", Decimal::ONE, "USD");
        assert!(matches!(ctx.register_transaction(&dup).await, Err(AdapterError::InvalidState(_))));

        tx.state = TransactionState::Done;
        store.save_transaction(&tx).await.unwrap();
        let mut replay = tx.clone();
        replay.state = TransactionState::Draft;
        assert!(matches!(ctx.register_transaction(&replay).await, Err(AdapterError::InvalidState(_))));
        assert_eq!(ctx.transaction("S1-1").await.unwrap().state, TransactionState::Done);

        let blank = Transaction::new("3", "", Decimal::ONE, "USD");
        assert!(matches!(ctx.register_transaction(&blank).await, Err(AdapterError::Validation(_))));
    }
}
