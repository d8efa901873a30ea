//! redb-backed store for the standalone service
//!
//! Each record is kept as JSON under its natural key. Documents are keyed by
//! `<kind>:<name>` so an invoice and a sale order may share a name.

use anyhow::Result;
use async_trait::async_trait;
use redb::{Database as Redb, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::error::AdapterError;
use crate::model::{DocumentKind, Partner, PaymentToken, SaleDocument, Transaction};
use crate::store::{DocumentRepository, PartnerRepository, TokenRepository, TransactionRepository};

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

const DOCUMENTS_TABLE: JsonTable = TableDefinition::new("documents");
/// Key: transaction id
const TRANSACTIONS_TABLE: JsonTable = TableDefinition::new("transactions");
const TOKENS_TABLE: JsonTable = TableDefinition::new("payment_tokens");
const PARTNERS_TABLE: JsonTable = TableDefinition::new("partners");

#[derive(Clone)]
pub struct Database {
    db: Arc<Redb>,
}

fn document_key(kind: DocumentKind, name: &str) -> String {
    format!("{}:{}", kind.as_str(), name)
}

impl Database {
    /// Create a new database instance or open an existing one
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Redb::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _documents = write_txn.open_table(DOCUMENTS_TABLE)?;
            let _transactions = write_txn.open_table(TRANSACTIONS_TABLE)?;
            let _tokens = write_txn.open_table(TOKENS_TABLE)?;
            let _partners = write_txn.open_table(PARTNERS_TABLE)?;
        }
        write_txn.commit()?;

        tracing::info!("Database initialized");

        Ok(Self { db: Arc::new(db) })
    }

    fn put<V: Serialize>(&self, table: JsonTable, key: &str, value: &V) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            let value = serde_json::to_vec(value)?;
            table.insert(key, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get<V: DeserializeOwned>(&self, table: JsonTable, key: &str) -> Result<Option<V>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let result = table.get(key)?;
        match result {
            Some(curr) => Ok(Some(serde_json::from_slice(curr.value())?)),
            None => Ok(None),
        }
    }

    fn remove(&self, table: JsonTable, key: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Store a sale document as imported from the host.
    pub fn insert_document(&self, doc: &SaleDocument) -> Result<()> {
        self.put(DOCUMENTS_TABLE, &document_key(doc.kind, &doc.name), doc)?;
        tracing::debug!(kind = doc.kind.as_str(), name = %doc.name, "Stored sale document");
        Ok(())
    }

    fn find_document_sync(&self, name: &str) -> Result<Option<SaleDocument>> {
        if let Some(doc) = self.get(DOCUMENTS_TABLE, &document_key(DocumentKind::Invoice, name))? {
            return Ok(Some(doc));
        }
        self.get(DOCUMENTS_TABLE, &document_key(DocumentKind::SaleOrder, name))
    }

    fn transactions_by_reference(&self, reference: &str) -> Result<Vec<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS_TABLE)?;
        let mut found = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let tx: Transaction = serde_json::from_slice(value.value())?;
            if tx.reference == reference {
                found.push(tx);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl DocumentRepository for Database {
    async fn find_document(&self, name: &str) -> Result<Option<SaleDocument>, AdapterError> {
        Ok(self.find_document_sync(name)?)
    }

    async fn save_document(&self, doc: &SaleDocument) -> Result<(), AdapterError> {
        Ok(self.insert_document(doc)?)
    }
}

#[async_trait]
impl TransactionRepository for Database {
    async fn find_by_reference(&self, reference: &str) -> Result<Vec<Transaction>, AdapterError> {
        Ok(self.transactions_by_reference(reference)?)
    }

    async fn save_transaction(&self, tx: &Transaction) -> Result<(), AdapterError> {
        Ok(self.put(TRANSACTIONS_TABLE, &tx.id, tx)?)
    }
}

#[async_trait]
impl TokenRepository for Database {
    async fn get_token(&self, id: &str) -> Result<Option<PaymentToken>, AdapterError> {
        Ok(self.get(TOKENS_TABLE, id)?)
    }

    async fn save_token(&self, token: &PaymentToken) -> Result<(), AdapterError> {
        Ok(self.put(TOKENS_TABLE, &token.id, token)?)
    }

    async fn delete_token(&self, id: &str) -> Result<(), AdapterError> {
        Ok(self.remove(TOKENS_TABLE, id)?)
    }
}

#[async_trait]
impl PartnerRepository for Database {
    async fn get_partner(&self, id: &str) -> Result<Option<Partner>, AdapterError> {
        Ok(self.get(PARTNERS_TABLE, id)?)
    }

    async fn save_partner(&self, partner: &Partner) -> Result<(), AdapterError> {
        Ok(self.put(PARTNERS_TABLE, &partner.id, partner)?)
    }
}
