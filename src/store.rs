use redb::{Database, ReadableTable, TableDefinition};
use rkyv::{AlignedVec, Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("Database creation error: {0}")]
    RedbCreate(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
}

/// Durable record for one normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct UrlRecord {
    /// Normalized URL.
    pub url: String,
    /// Hex SHA-256 of `url`; also the storage key.
    pub hash: String,
    pub completed: bool,
}

impl UrlRecord {
    pub fn discovered(url: String, hash: String) -> Self {
        Self {
            url,
            hash,
            completed: false,
        }
    }
}

/// Key-value persistence for URL records.
///
/// Every write must be durable when the call returns. `flush` exists for
/// backends that buffer; the redb backend commits synchronously and treats
/// it as a no-op.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<UrlRecord>, StoreError>;

    fn put(&self, key: &str, record: &UrlRecord) -> Result<(), StoreError>;

    /// Insert only if `key` is absent. Returns true when the record was written.
    fn put_if_absent(&self, key: &str, record: &UrlRecord) -> Result<bool, StoreError>;

    /// Visit every record. Order is backend-defined.
    fn iterate(
        &self,
        f: &mut dyn FnMut(&str, UrlRecord) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn flush(&self) -> Result<(), StoreError>;

    /// Remove every record.
    fn clear(&self) -> Result<(), StoreError>;
}

const URLS: TableDefinition<&str, &[u8]> = TableDefinition::new("urls");

/// redb-backed store. Each write is its own committed transaction.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)?;

        // Open the table once so read transactions never see it missing.
        let write_txn = db.begin_write()?;
        {
            let _urls = write_txn.open_table(URLS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

fn encode(record: &UrlRecord) -> Result<AlignedVec, StoreError> {
    rkyv::to_bytes::<_, 256>(record)
        .map_err(|e| StoreError::Serialization(format!("Serialize failed: {}", e)))
}

fn decode(bytes: &[u8]) -> Result<UrlRecord, StoreError> {
    let mut aligned = AlignedVec::new();
    aligned.extend_from_slice(bytes);
    // SAFETY: every value in the table was produced by `encode` for `UrlRecord`.
    unsafe { rkyv::from_bytes_unchecked(&aligned) }
        .map_err(|e| StoreError::Serialization(format!("Deserialize failed: {}", e)))
}

impl KvStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<UrlRecord>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(URLS)?;
        let record = match table.get(key)? {
            Some(bytes) => Some(decode(bytes.value())?),
            None => None,
        };
        Ok(record)
    }

    fn put(&self, key: &str, record: &UrlRecord) -> Result<(), StoreError> {
        let serialized = encode(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(URLS)?;
            table.insert(key, serialized.as_ref())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn put_if_absent(&self, key: &str, record: &UrlRecord) -> Result<bool, StoreError> {
        let serialized = encode(record)?;
        // redb serializes write transactions, so the check and the insert are atomic.
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(URLS)?;
            let exists = table.get(key)?.is_some();
            if !exists {
                table.insert(key, serialized.as_ref())?;
            }
            !exists
        };
        if inserted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    fn iterate(
        &self,
        f: &mut dyn FnMut(&str, UrlRecord) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(URLS)?;

        for result in table.iter()? {
            let (key, value) = result?;
            let record = decode(value.value())?;
            f(key.value(), record)?;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(URLS)?;
        Ok(table.len()? as usize)
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(URLS)?;
        {
            let _urls = write_txn.open_table(URLS)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
