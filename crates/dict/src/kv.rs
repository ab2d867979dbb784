//! Custom-dictionary membership store: exact word-in-dictionary lookups
//! keyed by `dict_name + 0x01 + word`, backed by an embedded KV database.

use redb::{Database, ReadableTable, TableDefinition};
use thiserror::Error;
use tracing::debug;

use std::path::Path;

const ENTRIES_TABLE: TableDefinition<&[u8], ()> = TableDefinition::new("dict_entries");

#[derive(Debug, Error)]
pub enum DictKvError {
    #[error("failed to open dict kv store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: redb::DatabaseError,
    },
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

fn composite_key(dict_name: &str, word: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(dict_name.len() + 1 + word.len());
    key.extend_from_slice(dict_name.as_bytes());
    key.push(0x01);
    key.extend_from_slice(word.as_bytes());
    key
}

/// Embedded membership store over `(dict_name, word)` pairs.
pub struct DictKv {
    db: Database,
}

impl DictKv {
    /// Open (creating if absent) the KV database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DictKvError> {
        let path_ref = path.as_ref();
        let db = Database::create(path_ref).map_err(|source| DictKvError::Open {
            path: path_ref.display().to_string(),
            source,
        })?;

        // Ensure the table exists even on a freshly created database.
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(ENTRIES_TABLE)?;
        }
        write_txn.commit()?;

        debug!(path = %path_ref.display(), "dictionary kv store opened");
        Ok(Self { db })
    }

    /// Insert `word` under `dict_name`. Idempotent.
    pub fn insert(&self, dict_name: &str, word: &str) -> Result<(), DictKvError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES_TABLE)?;
            table.insert(composite_key(dict_name, word).as_slice(), ())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Exact membership test: is `word` present in `dict_name`?
    pub fn contains(&self, dict_name: &str, word: &str) -> Result<bool, DictKvError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES_TABLE)?;
        let key = composite_key(dict_name, word);
        Ok(table.get(key.as_slice())?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_insert_and_contains() {
        let dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(dir.path().join("sysdict.redb")).unwrap();

        kv.insert("city_cn", "上海").unwrap();

        assert!(kv.contains("city_cn", "上海").unwrap());
        assert!(!kv.contains("city_cn", "北京").unwrap());
    }

    #[test]
    fn dict_names_do_not_leak_into_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(dir.path().join("sysdict.redb")).unwrap();

        kv.insert("city_cn", "上海").unwrap();
        kv.insert("color", "紫外线").unwrap();

        assert!(!kv.contains("color", "上海").unwrap());
        assert!(kv.contains("color", "紫外线").unwrap());
    }

    #[test]
    fn reopening_an_existing_database_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sysdict.redb");

        {
            let kv = DictKv::open(&path).unwrap();
            kv.insert("city_cn", "上海").unwrap();
        }

        let kv = DictKv::open(&path).unwrap();
        assert!(kv.contains("city_cn", "上海").unwrap());
    }
}
