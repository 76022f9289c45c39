//! SandboxStore: redb-backed persistence for the simulated platform.
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! tests).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};
use crate::tables::*;

/// Convert any `Display` error into a `SandboxError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| SandboxError::$variant(e.to_string())
    };
}

pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct SandboxStore {
    db: Arc<Database>,
}

impl SandboxStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> SandboxResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "sandbox store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> SandboxResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory sandbox store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> SandboxResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for table in [ENVIRONMENTS, EVENTS, LISTENERS, RULES, POOLS, GROUPS, VERSIONS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Records ────────────────────────────────────────────────────

    /// Insert or replace a record.
    pub fn put<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> SandboxResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Codec))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> SandboxResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Codec))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All records of a table, in key order.
    pub fn list<T: DeserializeOwned>(&self, table: JsonTable) -> SandboxResult<Vec<T>> {
        self.list_prefix(table, "")
    }

    /// Records whose key starts with `prefix`, in key order.
    pub fn list_prefix<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        prefix: &str,
    ) -> SandboxResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record = serde_json::from_slice(value.value()).map_err(map_err!(Codec))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    // ── Counters ───────────────────────────────────────────────────

    /// Increment and return the named counter (first value is 1).
    pub fn next_counter(&self, name: &str) -> SandboxResult<u64> {
        self.update_meta(name, |current| current + 1)
    }

    /// Next event timestamp: strictly after both `now` and the previous one.
    pub fn next_timestamp(&self, now: u64) -> SandboxResult<u64> {
        self.update_meta("clock", |last| last.max(now) + 1)
    }

    fn update_meta(&self, name: &str, next: impl FnOnce(u64) -> u64) -> SandboxResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let value;
        {
            let mut table = txn.open_table(META).map_err(map_err!(Table))?;
            let current = table
                .get(name)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);
            value = next(current);
            table.insert(name, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(value)
    }
}
