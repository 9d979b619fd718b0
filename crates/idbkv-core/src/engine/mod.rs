//! Host storage engine contract
//!
//! The client depends on exactly this capability set:
//!
//! - open a database at a version, running the schema step on upgrade
//! - per-transaction `add`/`get`/`put`/`delete` scoped to one store
//! - a forward cursor over a store in key order
//! - delete a database
//!
//! Implementations exist for:
//!
//! - **Memory**: in-process engine with IndexedDB semantics (`MemoryEngine`)
//! - **IndexedDB**: browser storage via web-sys (separate crate, WASM only)
//!
//! Hosts are single-threaded, so every future here is `?Send`.

pub mod memory;

use async_trait::async_trait;

use crate::config::StoreSchema;
use crate::error::EngineResult;
use crate::key::Key;
use crate::record::{Entry, Record};

pub use memory::{Fault, MemoryEngine, RequestKind};

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// A request to open a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Database name
    pub name: String,
    /// Requested version; `None` opens whatever version is stored
    pub version: Option<u32>,
    /// Store to ensure during an upgrade
    pub schema: Option<StoreSchema>,
}

impl OpenRequest {
    /// Open `name` at `version`, ensuring `schema` if an upgrade runs.
    pub fn versioned(name: impl Into<String>, version: u32, schema: StoreSchema) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
            schema: Some(schema),
        }
    }

    /// Open `name` at its current version without touching the schema.
    pub fn existing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            schema: None,
        }
    }
}

/// A host storage engine.
#[async_trait(?Send)]
pub trait StorageEngine {
    type Connection: EngineConnection;

    /// Open (creating if absent) a database.
    ///
    /// When the database is new or stored at a lower version, the engine runs
    /// [`crate::schema::ensure_schema`] with the request's schema before the
    /// connection is handed back. A failed schema step fails the open.
    async fn open(&self, request: OpenRequest) -> EngineResult<Self::Connection>;

    /// Delete a database. Deleting a database that does not exist succeeds.
    async fn delete_database(&self, name: &str) -> EngineResult<()>;
}

/// A live connection to one database.
pub trait EngineConnection {
    type Transaction: EngineTransaction;

    /// Database name.
    fn name(&self) -> &str;

    /// Database version at the time the connection opened.
    fn version(&self) -> u32;

    /// Names of the object stores in the database.
    fn store_names(&self) -> Vec<String>;

    /// Start a transaction scoped to one store.
    fn transaction(&self, store: &str, mode: TransactionMode) -> EngineResult<Self::Transaction>;

    /// Release the connection. Data is untouched.
    fn close(self);
}

/// A transaction over a single object store.
///
/// A failed request aborts the transaction; `commit` then reports the abort
/// and none of the transaction's writes persist.
#[async_trait(?Send)]
pub trait EngineTransaction {
    type Cursor: EngineCursor;

    fn mode(&self) -> TransactionMode;

    /// Insert a new record. Fails with a constraint error if the key exists.
    async fn add(&self, value: Record) -> EngineResult<Key>;

    /// Insert or replace a record.
    async fn put(&self, value: Record) -> EngineResult<Key>;

    async fn get(&self, key: &Key) -> EngineResult<Option<Record>>;

    /// Delete the record at `key`. Succeeds when there is none.
    async fn delete(&self, key: &Key) -> EngineResult<()>;

    /// Open a forward cursor positioned before the first record.
    async fn open_cursor(&self) -> EngineResult<Self::Cursor>;

    /// Wait for the transaction to complete.
    async fn commit(self) -> EngineResult<()>;
}

/// Forward cursor in ascending key order.
#[async_trait(?Send)]
pub trait EngineCursor {
    /// Advance to the next record. `None` once the store is exhausted.
    async fn next_entry(&mut self) -> EngineResult<Option<Entry>>;
}

/// Schema operations available while a version change is in progress.
pub trait UpgradeTarget {
    fn has_store(&self, name: &str) -> bool;

    fn create_store(&mut self, schema: &StoreSchema) -> EngineResult<()>;
}

/// Versions involved in an upgrade. `old_version` is 0 for a new database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    pub old_version: u32,
    pub new_version: u32,
}
