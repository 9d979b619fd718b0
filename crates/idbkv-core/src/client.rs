//! Storage client over a single object store
//!
//! `StorageClient` owns one engine, one configuration and at most one live
//! connection. Every CRUD call runs in its own short-lived transaction.
//!
//! # Concurrency
//!
//! CRUD methods take `&self`, so a caller can have several in flight at once.
//! The client does not queue or serialize them: overlapping transactions are
//! ordered by the engine, not by call order. Two concurrent writes to the same
//! key have no last-writer-wins guarantee that follows the order they were
//! issued in.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::engine::{
    EngineConnection, EngineCursor, EngineTransaction, OpenRequest, StorageEngine,
    TransactionMode,
};
use crate::error::{ClientError, EngineError, EngineResult, Result};
use crate::key::Key;
use crate::logging::prefix;
use crate::record::{shallow_merge, to_record, Entry, Record};

/// Connection lifecycle of a client.
///
/// `Closed --open--> Open --close--> Closed`. A failed open leaves the state
/// `Closed`; an open in progress is the pending `open` future itself.
#[derive(Debug)]
pub enum ConnectionState<C> {
    Closed,
    Open(C),
}

impl<C> ConnectionState<C> {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open(_))
    }

    /// The live connection, or `NotOpen`.
    fn connection(&self) -> Result<&C> {
        match self {
            ConnectionState::Open(conn) => Ok(conn),
            ConnectionState::Closed => Err(ClientError::NotOpen),
        }
    }
}

/// Async client for one store in one database.
pub struct StorageClient<E: StorageEngine> {
    engine: E,
    config: ClientConfig,
    state: ConnectionState<E::Connection>,
}

impl<E: StorageEngine> StorageClient<E> {
    /// Create a closed client.
    pub fn new(engine: E, config: ClientConfig) -> Self {
        Self {
            engine,
            config,
            state: ConnectionState::Closed,
        }
    }

    /// Create a closed client with the default configuration.
    pub fn with_defaults(engine: E) -> Self {
        Self::new(engine, ClientConfig::default())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Version reported by the live connection.
    pub fn database_version(&self) -> Option<u32> {
        match &self.state {
            ConnectionState::Open(conn) => Some(conn.version()),
            ConnectionState::Closed => None,
        }
    }

    /// Open the configured database, creating or upgrading it as needed.
    ///
    /// If a connection is already held it is kept and no new one is requested.
    pub async fn open(&mut self) -> Result<()> {
        if self.state.is_open() {
            debug!(
                "{} '{}' already open, reusing connection",
                prefix::DB,
                self.config.database_name
            );
            return Ok(());
        }

        let request = OpenRequest::versioned(
            self.config.database_name.clone(),
            self.config.version,
            self.config.store.clone(),
        );
        let conn = self
            .engine
            .open(request)
            .await
            .map_err(|source| self.connection_error(source))?;

        // A database created at this version by someone else may lack the store
        if !conn.store_names().contains(&self.config.store.name) {
            conn.close();
            return Err(self.connection_error(EngineError::StoreNotFound(
                self.config.store.name.clone(),
            )));
        }

        info!(
            "{} Opened '{}' v{}",
            prefix::PULSE_OPEN,
            self.config.database_name,
            conn.version()
        );
        self.state = ConnectionState::Open(conn);
        Ok(())
    }

    /// Release the connection, if any. Data is kept.
    pub fn close(&mut self) {
        if let ConnectionState::Open(conn) =
            std::mem::replace(&mut self.state, ConnectionState::Closed)
        {
            conn.close();
            info!("{} Closed '{}'", prefix::PULSE_CLOSE, self.config.database_name);
        }
    }

    /// Delete the whole database.
    ///
    /// Works whether or not this client is open: a transient connection
    /// confirms the database exists and is closed again before the delete is
    /// requested. The engine may refuse while any connection is open,
    /// including this client's own. Irreversible.
    pub async fn delete_db(&self) -> Result<()> {
        let name = &self.config.database_name;

        let probe = self
            .engine
            .open(OpenRequest::existing(name.clone()))
            .await
            .map_err(|e| {
                warn!("{} Could not open '{}' for deletion: {}", prefix::DB, name, e);
                ClientError::Delete(e)
            })?;
        probe.close();

        self.engine.delete_database(name).await.map_err(|e| {
            warn!("{} Deleting '{}' failed: {}", prefix::DB, name, e);
            ClientError::Delete(e)
        })?;

        info!("{} Deleted database '{}'", prefix::DB, name);
        Ok(())
    }

    /// Insert `payload` as a new record and return its key.
    ///
    /// A payload without the key field gets the next generated key when the
    /// store has a key generator.
    pub async fn add_data<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Key> {
        let conn = self.state.connection()?;
        let record = to_record(payload).map_err(ClientError::Write)?;

        let tx = self
            .transaction(conn, TransactionMode::ReadWrite)
            .map_err(ClientError::Write)?;
        let key = tx.add(record).await.map_err(ClientError::Write)?;
        tx.commit().await.map_err(ClientError::Write)?;

        debug!("{} Added record {}", prefix::DB, key);
        Ok(key)
    }

    /// Fetch the record at `key`. `Ok(None)` when there is none.
    pub async fn get_data(&self, key: &Key) -> Result<Option<Record>> {
        let conn = self.state.connection()?;

        let tx = self
            .transaction(conn, TransactionMode::ReadOnly)
            .map_err(ClientError::Read)?;
        let record = tx.get(key).await.map_err(ClientError::Read)?;
        tx.commit().await.map_err(ClientError::Read)?;

        Ok(record)
    }

    /// Scan the whole store in ascending key order.
    ///
    /// A cursor failure part way through fails the scan; entries read before
    /// the failure are dropped.
    pub async fn get_all_data(&self) -> Result<Vec<Entry>> {
        let conn = self.state.connection()?;

        let tx = self
            .transaction(conn, TransactionMode::ReadOnly)
            .map_err(ClientError::Read)?;
        let mut cursor = tx.open_cursor().await.map_err(ClientError::Read)?;

        let mut entries = Vec::new();
        while let Some(entry) = cursor.next_entry().await.map_err(ClientError::Read)? {
            entries.push(entry);
        }
        tx.commit().await.map_err(ClientError::Read)?;

        debug!("{} Scanned {} records", prefix::DB, entries.len());
        Ok(entries)
    }

    /// Merge `partial` into the record at `key`.
    ///
    /// Read and write happen in one read-write transaction. Top-level fields
    /// of `partial` replace those of the stored record; all other fields are
    /// kept. The key field always keeps the value `key`, so the record never
    /// moves. Fails with `NotFound` and writes nothing if there is no record.
    pub async fn update_data<T: Serialize + ?Sized>(&self, key: &Key, partial: &T) -> Result<()> {
        let conn = self.state.connection()?;
        let partial = to_record(partial).map_err(ClientError::Write)?;

        let tx = self
            .transaction(conn, TransactionMode::ReadWrite)
            .map_err(ClientError::Write)?;
        let existing = match tx.get(key).await.map_err(ClientError::Write)? {
            Some(existing) => existing,
            None => return Err(ClientError::NotFound(key.clone())),
        };

        let merged = shallow_merge(existing, &partial, &self.config.store.key_path, key)
            .map_err(ClientError::Write)?;
        tx.put(merged).await.map_err(ClientError::Write)?;
        tx.commit().await.map_err(ClientError::Write)?;

        debug!("{} Updated record {}", prefix::DB, key);
        Ok(())
    }

    /// Delete the record at `key`. Deleting a missing record succeeds.
    pub async fn delete_data(&self, key: &Key) -> Result<()> {
        let conn = self.state.connection()?;

        let tx = self
            .transaction(conn, TransactionMode::ReadWrite)
            .map_err(ClientError::Delete)?;
        tx.delete(key).await.map_err(ClientError::Delete)?;
        tx.commit().await.map_err(ClientError::Delete)?;

        debug!("{} Deleted record {}", prefix::DB, key);
        Ok(())
    }

    fn transaction(
        &self,
        conn: &E::Connection,
        mode: TransactionMode,
    ) -> EngineResult<<E::Connection as EngineConnection>::Transaction> {
        conn.transaction(&self.config.store.name, mode)
    }

    fn connection_error(&self, source: EngineError) -> ClientError {
        warn!(
            "{} Opening '{}' v{} failed: {}",
            prefix::DB,
            self.config.database_name,
            self.config.version,
            source
        );
        ClientError::Connection {
            database: self.config.database_name.clone(),
            source,
        }
    }
}

impl<E: StorageEngine> std::fmt::Debug for StorageClient<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("config", &self.config)
            .field("open", &self.state.is_open())
            .finish()
    }
}

impl<E: StorageEngine> Drop for StorageClient<E> {
    fn drop(&mut self) {
        self.close();
    }
}
