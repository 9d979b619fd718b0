//! IndexedDB implementation of the engine contract

use async_trait::async_trait;
use idbkv_core::{
    EngineConnection, EngineCursor, EngineError, EngineResult, EngineTransaction, Entry, Key,
    OpenRequest, Record, StorageEngine, TransactionMode,
};
use tracing::debug;
use wasm_bindgen::JsCast;
use web_sys::{
    IdbCursorWithValue, IdbDatabase, IdbObjectStore, IdbRequest, IdbTransaction,
    IdbTransactionMode,
};

use crate::convert::{key_from_js, key_to_js, value_from_js, value_to_js};
use crate::error::{describe, IndexedDbError};
use crate::idb;

/// The browser's IndexedDB, reached through the global `indexedDB` factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedDbEngine;

impl IndexedDbEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl StorageEngine for IndexedDbEngine {
    type Connection = IdbConnection;

    async fn open(&self, request: OpenRequest) -> EngineResult<IdbConnection> {
        let db = idb::open_database(&request).await?;
        debug!("Opened IndexedDB '{}' at v{}", request.name, db.version());
        Ok(IdbConnection {
            name: request.name,
            db,
        })
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        idb::delete_database(name).await?;
        Ok(())
    }
}

/// An open `IDBDatabase`. Dropping it closes the database.
#[derive(Debug)]
pub struct IdbConnection {
    name: String,
    db: IdbDatabase,
}

impl EngineConnection for IdbConnection {
    type Transaction = IdbStoreTransaction;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.db.version() as u32
    }

    fn store_names(&self) -> Vec<String> {
        let names = self.db.object_store_names();
        (0..names.length()).filter_map(|i| names.item(i)).collect()
    }

    fn transaction(&self, store: &str, mode: TransactionMode) -> EngineResult<IdbStoreTransaction> {
        let idb_mode = match mode {
            TransactionMode::ReadOnly => IdbTransactionMode::Readonly,
            TransactionMode::ReadWrite => IdbTransactionMode::Readwrite,
        };
        let (tx, store) = idb::begin_transaction(&self.db, store, idb_mode)?;
        Ok(IdbStoreTransaction { tx, store, mode })
    }

    fn close(self) {}
}

impl Drop for IdbConnection {
    fn drop(&mut self) {
        self.db.close();
    }
}

/// A transaction scoped to one object store.
#[derive(Debug)]
pub struct IdbStoreTransaction {
    tx: IdbTransaction,
    store: IdbObjectStore,
    mode: TransactionMode,
}

impl IdbStoreTransaction {
    async fn write(&self, request: Result<IdbRequest, wasm_bindgen::JsValue>) -> EngineResult<Key> {
        let req = request.map_err(IndexedDbError::from)?;
        let key = idb::await_request(&req).await?;
        Ok(key_from_js(&key)?)
    }
}

#[async_trait(?Send)]
impl EngineTransaction for IdbStoreTransaction {
    type Cursor = IdbStoreCursor;

    fn mode(&self) -> TransactionMode {
        self.mode
    }

    async fn add(&self, value: Record) -> EngineResult<Key> {
        let js = value_to_js(&value)?;
        self.write(self.store.add(&js)).await
    }

    async fn put(&self, value: Record) -> EngineResult<Key> {
        let js = value_to_js(&value)?;
        self.write(self.store.put(&js)).await
    }

    async fn get(&self, key: &Key) -> EngineResult<Option<Record>> {
        let req = self
            .store
            .get(&key_to_js(key))
            .map_err(IndexedDbError::from)?;
        let value = idb::await_request(&req).await?;
        if value.is_undefined() {
            return Ok(None);
        }
        Ok(Some(value_from_js(&value)?))
    }

    async fn delete(&self, key: &Key) -> EngineResult<()> {
        let req = self
            .store
            .delete(&key_to_js(key))
            .map_err(IndexedDbError::from)?;
        idb::await_request(&req).await?;
        Ok(())
    }

    async fn open_cursor(&self) -> EngineResult<IdbStoreCursor> {
        let request = self.store.open_cursor().map_err(IndexedDbError::from)?;
        Ok(IdbStoreCursor {
            request,
            current: None,
            done: false,
        })
    }

    async fn commit(self) -> EngineResult<()> {
        idb::await_transaction(&self.tx).await?;
        Ok(())
    }
}

/// Forward cursor over an object store.
///
/// The cursor request fires `success` once per step; each step advances with
/// `continue()` and awaits the same request again.
#[derive(Debug)]
pub struct IdbStoreCursor {
    request: IdbRequest,
    current: Option<IdbCursorWithValue>,
    done: bool,
}

#[async_trait(?Send)]
impl EngineCursor for IdbStoreCursor {
    async fn next_entry(&mut self) -> EngineResult<Option<Entry>> {
        if self.done {
            return Ok(None);
        }

        if let Some(cursor) = self.current.take() {
            cursor
                .continue_()
                .map_err(|e| EngineError::Cursor(describe(&e)))?;
        }

        let result = idb::await_request(&self.request)
            .await
            .map_err(|e| EngineError::Cursor(e.to_string()))?;
        if result.is_null() || result.is_undefined() {
            self.done = true;
            return Ok(None);
        }

        let cursor: IdbCursorWithValue = result
            .dyn_into()
            .map_err(|_| EngineError::Cursor("result is not a cursor".into()))?;
        let key = cursor
            .primary_key()
            .map_err(|e| EngineError::Cursor(describe(&e)))?;
        let value = cursor
            .value()
            .map_err(|e| EngineError::Cursor(describe(&e)))?;
        let entry = Entry::new(key_from_js(&key)?, value_from_js(&value)?);

        self.current = Some(cursor);
        Ok(Some(entry))
    }
}
