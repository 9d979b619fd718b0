//! In-memory storage engine
//!
//! Implements the engine contract with IndexedDB semantics. Useful for:
//! - Unit and integration testing (with fault injection)
//! - Native hosts that have no browser storage
//!
//! Not persistent beyond the process. Clones of a `MemoryEngine` share the
//! same databases, so a fresh client over a clone sees earlier writes the way
//! a reloaded page sees its IndexedDB.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::rc::Rc;

use async_trait::async_trait;

use crate::config::StoreSchema;
use crate::engine::{
    EngineConnection, EngineCursor, EngineTransaction, OpenRequest, StorageEngine,
    TransactionMode, UpgradeTarget, VersionChange,
};
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, MAX_GENERATED_KEY};
use crate::record::{inject_key, inline_key, Entry, Record};
use crate::schema::ensure_schema;

/// Kinds of store request, for targeting injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Add,
    Put,
    Get,
    Delete,
}

/// A one-shot failure the engine reports the next time the matching
/// operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the next open
    Open,
    /// Fail the next request of this kind
    Request(RequestKind),
    /// Fail the next cursor after it has yielded `after` entries
    Cursor { after: usize },
    /// Abort the next transaction when it commits
    Commit,
    /// Fail the next delete-database request
    DeleteDatabase,
}

#[derive(Debug, Clone)]
struct StoreState {
    schema: StoreSchema,
    records: BTreeMap<Key, Record>,
    /// Next value of the key generator
    next_key: u64,
}

impl StoreState {
    fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            records: BTreeMap::new(),
            next_key: 1,
        }
    }

    /// Determine the key for `value`, generating and injecting one if needed.
    fn assign_key(&self, value: &mut Record) -> EngineResult<Key> {
        if let Some(key) = inline_key(value, &self.schema.key_path)? {
            return Ok(key);
        }
        if !self.schema.auto_increment {
            return Err(EngineError::Data(format!(
                "record has no '{}' field and store '{}' has no key generator",
                self.schema.key_path, self.schema.name
            )));
        }
        if self.next_key > MAX_GENERATED_KEY {
            return Err(EngineError::Constraint("key generator exhausted".into()));
        }
        let key = Key::from(self.next_key as f64);
        inject_key(value, &self.schema.key_path, &key)?;
        Ok(key)
    }

    /// Move the key generator past a numeric key that was just stored.
    fn advance_generator(&mut self, key: &Key) {
        if !self.schema.auto_increment {
            return;
        }
        if let Key::Number(n) = key {
            if *n >= self.next_key as f64 {
                self.next_key = (n.floor() as u64)
                    .saturating_add(1)
                    .min(MAX_GENERATED_KEY + 1);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DatabaseState {
    version: u32,
    stores: BTreeMap<String, StoreState>,
    connections: usize,
}

#[derive(Debug, Default)]
struct Shared {
    databases: HashMap<String, DatabaseState>,
    faults: Vec<Fault>,
    calls: usize,
}

impl Shared {
    fn take_fault(&mut self, wanted: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let pos = self.faults.iter().position(wanted)?;
        Some(self.faults.remove(pos))
    }

    fn store_mut(&mut self, database: &str, store: &str) -> EngineResult<&mut StoreState> {
        self.databases
            .get_mut(database)
            .and_then(|db| db.stores.get_mut(store))
            .ok_or_else(|| EngineError::StoreNotFound(store.to_string()))
    }
}

/// In-memory engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryEngine {
    /// Create an engine with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot fault.
    pub fn inject(&self, fault: Fault) {
        self.shared.borrow_mut().faults.push(fault);
    }

    /// Number of engine calls made so far (opens, deletes, transactions,
    /// requests and cursor steps).
    pub fn calls(&self) -> usize {
        self.shared.borrow().calls
    }

    /// Whether a database with this name exists.
    pub fn contains_database(&self, name: &str) -> bool {
        self.shared.borrow().databases.contains_key(name)
    }

    /// Stored version of a database.
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.shared.borrow().databases.get(name).map(|db| db.version)
    }

    /// Number of live connections to a database.
    pub fn open_connections(&self, name: &str) -> usize {
        self.shared
            .borrow()
            .databases
            .get(name)
            .map(|db| db.connections)
            .unwrap_or(0)
    }

    /// Snapshot of a store's records in key order, without counting as an
    /// engine call.
    pub fn records(&self, database: &str, store: &str) -> Option<Vec<Entry>> {
        let shared = self.shared.borrow();
        let store = shared.databases.get(database)?.stores.get(store)?;
        Some(
            store
                .records
                .iter()
                .map(|(k, v)| Entry::new(k.clone(), v.clone()))
                .collect(),
        )
    }
}

struct MemoryUpgrade<'a> {
    db: &'a mut DatabaseState,
}

impl UpgradeTarget for MemoryUpgrade<'_> {
    fn has_store(&self, name: &str) -> bool {
        self.db.stores.contains_key(name)
    }

    fn create_store(&mut self, schema: &StoreSchema) -> EngineResult<()> {
        if schema.key_path.is_empty() {
            return Err(EngineError::Data("key path must not be empty".into()));
        }
        if self.db.stores.contains_key(&schema.name) {
            return Err(EngineError::Constraint(format!(
                "object store '{}' already exists",
                schema.name
            )));
        }
        self.db
            .stores
            .insert(schema.name.clone(), StoreState::new(schema.clone()));
        Ok(())
    }
}

#[async_trait(?Send)]
impl StorageEngine for MemoryEngine {
    type Connection = MemoryConnection;

    async fn open(&self, request: OpenRequest) -> EngineResult<MemoryConnection> {
        let mut shared = self.shared.borrow_mut();
        shared.calls += 1;

        if shared.take_fault(|f| *f == Fault::Open).is_some() {
            return Err(EngineError::Open(format!(
                "injected open failure for '{}'",
                request.name
            )));
        }
        if request.version == Some(0) {
            return Err(EngineError::Open("version must be at least 1".into()));
        }

        let current = shared
            .databases
            .get(&request.name)
            .map(|db| db.version)
            .unwrap_or(0);
        let target = request.version.unwrap_or_else(|| current.max(1));

        if target < current {
            return Err(EngineError::Open(format!(
                "VersionError: requested version ({}) is less than the existing version ({})",
                target, current
            )));
        }

        if target > current {
            // Work on a copy so a failed upgrade leaves the database as it was
            let mut db = shared
                .databases
                .get(&request.name)
                .cloned()
                .unwrap_or_default();
            if db.connections > 0 {
                return Err(EngineError::Blocked(format!(
                    "{} open connection(s) to '{}' prevent upgrade to v{}",
                    db.connections, request.name, target
                )));
            }
            if let Some(schema) = &request.schema {
                let change = VersionChange {
                    old_version: current,
                    new_version: target,
                };
                ensure_schema(&mut MemoryUpgrade { db: &mut db }, change, schema)
                    .map_err(|e| EngineError::Open(format!("upgrade aborted: {}", e)))?;
            }
            db.version = target;
            shared.databases.insert(request.name.clone(), db);
        }

        let db = shared
            .databases
            .get_mut(&request.name)
            .ok_or_else(|| EngineError::Open(format!("database '{}' vanished", request.name)))?;
        db.connections += 1;

        Ok(MemoryConnection {
            shared: self.shared.clone(),
            name: request.name,
            version: target,
        })
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        let mut shared = self.shared.borrow_mut();
        shared.calls += 1;

        if shared.take_fault(|f| *f == Fault::DeleteDatabase).is_some() {
            return Err(EngineError::Request(format!(
                "injected delete failure for '{}'",
                name
            )));
        }

        match shared.databases.get(name) {
            None => Ok(()),
            Some(db) if db.connections > 0 => Err(EngineError::Blocked(format!(
                "{} open connection(s) to '{}'",
                db.connections, name
            ))),
            Some(_) => {
                shared.databases.remove(name);
                Ok(())
            }
        }
    }
}

/// Connection to an in-memory database. Closing or dropping it releases it.
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Rc<RefCell<Shared>>,
    name: String,
    version: u32,
}

impl EngineConnection for MemoryConnection {
    type Transaction = MemoryTransaction;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.shared
            .borrow()
            .databases
            .get(&self.name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn transaction(&self, store: &str, mode: TransactionMode) -> EngineResult<MemoryTransaction> {
        let mut shared = self.shared.borrow_mut();
        shared.calls += 1;
        shared.store_mut(&self.name, store)?;

        Ok(MemoryTransaction {
            shared: self.shared.clone(),
            database: self.name.clone(),
            store: store.to_string(),
            mode,
            state: Rc::new(RefCell::new(TxState::default())),
        })
    }

    fn close(self) {
        drop(self);
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Some(db) = self.shared.borrow_mut().databases.get_mut(&self.name) {
            db.connections = db.connections.saturating_sub(1);
        }
    }
}

#[derive(Debug, Default)]
struct TxState {
    /// Prior values of every key written, oldest first
    undo: Vec<(Key, Option<Record>)>,
    /// Key generator value before the first write
    saved_next_key: Option<u64>,
    aborted: Option<EngineError>,
    finished: bool,
}

impl TxState {
    fn check_active(&self) -> EngineResult<()> {
        if let Some(err) = &self.aborted {
            return Err(EngineError::Aborted(err.to_string()));
        }
        if self.finished {
            return Err(EngineError::Request("transaction has finished".into()));
        }
        Ok(())
    }

    fn remember(&mut self, store: &StoreState, key: &Key) {
        self.saved_next_key.get_or_insert(store.next_key);
        self.undo.push((key.clone(), store.records.get(key).cloned()));
    }

    fn rollback(&mut self, store: &mut StoreState) {
        while let Some((key, prior)) = self.undo.pop() {
            match prior {
                Some(value) => {
                    store.records.insert(key, value);
                }
                None => {
                    store.records.remove(&key);
                }
            }
        }
        if let Some(next_key) = self.saved_next_key.take() {
            store.next_key = next_key;
        }
    }

    fn abort(&mut self, shared: &mut Shared, database: &str, store: &str, err: &EngineError) {
        if let Ok(store) = shared.store_mut(database, store) {
            self.rollback(store);
        }
        self.aborted = Some(err.clone());
    }
}

/// Transaction over one in-memory store.
///
/// Writes apply immediately and are undone if the transaction aborts.
/// Dropping a transaction without committing keeps its writes, as IndexedDB
/// auto-commits.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Rc<RefCell<Shared>>,
    database: String,
    store: String,
    mode: TransactionMode,
    state: Rc<RefCell<TxState>>,
}

impl MemoryTransaction {
    fn request<R>(
        &self,
        kind: RequestKind,
        op: impl FnOnce(&mut StoreState, &mut TxState) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut tx = self.state.borrow_mut();
        tx.check_active()?;

        let mut shared = self.shared.borrow_mut();
        shared.calls += 1;

        let writes = !matches!(kind, RequestKind::Get);
        let result = if writes && self.mode == TransactionMode::ReadOnly {
            Err(EngineError::Request(format!(
                "ReadOnlyError: {:?} in a read-only transaction",
                kind
            )))
        } else if shared.take_fault(|f| *f == Fault::Request(kind)).is_some() {
            Err(EngineError::Request(format!("injected {:?} failure", kind)))
        } else {
            shared
                .store_mut(&self.database, &self.store)
                .and_then(|store| op(store, &mut *tx))
        };

        if let Err(err) = &result {
            tx.abort(&mut shared, &self.database, &self.store, err);
        }
        result
    }
}

#[async_trait(?Send)]
impl EngineTransaction for MemoryTransaction {
    type Cursor = MemoryCursor;

    fn mode(&self) -> TransactionMode {
        self.mode
    }

    async fn add(&self, mut value: Record) -> EngineResult<Key> {
        self.request(RequestKind::Add, |store, tx| {
            let key = store.assign_key(&mut value)?;
            if store.records.contains_key(&key) {
                return Err(EngineError::Constraint(format!(
                    "key {} already exists in '{}'",
                    key, store.schema.name
                )));
            }
            tx.remember(store, &key);
            store.advance_generator(&key);
            store.records.insert(key.clone(), value);
            Ok(key)
        })
    }

    async fn put(&self, mut value: Record) -> EngineResult<Key> {
        self.request(RequestKind::Put, |store, tx| {
            let key = store.assign_key(&mut value)?;
            tx.remember(store, &key);
            store.advance_generator(&key);
            store.records.insert(key.clone(), value);
            Ok(key)
        })
    }

    async fn get(&self, key: &Key) -> EngineResult<Option<Record>> {
        self.request(RequestKind::Get, |store, _| Ok(store.records.get(key).cloned()))
    }

    async fn delete(&self, key: &Key) -> EngineResult<()> {
        self.request(RequestKind::Delete, |store, tx| {
            if store.records.contains_key(key) {
                tx.remember(store, key);
                store.records.remove(key);
            }
            Ok(())
        })
    }

    async fn open_cursor(&self) -> EngineResult<MemoryCursor> {
        self.state.borrow().check_active()?;

        let mut shared = self.shared.borrow_mut();
        shared.calls += 1;
        shared.store_mut(&self.database, &self.store)?;
        let fail_after = match shared.take_fault(|f| matches!(f, Fault::Cursor { .. })) {
            Some(Fault::Cursor { after }) => Some(after),
            _ => None,
        };

        Ok(MemoryCursor {
            shared: self.shared.clone(),
            database: self.database.clone(),
            store: self.store.clone(),
            tx: self.state.clone(),
            position: None,
            yielded: 0,
            fail_after,
            done: false,
        })
    }

    async fn commit(self) -> EngineResult<()> {
        let mut tx = self.state.borrow_mut();
        if let Some(err) = tx.aborted.take() {
            return Err(EngineError::Aborted(err.to_string()));
        }
        if tx.finished {
            return Ok(());
        }

        let mut shared = self.shared.borrow_mut();
        if shared.take_fault(|f| *f == Fault::Commit).is_some() {
            let err = EngineError::Aborted("injected commit failure".into());
            tx.abort(&mut shared, &self.database, &self.store, &err);
            return Err(err);
        }

        tx.finished = true;
        Ok(())
    }
}

/// Forward cursor over a live in-memory store.
///
/// Each step seeks to the first key after the previous one, so records
/// written behind the cursor are skipped and records ahead of it are seen.
#[derive(Debug)]
pub struct MemoryCursor {
    shared: Rc<RefCell<Shared>>,
    database: String,
    store: String,
    tx: Rc<RefCell<TxState>>,
    position: Option<Key>,
    yielded: usize,
    fail_after: Option<usize>,
    done: bool,
}

#[async_trait(?Send)]
impl EngineCursor for MemoryCursor {
    async fn next_entry(&mut self) -> EngineResult<Option<Entry>> {
        if self.done {
            return Ok(None);
        }
        let mut tx = self.tx.borrow_mut();
        tx.check_active()?;

        let mut shared = self.shared.borrow_mut();
        shared.calls += 1;

        if self.fail_after == Some(self.yielded) {
            let err = EngineError::Cursor(format!(
                "injected cursor failure after {} entries",
                self.yielded
            ));
            tx.abort(&mut shared, &self.database, &self.store, &err);
            return Err(err);
        }

        let store = shared.store_mut(&self.database, &self.store)?;
        let lower = match &self.position {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let next = store
            .records
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| Entry::new(k.clone(), v.clone()));

        match &next {
            Some(entry) => {
                self.position = Some(entry.key.clone());
                self.yielded += 1;
            }
            None => self.done = true,
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn open(engine: &MemoryEngine, version: u32) -> EngineResult<MemoryConnection> {
        block_on(engine.open(OpenRequest::versioned(
            "db",
            version,
            StoreSchema::default(),
        )))
    }

    fn write(conn: &MemoryConnection) -> MemoryTransaction {
        conn.transaction("my-store", TransactionMode::ReadWrite).unwrap()
    }

    #[test]
    fn test_open_creates_database_and_store() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(conn.store_names(), vec!["my-store".to_string()]);
        assert_eq!(engine.open_connections("db"), 1);
        conn.close();
        assert_eq!(engine.open_connections("db"), 0);
    }

    #[test]
    fn test_open_lower_version_fails() {
        let engine = MemoryEngine::new();
        open(&engine, 3).unwrap().close();
        assert!(matches!(open(&engine, 2), Err(EngineError::Open(_))));
        assert_eq!(engine.database_version("db"), Some(3));
    }

    #[test]
    fn test_open_version_zero_fails() {
        let engine = MemoryEngine::new();
        assert!(matches!(open(&engine, 0), Err(EngineError::Open(_))));
        assert!(!engine.contains_database("db"));
    }

    #[test]
    fn test_upgrade_blocked_by_open_connection() {
        let engine = MemoryEngine::new();
        let _held = open(&engine, 1).unwrap();
        assert!(matches!(open(&engine, 2), Err(EngineError::Blocked(_))));
    }

    #[test]
    fn test_open_without_version_creates_empty_database() {
        let engine = MemoryEngine::new();
        let conn = block_on(engine.open(OpenRequest::existing("fresh"))).unwrap();
        assert_eq!(conn.version(), 1);
        assert!(conn.store_names().is_empty());
    }

    #[test]
    fn test_key_generator() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        let tx = write(&conn);

        let first = block_on(tx.add(json!({"name": "a"}))).unwrap();
        let explicit = block_on(tx.add(json!({"id": 10, "name": "b"}))).unwrap();
        let next = block_on(tx.add(json!({"name": "c"}))).unwrap();
        block_on(tx.commit()).unwrap();

        assert_eq!(first, Key::from(1));
        assert_eq!(explicit, Key::from(10));
        assert_eq!(next, Key::from(11));
    }

    #[test]
    fn test_failed_request_rolls_back_transaction() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        let tx = write(&conn);

        block_on(tx.add(json!({"id": 1}))).unwrap();
        let dup = block_on(tx.add(json!({"id": 1})));
        assert!(matches!(dup, Err(EngineError::Constraint(_))));
        assert!(matches!(block_on(tx.commit()), Err(EngineError::Aborted(_))));

        assert!(engine.records("db", "my-store").unwrap().is_empty());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        let tx = conn
            .transaction("my-store", TransactionMode::ReadOnly)
            .unwrap();
        assert!(block_on(tx.add(json!({"name": "a"}))).is_err());
    }

    #[test]
    fn test_missing_store() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        let result = conn.transaction("other", TransactionMode::ReadOnly);
        assert!(matches!(result, Err(EngineError::StoreNotFound(_))));
    }

    #[test]
    fn test_cursor_walks_in_key_order() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        let tx = write(&conn);
        for id in [3, 1, 2] {
            block_on(tx.add(json!({ "id": id }))).unwrap();
        }
        block_on(tx.commit()).unwrap();

        let tx = conn
            .transaction("my-store", TransactionMode::ReadOnly)
            .unwrap();
        let mut cursor = block_on(tx.open_cursor()).unwrap();
        let mut keys = Vec::new();
        while let Some(entry) = block_on(cursor.next_entry()).unwrap() {
            keys.push(entry.key);
        }
        assert_eq!(keys, vec![Key::from(1), Key::from(2), Key::from(3)]);
        assert!(block_on(cursor.next_entry()).unwrap().is_none());
    }

    #[test]
    fn test_delete_database() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        assert!(matches!(
            block_on(engine.delete_database("db")),
            Err(EngineError::Blocked(_))
        ));
        conn.close();
        block_on(engine.delete_database("db")).unwrap();
        assert!(!engine.contains_database("db"));
        // absent database
        block_on(engine.delete_database("db")).unwrap();
    }

    #[test]
    fn test_clones_share_databases() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, 1).unwrap();
        let tx = write(&conn);
        block_on(tx.add(json!({"name": "kept"}))).unwrap();
        block_on(tx.commit()).unwrap();
        conn.close();

        let other = engine.clone();
        assert_eq!(other.records("db", "my-store").unwrap().len(), 1);
    }
}
