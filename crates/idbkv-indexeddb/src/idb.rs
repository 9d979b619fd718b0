//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`.

use idbkv_core::{ensure_schema, EngineError, EngineResult, OpenRequest, StoreSchema};
use idbkv_core::{UpgradeTarget, VersionChange};
use js_sys::Promise;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Event, IdbDatabase, IdbFactory, IdbObjectStore, IdbObjectStoreParameters, IdbOpenDbRequest,
    IdbRequest, IdbTransaction, IdbTransactionMode, IdbVersionChangeEvent,
};

use crate::error::{describe, IndexedDbError, Result};

/// Rejection value used when a delete is held up by open connections.
const BLOCKED: &str = "blocked";

/// Type alias for upgrade closure to reduce complexity
type UpgradeClosure = Rc<RefCell<Option<Closure<dyn FnMut(IdbVersionChangeEvent)>>>>;

type EventClosure = Closure<dyn FnMut(Event)>;

/// Get the global IndexedDB factory.
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| IndexedDbError::NotAvailable("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(IndexedDbError::NotAvailable(
            "indexedDB is null/undefined".into(),
        ));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| IndexedDbError::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's
/// result and rejects with its DOMException.
///
/// With `blocked` set, a `blocked` event on that request rejects too.
/// Handlers are detached once the promise settles, so a cursor request can be
/// awaited again after `continue()`.
fn request_to_promise(req: &IdbRequest, blocked: Option<&IdbOpenDbRequest>) -> Promise {
    let req = req.clone();
    let blocked = blocked.cloned();

    Promise::new(&mut move |resolve, reject| {
        let closures: Rc<RefCell<Vec<EventClosure>>> = Rc::new(RefCell::new(Vec::new()));

        let detach = {
            let req = req.clone();
            let blocked = blocked.clone();
            let closures = closures.clone();
            Rc::new(move || {
                req.set_onsuccess(None);
                req.set_onerror(None);
                if let Some(open_req) = &blocked {
                    open_req.set_onblocked(None);
                }
                closures.borrow_mut().clear();
            })
        };

        let req_s = req.clone();
        let detach_s = detach.clone();
        let on_success = Closure::wrap(Box::new(move |_event: Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            detach_s();
        }) as Box<dyn FnMut(Event)>);

        let req_e = req.clone();
        let reject_e = reject.clone();
        let detach_e = detach.clone();
        let on_error = Closure::wrap(Box::new(move |_event: Event| {
            let err = match req_e.error() {
                Ok(Some(ex)) => JsValue::from(ex),
                _ => JsValue::from_str("unknown IDB error"),
            };
            let _ = reject_e.call1(&JsValue::UNDEFINED, &err);
            detach_e();
        }) as Box<dyn FnMut(Event)>);

        req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        let mut held = vec![on_success, on_error];

        if let Some(open_req) = &blocked {
            let detach_b = detach.clone();
            let on_blocked = Closure::wrap(Box::new(move |_event: Event| {
                let _ = reject.call1(&JsValue::UNDEFINED, &JsValue::from_str(BLOCKED));
                detach_b();
            }) as Box<dyn FnMut(Event)>);
            open_req.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));
            held.push(on_blocked);
        }

        // Keep closures alive until one fires
        *closures.borrow_mut() = held;
    })
}

/// Convert an IdbTransaction completion into a JS Promise.
fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        let closures: Rc<RefCell<Vec<EventClosure>>> = Rc::new(RefCell::new(Vec::new()));

        let detach = {
            let tx = tx.clone();
            let closures = closures.clone();
            Rc::new(move || {
                tx.set_oncomplete(None);
                tx.set_onerror(None);
                tx.set_onabort(None);
                closures.borrow_mut().clear();
            })
        };

        let detach_c = detach.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            detach_c();
        }) as Box<dyn FnMut(Event)>);

        // error and abort both end the transaction without committing
        let tx_f = tx.clone();
        let detach_f = detach.clone();
        let on_failure = Closure::wrap(Box::new(move |_event: Event| {
            let err = tx_f
                .error()
                .map(JsValue::from)
                .unwrap_or_else(|| JsValue::from_str("transaction aborted"));
            let _ = reject.call1(&JsValue::UNDEFINED, &err);
            detach_f();
        }) as Box<dyn FnMut(Event)>);

        tx.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx.set_onerror(Some(on_failure.as_ref().unchecked_ref()));
        tx.set_onabort(Some(on_failure.as_ref().unchecked_ref()));

        *closures.borrow_mut() = vec![on_complete, on_failure];
    })
}

/// Schema access inside a `versionchange` transaction.
struct IdbUpgrade {
    db: IdbDatabase,
}

impl UpgradeTarget for IdbUpgrade {
    fn has_store(&self, name: &str) -> bool {
        self.db.object_store_names().contains(name)
    }

    fn create_store(&mut self, schema: &StoreSchema) -> EngineResult<()> {
        let params = IdbObjectStoreParameters::new();
        js_sys::Reflect::set(
            &params,
            &"keyPath".into(),
            &JsValue::from_str(&schema.key_path),
        )
        .map_err(|e| EngineError::Open(describe(&e)))?;
        js_sys::Reflect::set(
            &params,
            &"autoIncrement".into(),
            &JsValue::from_bool(schema.auto_increment),
        )
        .map_err(|e| EngineError::Open(describe(&e)))?;

        self.db
            .create_object_store_with_optional_parameters(&schema.name, &params)
            .map_err(|e| EngineError::from(IndexedDbError::from(e)))?;
        Ok(())
    }
}

/// Run the schema step for an `upgradeneeded` event. On failure the
/// version change transaction is aborted, which fails the open.
fn run_upgrade(event: &IdbVersionChangeEvent, schema: Option<&StoreSchema>) -> EngineResult<()> {
    let req: IdbOpenDbRequest = event
        .target()
        .ok_or_else(|| EngineError::Open("upgrade event has no target".into()))?
        .unchecked_into();
    let db: IdbDatabase = req
        .result()
        .map_err(|e| EngineError::Open(describe(&e)))?
        .unchecked_into();

    let Some(schema) = schema else {
        return Ok(());
    };

    let change = VersionChange {
        old_version: event.old_version() as u32,
        new_version: event.new_version().unwrap_or_default() as u32,
    };

    let mut target = IdbUpgrade { db };
    if let Err(err) = ensure_schema(&mut target, change, schema) {
        if let Some(tx) = req.transaction() {
            let _ = tx.abort();
        }
        return Err(err);
    }
    Ok(())
}

/// Open (or create) a database, running the schema step on upgrade.
pub async fn open_database(request: &OpenRequest) -> Result<IdbDatabase> {
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = match request.version {
        Some(version) => factory.open_with_u32(&request.name, version),
        None => factory.open(&request.name),
    }
    .map_err(|e| IndexedDbError::Open(describe(&e)))?;

    // Store upgrade closure to manage its lifetime without leaking
    let upgrade_closure: UpgradeClosure = Rc::new(RefCell::new(None));
    let upgrade_closure_for_drop = upgrade_closure.clone();

    let upgrade_failure: Rc<RefCell<Option<EngineError>>> = Rc::new(RefCell::new(None));
    let failure_for_upgrade = upgrade_failure.clone();
    let schema = request.schema.clone();

    let on_upgrade = Closure::wrap(Box::new(move |event: IdbVersionChangeEvent| {
        if let Err(err) = run_upgrade(&event, schema.as_ref()) {
            warn!("Upgrade failed: {}", err);
            *failure_for_upgrade.borrow_mut() = Some(err);
        }
    }) as Box<dyn FnMut(IdbVersionChangeEvent)>);

    open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
    *upgrade_closure.borrow_mut() = Some(on_upgrade);

    let result = JsFuture::from(request_to_promise(open_req.unchecked_ref(), None)).await;

    open_req.set_onupgradeneeded(None);
    *upgrade_closure_for_drop.borrow_mut() = None;

    let result = result.map_err(|e| match upgrade_failure.borrow_mut().take() {
        Some(err) => IndexedDbError::Open(format!("upgrade aborted: {}", err)),
        None => IndexedDbError::Open(describe(&e)),
    })?;

    result
        .dyn_into::<IdbDatabase>()
        .map_err(|_| IndexedDbError::Open("result is not IdbDatabase".into()))
}

/// Start a transaction on one object store.
pub fn begin_transaction(
    db: &IdbDatabase,
    store_name: &str,
    mode: IdbTransactionMode,
) -> Result<(IdbTransaction, IdbObjectStore)> {
    let tx = db.transaction_with_str_and_mode(store_name, mode)?;
    let store = tx.object_store(store_name)?;
    Ok((tx, store))
}

/// Await an IdbRequest, resolving to its result JsValue.
pub async fn await_request(req: &IdbRequest) -> Result<JsValue> {
    Ok(JsFuture::from(request_to_promise(req, None)).await?)
}

/// Await an IdbTransaction to complete.
pub async fn await_transaction(tx: &IdbTransaction) -> Result<()> {
    JsFuture::from(transaction_to_promise(tx))
        .await
        .map_err(|e| match IndexedDbError::from(e) {
            IndexedDbError::Request(msg) => IndexedDbError::Transaction(msg),
            other => other,
        })?;
    Ok(())
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(db_name: &str) -> Result<()> {
    let factory = idb_factory()?;
    let req = factory
        .delete_database(db_name)
        .map_err(|e| IndexedDbError::Open(format!("delete db: {}", describe(&e))))?;

    JsFuture::from(request_to_promise(req.unchecked_ref(), Some(&req)))
        .await
        .map_err(|e| {
            if e.as_string().as_deref() == Some(BLOCKED) {
                IndexedDbError::Blocked(format!("delete db '{}'", db_name))
            } else {
                IndexedDbError::Request(format!("delete db: {}", describe(&e)))
            }
        })?;
    Ok(())
}
