//! IndexedDB engine for idbkv (browser WASM)
//!
//! This crate implements the idbkv-core engine contract on top of the
//! browser's IndexedDB, so a `StorageClient<IndexedDbEngine>` behaves exactly
//! like one backed by the in-memory engine, with data persisted by the browser.
//!
//! # Storage
//!
//! Records are stored as plain JS objects, converted through JSON. The key
//! lives in-line under the configured key path and is generated by the store
//! when the record does not carry one. Failed requests surface as the
//! DOMException name IndexedDB reports (`ConstraintError`, `DataError`, ...)
//! mapped onto `EngineError`.
//!
//! # Example
//!
//! ```rust,ignore
//! use idbkv_core::{ClientConfig, StorageClient};
//! use idbkv_indexeddb::IndexedDbEngine;
//! use serde_json::json;
//!
//! let mut client = StorageClient::new(IndexedDbEngine::new(), ClientConfig::new("notes"));
//! client.open().await?;
//!
//! let key = client.add_data(&json!({ "name": "a" })).await?;
//! let record = client.get_data(&key).await?;
//! assert!(record.is_some());
//!
//! client.close();
//! ```

pub mod convert;
pub mod engine;
pub mod error;
pub mod idb;

pub use engine::{IdbConnection, IdbStoreCursor, IdbStoreTransaction, IndexedDbEngine};
pub use error::{IndexedDbError, Result};
