//! idbkv core
//!
//! A thin async client for a single object store in a versioned,
//! transactional key-value database such as the browser's IndexedDB.
//!
//! The host database is reached through the engine contract in [`engine`].
//! This crate ships an in-memory engine with the same semantics; the
//! `idbkv-indexeddb` crate provides the browser one.
//!
//! # Example
//!
//! ```rust
//! use idbkv_core::{ClientConfig, Key, MemoryEngine, StorageClient};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let mut client = StorageClient::new(MemoryEngine::new(), ClientConfig::new("notes"));
//! client.open().await?;
//!
//! let key = client.add_data(&json!({ "name": "a" })).await?;
//! assert_eq!(key, Key::from(1));
//!
//! client.update_data(&key, &json!({ "done": true })).await?;
//! let record = client.get_data(&key).await?;
//! assert_eq!(record, Some(json!({ "id": 1, "name": "a", "done": true })));
//!
//! client.delete_data(&key).await?;
//! assert_eq!(client.get_data(&key).await?, None);
//!
//! client.close();
//! # Ok::<(), idbkv_core::ClientError>(())
//! # }).unwrap();
//! ```

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod logging;
pub mod record;
pub mod schema;

// Re-export main types at crate root
pub use client::{ConnectionState, StorageClient};
pub use config::{ClientConfig, StoreSchema};
pub use engine::{
    EngineConnection, EngineCursor, EngineTransaction, Fault, MemoryEngine, OpenRequest,
    RequestKind, StorageEngine, TransactionMode, UpgradeTarget, VersionChange,
};
pub use error::{ClientError, EngineError, EngineResult, Result};
pub use key::Key;
pub use record::{Entry, Record};
pub use schema::ensure_schema;
