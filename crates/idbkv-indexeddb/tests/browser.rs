//! Browser tests against a real IndexedDB
//!
//! Run with `wasm-pack test --headless --firefox crates/idbkv-indexeddb`.

#![cfg(target_arch = "wasm32")]

use idbkv_core::{ClientConfig, ClientError, EngineError, Key, StorageClient};
use idbkv_indexeddb::IndexedDbEngine;
use serde_json::json;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

async fn fresh_client(name: &str) -> StorageClient<IndexedDbEngine> {
    let client = StorageClient::new(IndexedDbEngine::new(), ClientConfig::new(name));
    client.delete_db().await.unwrap();
    client
}

#[wasm_bindgen_test]
async fn test_crud_round_trip() {
    let mut client = fresh_client("idbkv-test-crud").await;
    client.open().await.unwrap();

    let key = client.add_data(&json!({"name": "a"})).await.unwrap();
    assert_eq!(key, Key::from(1));
    assert_eq!(
        client.get_data(&key).await.unwrap(),
        Some(json!({"id": 1, "name": "a"}))
    );

    client
        .update_data(&key, &json!({"done": true}))
        .await
        .unwrap();
    assert_eq!(
        client.get_data(&key).await.unwrap(),
        Some(json!({"id": 1, "name": "a", "done": true}))
    );

    client.delete_data(&key).await.unwrap();
    assert_eq!(client.get_data(&key).await.unwrap(), None);

    client.close();
    client.delete_db().await.unwrap();
}

#[wasm_bindgen_test]
async fn test_get_all_in_key_order() {
    let mut client = fresh_client("idbkv-test-scan").await;
    client.open().await.unwrap();

    for name in ["x", "y", "z"] {
        client.add_data(&json!({"name": name})).await.unwrap();
    }
    let entries = client.get_all_data().await.unwrap();

    let keys: Vec<Key> = entries.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, vec![Key::from(1), Key::from(2), Key::from(3)]);
    assert_eq!(entries[2].value["name"], "z");

    client.close();
    client.delete_db().await.unwrap();
}

#[wasm_bindgen_test]
async fn test_duplicate_key_is_constraint_error() {
    let mut client = fresh_client("idbkv-test-dup").await;
    client.open().await.unwrap();

    client.add_data(&json!({"id": "k", "v": 1})).await.unwrap();
    let result = client.add_data(&json!({"id": "k", "v": 2})).await;

    assert!(matches!(
        result,
        Err(ClientError::Write(EngineError::Constraint(_)))
    ));
    assert_eq!(
        client.get_data(&Key::from("k")).await.unwrap(),
        Some(json!({"id": "k", "v": 1}))
    );

    client.close();
    client.delete_db().await.unwrap();
}

#[wasm_bindgen_test]
async fn test_data_survives_reopen() {
    let mut client = fresh_client("idbkv-test-reopen").await;
    client.open().await.unwrap();
    let key = client.add_data(&json!({"name": "kept"})).await.unwrap();
    client.close();

    client.open().await.unwrap();
    assert_eq!(
        client.get_data(&key).await.unwrap(),
        Some(json!({"id": 1, "name": "kept"}))
    );

    client.close();
    client.delete_db().await.unwrap();
}

#[wasm_bindgen_test]
async fn test_delete_blocked_by_open_connection() {
    let mut holder = fresh_client("idbkv-test-blocked").await;
    holder.open().await.unwrap();

    let other = StorageClient::new(
        IndexedDbEngine::new(),
        ClientConfig::new("idbkv-test-blocked"),
    );
    let result = other.delete_db().await;

    assert!(matches!(result, Err(ClientError::Delete(_))));

    holder.close();
    other.delete_db().await.unwrap();
}
