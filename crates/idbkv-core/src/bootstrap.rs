//! Seed-on-first-use helpers for callers
//!
//! A typical session opens the store, seeds it with an initial dataset if it
//! is empty or reuses the first stored record otherwise, and closes again.
//! On teardown the caller removes the one record it created.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::client::StorageClient;
use crate::engine::StorageEngine;
use crate::error::{ClientError, Result};
use crate::key::Key;
use crate::logging::prefix;
use crate::record::Record;

/// Number of items in the default sample dataset.
pub const SAMPLE_SIZE: usize = 100;

/// Outcome of [`load_or_seed`].
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub key: Key,
    pub value: Record,
    /// Whether the record was written by this call
    pub seeded: bool,
}

/// Build the sample dataset: one record holding `count` items named
/// `name 1` to `name {count}`.
pub fn sample_dataset(count: usize) -> Record {
    let items: Vec<Record> = (1..=count)
        .map(|i| json!({ "id": i, "name": format!("name {}", i) }))
        .collect();
    json!({ "items": items })
}

/// Open the store, seed it with `seed` if it is empty, and close it again.
///
/// Returns the seeded record, or the first stored record when the store
/// already had data. The client is closed afterwards whether or not this
/// succeeds.
pub async fn load_or_seed<E, T>(client: &mut StorageClient<E>, seed: &T) -> Result<Loaded>
where
    E: StorageEngine,
    T: Serialize + ?Sized,
{
    client.open().await?;
    let loaded = seed_if_empty(client, seed).await;
    client.close();
    loaded
}

async fn seed_if_empty<E, T>(client: &StorageClient<E>, seed: &T) -> Result<Loaded>
where
    E: StorageEngine,
    T: Serialize + ?Sized,
{
    let entries = client.get_all_data().await?;
    if let Some(first) = entries.into_iter().next() {
        info!("{} Reusing stored record {}", prefix::DB, first.key);
        return Ok(Loaded {
            key: first.key,
            value: first.value,
            seeded: false,
        });
    }

    let key = client.add_data(seed).await?;
    let value = client
        .get_data(&key)
        .await?
        .ok_or_else(|| ClientError::NotFound(key.clone()))?;
    info!("{} Seeded record {}", prefix::DB, key);

    Ok(Loaded {
        key,
        value,
        seeded: true,
    })
}

/// Remove the record a session created. Opens and closes the client around
/// the delete.
pub async fn release<E: StorageEngine>(client: &mut StorageClient<E>, key: &Key) -> Result<()> {
    client.open().await?;
    let deleted = client.delete_data(key).await;
    client.close();
    deleted
}
