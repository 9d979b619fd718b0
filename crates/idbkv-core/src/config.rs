//! Client configuration types

use serde::{Deserialize, Serialize};

/// Default database name.
pub const DEFAULT_DATABASE_NAME: &str = "database";

/// Default object store name.
pub const DEFAULT_STORE_NAME: &str = "my-store";

/// Default in-line key path.
pub const DEFAULT_KEY_PATH: &str = "id";

/// Default schema version.
pub const DEFAULT_VERSION: u32 = 1;

/// Shape of the single object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSchema {
    /// Object store name
    pub name: String,
    /// Record field holding the primary key
    pub key_path: String,
    /// Assign increasing integer keys when a record has no key field
    pub auto_increment: bool,
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self {
            name: DEFAULT_STORE_NAME.to_string(),
            key_path: DEFAULT_KEY_PATH.to_string(),
            auto_increment: true,
        }
    }
}

impl StoreSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// Which database to open, at what version, and which store to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Database name
    pub database_name: String,
    /// Schema version requested on open
    pub version: u32,
    /// The object store all operations target
    pub store: StoreSchema,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            version: DEFAULT_VERSION,
            store: StoreSchema::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for the named database with default store settings.
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Default::default()
        }
    }

    /// Set the schema version.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the object store schema.
    pub fn store(mut self, store: StoreSchema) -> Self {
        self.store = store;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
