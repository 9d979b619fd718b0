//! Error types for the IndexedDB engine

use idbkv_core::EngineError;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::DomException;

/// Result type for IndexedDB operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// Errors that can occur while talking to IndexedDB
#[derive(Debug, Error)]
pub enum IndexedDbError {
    /// IndexedDB is not available in this environment
    #[error("IndexedDB not available: {0}")]
    NotAvailable(String),

    /// Database open/upgrade error
    #[error("IndexedDB open error: {0}")]
    Open(String),

    /// Delete or version change waiting on other connections
    #[error("IndexedDB blocked: {0}")]
    Blocked(String),

    /// Transaction error
    #[error("IndexedDB transaction error: {0}")]
    Transaction(String),

    /// A request failed with a DOMException
    #[error("IndexedDB {name}: {message}")]
    Dom { name: String, message: String },

    /// Request error from IDB operation
    #[error("IndexedDB request error: {0}")]
    Request(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JavaScript value conversion error
    #[error("JS conversion error: {0}")]
    JsValue(String),
}

impl From<JsValue> for IndexedDbError {
    fn from(val: JsValue) -> Self {
        match val.dyn_ref::<DomException>() {
            Some(ex) => IndexedDbError::Dom {
                name: ex.name(),
                message: ex.message(),
            },
            None => IndexedDbError::Request(describe(&val)),
        }
    }
}

/// Render a rejected JS value for an error message.
pub(crate) fn describe(val: &JsValue) -> String {
    if let Some(ex) = val.dyn_ref::<DomException>() {
        return format!("{}: {}", ex.name(), ex.message());
    }
    if let Some(s) = val.as_string() {
        return s;
    }
    js_sys::JSON::stringify(val)
        .ok()
        .and_then(|s| s.as_string())
        .unwrap_or_else(|| format!("{:?}", val))
}

/// Convert IndexedDbError to EngineError for the engine contract
impl From<IndexedDbError> for EngineError {
    fn from(err: IndexedDbError) -> Self {
        match err {
            IndexedDbError::NotAvailable(msg) => EngineError::NotAvailable(msg),
            IndexedDbError::Open(msg) => EngineError::Open(msg),
            IndexedDbError::Blocked(msg) => EngineError::Blocked(msg),
            IndexedDbError::Transaction(msg) => EngineError::Aborted(msg),
            IndexedDbError::Dom { name, message } => match name.as_str() {
                "ConstraintError" => EngineError::Constraint(message),
                "DataError" | "DataCloneError" => EngineError::Data(message),
                "NotFoundError" => EngineError::StoreNotFound(message),
                "AbortError" => EngineError::Aborted(message),
                "VersionError" => EngineError::Open(format!("{}: {}", name, message)),
                _ => EngineError::Request(format!("{}: {}", name, message)),
            },
            IndexedDbError::Request(msg) => EngineError::Request(msg),
            IndexedDbError::Json(e) => EngineError::Data(e.to_string()),
            IndexedDbError::JsValue(msg) => EngineError::Data(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom(name: &str) -> IndexedDbError {
        IndexedDbError::Dom {
            name: name.into(),
            message: "boom".into(),
        }
    }

    #[test]
    fn test_dom_names_map_to_engine_kinds() {
        assert_eq!(
            EngineError::from(dom("ConstraintError")),
            EngineError::Constraint("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("DataError")),
            EngineError::Data("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("NotFoundError")),
            EngineError::StoreNotFound("boom".into())
        );
        assert_eq!(
            EngineError::from(dom("AbortError")),
            EngineError::Aborted("boom".into())
        );
        assert!(matches!(
            EngineError::from(dom("VersionError")),
            EngineError::Open(_)
        ));
        assert!(matches!(
            EngineError::from(dom("QuotaExceededError")),
            EngineError::Request(_)
        ));
    }

    #[test]
    fn test_blocked_and_json_mapping() {
        assert_eq!(
            EngineError::from(IndexedDbError::Blocked("db".into())),
            EngineError::Blocked("db".into())
        );

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            EngineError::from(IndexedDbError::from(json_err)),
            EngineError::Data(_)
        ));
    }
}
