//! Conversion between idbkv types and JS values
//!
//! Keys map onto the IndexedDB key types the core understands: numbers,
//! strings, and arrays of those. Records cross the boundary as JSON text,
//! so a stored value is always plain data.

use idbkv_core::{Key, Record};
use js_sys::Array;
use wasm_bindgen::JsValue;

use crate::error::{describe, IndexedDbError, Result};

/// Convert a key to its JS form.
pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Number(n) => JsValue::from_f64(*n),
        Key::String(s) => JsValue::from_str(s),
        Key::Array(items) => {
            let array = Array::new();
            for item in items {
                array.push(&key_to_js(item));
            }
            array.into()
        }
    }
}

/// Read a key returned by IndexedDB.
pub fn key_from_js(val: &JsValue) -> Result<Key> {
    if let Some(n) = val.as_f64() {
        return Ok(Key::Number(n));
    }
    if let Some(s) = val.as_string() {
        return Ok(Key::String(s));
    }
    if Array::is_array(val) {
        let array = Array::from(val);
        let mut items = Vec::with_capacity(array.length() as usize);
        for item in array.iter() {
            items.push(key_from_js(&item)?);
        }
        return Ok(Key::Array(items));
    }
    Err(IndexedDbError::JsValue(format!(
        "unsupported key: {}",
        describe(val)
    )))
}

/// Convert a record to a JS value via JSON.
pub fn value_to_js(value: &Record) -> Result<JsValue> {
    let json = serde_json::to_string(value)?;
    js_sys::JSON::parse(&json).map_err(|e| IndexedDbError::JsValue(describe(&e)))
}

/// Convert a stored JS value back to a record.
pub fn value_from_js(val: &JsValue) -> Result<Record> {
    if val.is_undefined() {
        return Ok(Record::Null);
    }
    let json = js_sys::JSON::stringify(val)
        .map_err(|e| IndexedDbError::JsValue(describe(&e)))?
        .as_string()
        .ok_or_else(|| IndexedDbError::JsValue("value is not JSON serializable".into()))?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use serde_json::json;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_key_conversion() {
        let key = Key::Array(vec![Key::from(1), Key::from("a")]);
        assert_eq!(key_from_js(&key_to_js(&key)).unwrap(), key);
        assert_eq!(key_from_js(&JsValue::from_f64(7.0)).unwrap(), Key::from(7));
    }

    #[wasm_bindgen_test]
    fn test_unsupported_key_rejected() {
        assert!(key_from_js(&JsValue::TRUE).is_err());
        assert!(key_from_js(&JsValue::NULL).is_err());
    }

    #[wasm_bindgen_test]
    fn test_value_conversion() {
        let value = json!({"id": 1, "tags": ["a", "b"], "nested": {"x": null}});
        assert_eq!(value_from_js(&value_to_js(&value).unwrap()).unwrap(), value);
    }
}
