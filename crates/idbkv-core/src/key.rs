//! Primary keys

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::EngineError;

/// Largest integer a key generator will hand out (2^53).
pub const MAX_GENERATED_KEY: u64 = 9_007_199_254_740_992;

/// A primary-key value.
///
/// Keys are ordered the way IndexedDB orders them: every number sorts before
/// every string and every string before every array. Numbers compare
/// numerically, strings by code unit, arrays element-wise and then by length.
///
/// Keys are treated as opaque tokens by the client; callers get them back
/// from `add_data` or from a scan and hand them to the other operations.
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    String(String),
    Array(Vec<Key>),
}

impl Key {
    /// Extract a key from a JSON value.
    ///
    /// Only numbers, strings and arrays of valid keys are keys; anything else
    /// is a data error.
    pub fn from_json(value: &Value) -> Result<Self, EngineError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|f| !f.is_nan())
                .map(Key::Number)
                .ok_or_else(|| EngineError::Data(format!("{} is not a valid key", n))),
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Key::Array),
            other => Err(EngineError::Data(format!("{} is not a valid key", other))),
        }
    }

    /// Render the key as JSON. Integral numbers become JSON integers.
    pub fn to_json(&self) -> Value {
        match self {
            Key::Number(n) => number_to_json(*n),
            Key::String(s) => Value::String(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_json).collect()),
        }
    }

    /// The numeric value, if this is a number key.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string value, if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::String(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_GENERATED_KEY as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Key::Number(n) => write!(f, "{}", n),
            Key::String(s) => write!(f, "{:?}", s),
            Key::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Key::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_before_strings_before_arrays() {
        let mut keys = vec![
            Key::Array(vec![Key::from(1)]),
            Key::from("a"),
            Key::from(10),
            Key::from(2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::from(2),
                Key::from(10),
                Key::from("a"),
                Key::Array(vec![Key::from(1)]),
            ]
        );
    }

    #[test]
    fn test_array_ordering_is_elementwise_then_length() {
        let short = Key::Array(vec![Key::from(1)]);
        let long = Key::Array(vec![Key::from(1), Key::from(0)]);
        let bigger = Key::Array(vec![Key::from(2)]);
        assert!(short < long);
        assert!(long < bigger);
    }

    #[test]
    fn test_from_json_accepts_valid_keys() {
        assert_eq!(Key::from_json(&json!(7)).unwrap(), Key::from(7));
        assert_eq!(Key::from_json(&json!("k")).unwrap(), Key::from("k"));
        assert_eq!(
            Key::from_json(&json!([1, "x"])).unwrap(),
            Key::Array(vec![Key::from(1), Key::from("x")])
        );
    }

    #[test]
    fn test_from_json_rejects_invalid_keys() {
        for value in [json!(null), json!(true), json!({"a": 1}), json!([1, null])] {
            assert!(matches!(Key::from_json(&value), Err(EngineError::Data(_))));
        }
    }

    #[test]
    fn test_integral_numbers_render_as_integers() {
        assert_eq!(Key::from(3).to_json(), json!(3));
        assert_eq!(Key::from(2.5).to_json(), json!(2.5));
        assert_eq!(Key::from(3).to_string(), "3");
        assert_eq!(Key::from("a").to_string(), "\"a\"");
    }

    #[test]
    fn test_serde_uses_json_form() {
        let key: Key = serde_json::from_str("[1,\"b\"]").unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "[1,\"b\"]");
    }
}
