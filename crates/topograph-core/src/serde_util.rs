//! Serde helpers for tolerant document loading.
//!
//! Diagram files come from many editor versions. A field holding a value of
//! the wrong type falls back to its default instead of failing the load.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Deserialize `T`, or `T::default()` when the value has the wrong shape.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Like [`lenient`], but `null` and bad values become `None`.
pub(crate) fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Numbers that default to one (line width, alpha, scale).
pub(crate) fn lenient_one<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(1.0))
}

/// Booleans that default to true.
pub(crate) fn lenient_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_bool().unwrap_or(true))
}

pub(crate) fn one() -> f64 {
    1.0
}

pub(crate) fn yes() -> bool {
    true
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

pub(crate) fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient")]
        count: u32,
        #[serde(default = "one", deserialize_with = "lenient_one")]
        alpha: f64,
        #[serde(default, deserialize_with = "lenient_opt")]
        label: Option<String>,
    }

    #[test]
    fn test_wrong_types_fall_back() {
        let s: Sample = serde_json::from_str(r#"{"count": "x", "alpha": "y", "label": 3}"#).unwrap();
        assert_eq!(s.count, 0);
        assert_eq!(s.alpha, 1.0);
        assert!(s.label.is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let s: Sample = serde_json::from_str("{}").unwrap();
        assert_eq!(s.count, 0);
        assert_eq!(s.alpha, 1.0);
    }

    #[test]
    fn test_good_values_kept() {
        let s: Sample = serde_json::from_str(r#"{"count": 4, "alpha": 0.5, "label": "a"}"#).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.alpha, 0.5);
        assert_eq!(s.label.as_deref(), Some("a"));
    }
}
