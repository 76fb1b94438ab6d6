use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Per-decode configuration.
///
/// `record_length_size` is the only option the engine itself interprets:
/// the byte width of a record length prefix, with `0` selecting start-code
/// framing. Everything else is an opaque option handed to the format's
/// decode routine as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_length_size: Option<u64>,
    #[serde(flatten)]
    pub options: Map<String, JsonValue>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record_length_size(mut self, n: u64) -> Self {
        self.record_length_size = Some(n);
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Overlay `overrides` onto `self`: set fields win, unset fields keep
    /// the value from `self`.
    pub fn merged_with(&self, overrides: &Config) -> Config {
        let mut out = self.clone();
        if overrides.record_length_size.is_some() {
            out.record_length_size = overrides.record_length_size;
        }
        for (k, v) in &overrides.options {
            out.options.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn record_length_size(&self) -> u64 {
        self.record_length_size.unwrap_or(0)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.options.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(JsonValue::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(JsonValue::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(JsonValue::as_str)
    }

    /// Parse a `key=value` pair as given on a command line. The value is
    /// read as JSON when it parses, otherwise kept as a string.
    pub fn parse_option(pair: &str) -> Option<(String, JsonValue)> {
        let (k, v) = pair.split_once('=')?;
        let k = k.trim();
        if k.is_empty() {
            return None;
        }
        let v = serde_json::from_str(v).unwrap_or_else(|_| JsonValue::String(v.to_string()));
        Some((k.to_string(), v))
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
