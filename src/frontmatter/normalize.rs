//! Conversion of the host's live frontmatter into a transport-safe tree.
//!
//! The output mirrors the input exactly: same keys in the same order, same
//! list lengths. Strings are classified (date, date-time, text) but their text
//! is never rewritten, so normalizing a serialized result again is a no-op.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Number;
use serde_yaml::{Mapping, Value as YamlValue};

use super::dates::{classify, StringKind};

#[derive(Debug, Clone, PartialEq)]
pub enum FrontmatterValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Date(String),
    DateTime(String),
    List(Vec<FrontmatterValue>),
    Map(FrontmatterMap),
}

impl FrontmatterValue {
    /// The string content of `Text`, `Date` and `DateTime` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FrontmatterValue::Text(s) | FrontmatterValue::Date(s) | FrontmatterValue::DateTime(s) => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn is_date_like(&self) -> bool {
        matches!(self, FrontmatterValue::Date(_) | FrontmatterValue::DateTime(_))
    }
}

/// Ordered key/value entries.
///
/// Entries are kept as a list so keys that collapse to the same string (for
/// example YAML `1` and `"1"`) are never merged away.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrontmatterMap {
    entries: Vec<(String, FrontmatterValue)>,
}

impl FrontmatterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: FrontmatterValue) {
        self.entries.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&FrontmatterValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrontmatterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FrontmatterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FrontmatterValue::Null => serializer.serialize_unit(),
            FrontmatterValue::Bool(b) => serializer.serialize_bool(*b),
            FrontmatterValue::Number(n) => n.serialize(serializer),
            FrontmatterValue::Text(s) | FrontmatterValue::Date(s) | FrontmatterValue::DateTime(s) => {
                serializer.serialize_str(s)
            }
            FrontmatterValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FrontmatterValue::Map(map) => map.serialize(serializer),
        }
    }
}

impl Serialize for FrontmatterMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Normalize a frontmatter mapping. Read-only: `map` is never modified.
pub fn normalize(map: &Mapping) -> FrontmatterMap {
    let mut out = FrontmatterMap::new();
    for (key, value) in map {
        out.push(key_to_string(key), normalize_value(value));
    }
    out
}

/// Normalize one frontmatter value, recursing into lists and nested maps.
pub fn normalize_value(value: &YamlValue) -> FrontmatterValue {
    match value {
        YamlValue::Null => FrontmatterValue::Null,
        YamlValue::Bool(b) => FrontmatterValue::Bool(*b),
        YamlValue::Number(n) => normalize_number(n),
        YamlValue::String(s) => match classify(s) {
            StringKind::Date => FrontmatterValue::Date(s.clone()),
            StringKind::DateTime => FrontmatterValue::DateTime(s.clone()),
            StringKind::Text => FrontmatterValue::Text(s.clone()),
        },
        YamlValue::Sequence(items) => {
            FrontmatterValue::List(items.iter().map(normalize_value).collect())
        }
        YamlValue::Mapping(map) => FrontmatterValue::Map(normalize(map)),
        YamlValue::Tagged(tagged) => normalize_value(&tagged.value),
    }
}

fn normalize_number(n: &serde_yaml::Number) -> FrontmatterValue {
    if let Some(i) = n.as_i64() {
        return FrontmatterValue::Number(Number::from(i));
    }
    if let Some(u) = n.as_u64() {
        return FrontmatterValue::Number(Number::from(u));
    }
    // JSON has no NaN or infinity; keep YAML's spelling as text.
    n.as_f64()
        .and_then(Number::from_f64)
        .map(FrontmatterValue::Number)
        .unwrap_or_else(|| FrontmatterValue::Text(n.to_string()))
}

fn key_to_string(key: &YamlValue) -> String {
    match key {
        YamlValue::String(s) => s.clone(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Null => "null".to_string(),
        YamlValue::Tagged(tagged) => key_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
