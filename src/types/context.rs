use std::collections::BTreeMap;

use thiserror::Error;

use super::Value;

/// Read-only view of a listing, mapping dot-separated field paths to [`Value`]s.
///
/// Nested domains (`cpu`, `gpu`, `ram_spec`, `storage.primary`, ...) are
/// stored as nested maps, so `"cpu.cores"` and a pre-flattened
/// `"cpu_cores"` both reach the same leaf. Missing paths resolve to `None`
/// rather than an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    data: BTreeMap<String, ContextValue>,
}

#[derive(Debug, Clone, PartialEq)]
enum ContextValue {
    Leaf(Value),
    Nested(BTreeMap<String, ContextValue>),
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("evaluation context must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    #[error("unsupported value at '{path}': arrays may only contain scalars")]
    UnsupportedValue { path: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EvaluationContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path. Creates intermediate nested maps as needed.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value.into());
        self
    }

    /// Insert a value at a dot-separated path (mutable reference version).
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::insert_recursive(&mut self.data, &segments, value);
    }

    /// Build a context from a JSON object. Nested objects become nested
    /// domains; arrays become list values.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the top level is not an object or an
    /// array contains objects.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ContextError> {
        let serde_json::Value::Object(map) = json else {
            return Err(ContextError::NotAnObject {
                found: json_kind(json),
            });
        };
        Ok(Self {
            data: Self::convert_object(map, "")?,
        })
    }

    /// Parse a JSON string into a context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] on malformed JSON or unsupported shapes.
    pub fn from_json_str(input: &str) -> Result<Self, ContextError> {
        let json: serde_json::Value = serde_json::from_str(input)?;
        Self::from_json(&json)
    }

    /// Look up a value by dot-separated path.
    /// Returns `None` if the path does not exist or points to a nested map.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        Self::get_recursive(&self.data, &segments)
    }

    /// Resolve a field path the way conditions and actions see it: nested
    /// traversal first, then the `_`-joined flat spelling of the same path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        self.get(path).or_else(|| {
            if path.contains('.') {
                self.get_flat(&path.replace('.', "_"))
            } else {
                self.get_flat(path)
            }
        })
    }

    /// Resolve a plain identifier: a top-level leaf, or a nested leaf whose
    /// path joined with `_` equals `name` (`cpu_cores` reaches `cpu.cores`).
    #[must_use]
    pub fn get_flat(&self, name: &str) -> Option<&Value> {
        Self::flat_recursive(&self.data, name)
    }

    /// Whether `path` names a nested domain rather than a leaf.
    #[must_use]
    pub fn is_group(&self, path: &str) -> bool {
        let mut map = &self.data;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match map.get(segment) {
                Some(ContextValue::Nested(nested)) => {
                    if segments.peek().is_none() {
                        return true;
                    }
                    map = nested;
                }
                _ => return false,
            }
        }
        false
    }

    /// All leaf paths in dotted form, sorted.
    #[must_use]
    pub fn field_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        Self::collect_paths(&self.data, "", &mut out);
        out
    }

    /// Number of leaf values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.field_paths().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn insert_recursive(map: &mut BTreeMap<String, ContextValue>, segments: &[&str], value: Value) {
        match segments {
            [] => {}
            [last] => {
                map.insert((*last).to_owned(), ContextValue::Leaf(value));
            }
            [first, rest @ ..] => {
                let entry = map
                    .entry((*first).to_owned())
                    .or_insert_with(|| ContextValue::Nested(BTreeMap::new()));
                match entry {
                    ContextValue::Nested(nested) => {
                        Self::insert_recursive(nested, rest, value);
                    }
                    ContextValue::Leaf(_) => {
                        let mut nested = BTreeMap::new();
                        Self::insert_recursive(&mut nested, rest, value);
                        *entry = ContextValue::Nested(nested);
                    }
                }
            }
        }
    }

    fn get_recursive<'a>(
        map: &'a BTreeMap<String, ContextValue>,
        segments: &[&str],
    ) -> Option<&'a Value> {
        match segments {
            [] => None,
            [last] => match map.get(*last)? {
                ContextValue::Leaf(v) => Some(v),
                ContextValue::Nested(_) => None,
            },
            [first, rest @ ..] => match map.get(*first)? {
                ContextValue::Nested(nested) => Self::get_recursive(nested, rest),
                ContextValue::Leaf(_) => None,
            },
        }
    }

    fn flat_recursive<'a>(map: &'a BTreeMap<String, ContextValue>, name: &str) -> Option<&'a Value> {
        if let Some(ContextValue::Leaf(v)) = map.get(name) {
            return Some(v);
        }
        map.iter().find_map(|(key, value)| match value {
            ContextValue::Nested(nested) => name
                .strip_prefix(key.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .and_then(|rest| Self::flat_recursive(nested, rest)),
            ContextValue::Leaf(_) => None,
        })
    }

    fn collect_paths(map: &BTreeMap<String, ContextValue>, prefix: &str, out: &mut Vec<String>) {
        for (key, value) in map {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match value {
                ContextValue::Leaf(_) => out.push(path),
                ContextValue::Nested(nested) => Self::collect_paths(nested, &path, out),
            }
        }
    }

    fn convert_object(
        map: &serde_json::Map<String, serde_json::Value>,
        prefix: &str,
    ) -> Result<BTreeMap<String, ContextValue>, ContextError> {
        let mut out = BTreeMap::new();
        for (key, json) in map {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            let converted = match json {
                serde_json::Value::Object(nested) => {
                    ContextValue::Nested(Self::convert_object(nested, &path)?)
                }
                other => ContextValue::Leaf(
                    Value::from_json(other).ok_or(ContextError::UnsupportedValue { path })?,
                ),
            };
            out.insert(key.clone(), converted);
        }
        Ok(out)
    }
}

impl TryFrom<serde_json::Value> for EvaluationContext {
    type Error = ContextError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_json(&json)
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
