//! Path-addressed configuration with per-key validation
//!
//! `Config` stores a JSON object tree addressed by dot paths. Mutations
//! that leave the tree structurally unchanged are silent no-ops; real
//! changes run the installed parser for the touched top-level key and emit
//! a [`ConfigChange`] on the change store.
//!
//! # Example
//!
//! ```rust,ignore
//! use service_runtime::{Config, ObjectPath};
//!
//! let config = Config::new();
//! config.set(&"server.port".parse()?, serde_json::json!(8080), None)?;
//!
//! let port = config.get_defined(&"server.port".parse()?)?;
//! assert_eq!(port, serde_json::json!(8080));
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use value_store::{Subscription, ValueStore};

use crate::error::{ConfigError, HandlerError};

// ============================================================================
// ObjectPath
// ============================================================================

/// A dot-separated path into the configuration tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath(Vec<String>);

impl ObjectPath {
    /// Build a path from segments
    ///
    /// Fails on an empty list or an empty segment.
    pub fn new(segments: Vec<String>) -> Result<Self, ConfigError> {
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidPath(segments.join(".")));
        }
        Ok(Self(segments))
    }

    /// The path's segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The first segment, which selects the validated subtree
    pub fn top_level(&self) -> &str {
        &self.0[0]
    }
}

impl FromStr for ObjectPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split('.').map(str::to_string).collect())
    }
}

impl std::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

// ============================================================================
// Change events and parsers
// ============================================================================

/// Event emitted after a mutation actually changed the tree
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// Path that was written
    pub path: ObjectPath,
    /// Caller-supplied mutation tag, if any
    pub triggered_by: Option<String>,
}

/// Validator/normaliser applied to a top-level subtree on every mutation
/// that touches it; the returned value replaces the subtree
pub type ParserFn = Arc<dyn Fn(&Value) -> Result<Value, HandlerError> + Send + Sync>;

// ============================================================================
// Schema validation contract
// ============================================================================

/// Result of validating a whole object
#[derive(Debug, Clone)]
pub struct Validation {
    /// Possibly normalised value
    pub value: Value,
    /// Human-readable failure, `None` on success
    pub error: Option<String>,
}

/// Result of validating a single property
#[derive(Debug, Clone)]
pub struct PropertyValidation {
    /// Possibly normalised value
    pub value: Value,
    /// Final value after defaults were applied, when it differs
    pub final_value: Option<Value>,
    /// Human-readable failure, `None` on success
    pub error: Option<String>,
}

/// Contract for pluggable schema validators
pub trait SchemaValidator: Send + Sync {
    /// Validate an entire object; with `abort_early` the first failure ends
    /// the validation
    fn validate(&self, value: &Value, abort_early: bool) -> Validation;

    /// Validate one property of an object
    fn validate_property(&self, value: &Value, key: &str) -> PropertyValidation;
}

/// Adapt a schema validator into a per-key parser
pub fn parser_from_schema(schema: Arc<dyn SchemaValidator>) -> ParserFn {
    Arc::new(move |value| {
        let outcome = schema.validate(value, true);
        match outcome.error {
            Some(message) => Err(message.into()),
            None => Ok(outcome.value),
        }
    })
}

// ============================================================================
// Config
// ============================================================================

/// Keyed configuration tree with structural no-op writes
///
/// Cloning shares the same tree, parsers and change store.
pub struct Config {
    root: Arc<Mutex<Value>>,
    parsers: Arc<Mutex<HashMap<String, ParserFn>>>,
    changes: ValueStore<ConfigChange>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            parsers: Arc::clone(&self.parsers),
            changes: self.changes.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "top_level_keys",
                &self.root.lock().as_object().map(|o| o.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl Config {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self {
            root: Arc::new(Mutex::new(Value::Object(Map::new()))),
            parsers: Arc::new(Mutex::new(HashMap::new())),
            changes: ValueStore::new(),
        }
    }

    /// Create a configuration seeded with an object tree
    pub fn with_values(values: Map<String, Value>) -> Self {
        let config = Self::new();
        *config.root.lock() = Value::Object(values);
        config
    }

    /// Value at `path`, or `None` when unset
    pub fn get(&self, path: &ObjectPath) -> Option<Value> {
        lookup(&self.root.lock(), path).cloned()
    }

    /// Value at `path`; missing values are an error
    pub fn get_defined(&self, path: &ObjectPath) -> Result<Value, ConfigError> {
        self.get(path)
            .ok_or_else(|| ConfigError::Missing(path.to_string()))
    }

    /// Write `value` at `path`
    ///
    /// Structurally equal writes do nothing. Otherwise intermediate objects
    /// are created as needed, the parser installed for the path's top-level
    /// key normalises the new subtree, and a change event is emitted.
    pub fn set(
        &self,
        path: &ObjectPath,
        value: Value,
        triggered_by: Option<&str>,
    ) -> Result<(), ConfigError> {
        let snapshot = self.root.lock().clone();
        if lookup(&snapshot, path) == Some(&value) {
            return Ok(());
        }

        let mut candidate = snapshot;
        write_at(&mut candidate, path, value)?;

        let parser = self.parsers.lock().get(path.top_level()).cloned();
        if let Some(parser) = parser {
            let key = path.top_level().to_string();
            let subtree = candidate
                .get(&key)
                .cloned()
                .unwrap_or(Value::Null);
            let normalised = parser(&subtree).map_err(|source| ConfigError::Validation {
                key: key.clone(),
                source,
            })?;
            candidate[&key] = normalised;
        }

        *self.root.lock() = candidate;
        debug!(path = %path, triggered_by, "config value changed");
        self.changes.set(ConfigChange {
            path: path.clone(),
            triggered_by: triggered_by.map(str::to_string),
        });
        Ok(())
    }

    /// Install or remove the parser for a top-level key
    pub fn set_parser(&self, key: impl Into<String>, parser: Option<ParserFn>) {
        let key = key.into();
        let mut parsers = self.parsers.lock();
        match parser {
            Some(parser) => {
                parsers.insert(key, parser);
            }
            None => {
                parsers.remove(&key);
            }
        }
    }

    /// Subscribe a closure to change events
    pub fn subscribe_fn(
        &self,
        f: impl Fn(&ConfigChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.changes.subscribe_fn(f, false)
    }

    /// The change store itself
    pub fn changes(&self) -> &ValueStore<ConfigChange> {
        &self.changes
    }

    /// Clone of the whole tree
    pub fn snapshot(&self) -> Value {
        self.root.lock().clone()
    }
}

fn lookup<'a>(root: &'a Value, path: &ObjectPath) -> Option<&'a Value> {
    let mut cursor = root;
    for segment in path.segments() {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

fn write_at(root: &mut Value, path: &ObjectPath, value: Value) -> Result<(), ConfigError> {
    let mut cursor = root;
    let (last, parents) = path
        .segments()
        .split_last()
        .expect("path segments are never empty");

    for segment in parents {
        let object = cursor
            .as_object_mut()
            .ok_or_else(|| ConfigError::NotAnObject(path.to_string()))?;
        cursor = object
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    cursor
        .as_object_mut()
        .ok_or_else(|| ConfigError::NotAnObject(path.to_string()))?
        .insert(last.clone(), value);
    Ok(())
}
