use std::collections::HashMap;
use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;

use framelink_channel::is_known;
use jsonschema::Validator;
use serde_json::{Map, Value};
use tracing::debug;

use crate::builtin::BUILTIN_SCHEMAS;
use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::validator::validate_payload;

const SCHEMA_FILE_SUFFIX: &str = ".schema.json";

/// Subschema keywords holding a map of schemas.
const MAP_KEYWORDS: [&str; 5] = [
    "properties",
    "patternProperties",
    "dependentSchemas",
    "$defs",
    "definitions",
];

/// Subschema keywords holding a single schema.
const SINGLE_KEYWORDS: [&str; 11] = [
    "propertyNames",
    "additionalProperties",
    "unevaluatedProperties",
    "items",
    "contains",
    "additionalItems",
    "unevaluatedItems",
    "not",
    "if",
    "then",
    "else",
];

/// Subschema keywords holding an array of schemas.
const ARRAY_KEYWORDS: [&str; 4] = ["prefixItems", "allOf", "anyOf", "oneOf"];

/// Keywords that only make sense on object schemas.
const OBJECT_KEYWORDS: [&str; 8] = [
    "properties",
    "patternProperties",
    "additionalProperties",
    "unevaluatedProperties",
    "required",
    "dependentRequired",
    "dependentSchemas",
    "propertyNames",
];

/// Message-name keyed registry of compiled JSON Schema validators.
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Registry holding the schema of every inbound catalog message.
    pub fn builtin() -> Result<Self> {
        Self::builtin_with_config(RegistryConfig::default())
    }

    /// Builtin schemas compiled under an explicit config.
    pub fn builtin_with_config(config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        for (name, schema) in BUILTIN_SCHEMAS {
            registry.register(name, schema)?;
        }
        Ok(registry)
    }

    /// Register a schema for a message name from a JSON string.
    pub fn register(&mut self, name: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(name, &schema)
    }

    /// Register a schema for a message name from a JSON value.
    ///
    /// Replaces any schema already registered under `name`.
    pub fn register_value(&mut self, name: &str, schema: &Value) -> Result<()> {
        let mut schema_to_compile = schema.clone();
        if self.config.strict_mode {
            apply_strict_mode(&mut schema_to_compile);
        }

        let compiled = jsonschema::validator_for(&schema_to_compile)
            .map_err(|err| SchemaError::CompileFailed(format!("{name}: {err}")))?;

        if self.validators.insert(name.to_string(), compiled).is_some() {
            debug!(message_name = name, "replaced registered schema");
        }
        Ok(())
    }

    /// Load from embedded `(name, schema)` pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (name, schema) in schemas {
            registry.register(name, schema)?;
        }
        Ok(registry)
    }

    /// Load schemas from a directory of `<message-name>.schema.json` files.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load schemas from a directory with explicit config.
    ///
    /// Other files are ignored. A `.schema.json` file naming an unknown message,
    /// a symlinked schema, or a file over the configured limits fails the load.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        registry.load_directory(path)?;
        Ok(registry)
    }

    /// Add (or override) schemas from a directory.
    pub fn load_directory(&mut self, path: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        let mut loaded = 0usize;
        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(name) = file_name.strip_suffix(SCHEMA_FILE_SUFFIX) else {
                continue;
            };

            let entry_path = entry.path();
            let metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            if metadata.file_type().is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !metadata.is_file() {
                continue;
            }
            if !is_known(name) {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file names an unknown message: {file_name}"
                )));
            }

            loaded = loaded.saturating_add(1);
            if loaded > self.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({})",
                    self.config.max_schemas_from_directory
                )));
            }

            let content =
                read_schema_file(&entry_path, &metadata, self.config.max_schema_file_size)?;
            self.register(name, &content)?;
            debug!(message_name = name, path = %entry_path.display(), "loaded schema");
        }

        Ok(loaded)
    }

    /// Validate a payload against the schema registered for `name`.
    pub fn validate(&self, name: &str, payload: &Value) -> Result<()> {
        match self.validators.get(name) {
            Some(validator) => validate_payload(name, payload, validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(name.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Check if a message name has a registered schema.
    pub fn has_schema(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    /// Message names that have registered schemas, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("names", &self.names())
            .field("config", &self.config)
            .finish()
    }
}

/// Read a schema file checked earlier through `checked`, its
/// `symlink_metadata`. Fails if the path now opens a different file.
fn read_schema_file(path: &Path, checked: &Metadata, max_bytes: usize) -> Result<String> {
    let file = File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;
    let opened = file
        .metadata()
        .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

    #[cfg(unix)]
    {
        if !same_file_identity(checked, &opened) {
            return Err(SchemaError::LoadFailed(format!(
                "schema file changed during load: {}",
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = checked;

    if opened.len() > max_bytes as u64 {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large ({} bytes, max {max_bytes}): {}",
            opened.len(),
            path.display()
        )));
    }

    let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;

    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file grew while reading (max {max_bytes} bytes): {}",
            path.display()
        )));
    }
    Ok(content)
}

#[cfg(unix)]
fn same_file_identity(checked: &Metadata, opened: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    checked.dev() == opened.dev() && checked.ino() == opened.ino()
}

/// Close every object schema to additional properties, recursively.
fn apply_strict_mode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_object_schema(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for keyword in MAP_KEYWORDS {
                if let Some(Value::Object(children)) = map.get_mut(keyword) {
                    children.values_mut().for_each(apply_strict_mode);
                }
            }
            for keyword in SINGLE_KEYWORDS.iter().chain(ARRAY_KEYWORDS.iter()) {
                if let Some(child) = map.get_mut(*keyword) {
                    apply_strict_mode(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(apply_strict_mode),
        _ => {}
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => OBJECT_KEYWORDS.iter().any(|keyword| map.contains_key(*keyword)),
    }
}
