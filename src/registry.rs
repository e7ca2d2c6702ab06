//! Schema Registry - Versioned JSON Schemas by `$id`
//!
//! Construct once, share by `Arc`. Loading happens on the first call to
//! [`SchemaRegistry::initialize`] (or the first validation) and never again.

use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info};

use crate::protocol::{Primitive, ProtocolDescriptor, META_SCHEMA_ID};
use crate::validation::{SchemaViolation, ValidationResult};

const EMBEDDED_SCHEMAS: &[(&str, &str)] = &[
    (
        "schema.schema.json",
        include_str!("../schemas/small/v1/schema.schema.json"),
    ),
    (
        "manifest.schema.json",
        include_str!("../schemas/small/v1/manifest.schema.json"),
    ),
    (
        "artifact.schema.json",
        include_str!("../schemas/small/v1/artifact.schema.json"),
    ),
    (
        "lineage.schema.json",
        include_str!("../schemas/small/v1/lineage.schema.json"),
    ),
    (
        "lifecycle.schema.json",
        include_str!("../schemas/small/v1/lifecycle.schema.json"),
    ),
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Schema not found: {0}. Ensure it's registered in the registry.")]
    SchemaNotFound(String),

    #[error("Schema {origin} has no $id")]
    MissingId { origin: String },

    #[error("Schema {id} is invalid: {message}")]
    InvalidSchema { id: String, message: String },

    #[error("Failed to read schemas at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the SMALL schemas come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaSource {
    /// Copies compiled into the crate.
    #[default]
    Embedded,
    /// Every `*.schema.json` file in a directory.
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    pub id: String,
    pub body: Value,
}

struct SchemaEntry {
    descriptor: SchemaDescriptor,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaEntry")
            .field("id", &self.descriptor.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct SchemaRegistry {
    source: SchemaSource,
    index: OnceCell<HashMap<String, SchemaEntry>>,
    loads: AtomicUsize,
}

fn compile(id: &str, body: &Value) -> Result<jsonschema::Validator, RegistryError> {
    jsonschema::options()
        .with_draft(jsonschema::Draft::Draft202012)
        .should_validate_formats(true)
        .build(body)
        .map_err(|e| RegistryError::InvalidSchema {
            id: id.to_string(),
            message: e.to_string(),
        })
}

fn violations(validator: &jsonschema::Validator, payload: &Value) -> Vec<SchemaViolation> {
    validator
        .iter_errors(payload)
        .map(|e| SchemaViolation {
            instance_path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect()
}

impl SchemaRegistry {
    pub fn new(source: SchemaSource) -> Self {
        Self {
            source,
            index: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn embedded() -> Self {
        Self::new(SchemaSource::Embedded)
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(SchemaSource::Directory(dir.into()))
    }

    /// Load the meta-schema and the SMALL schemas. Runs once; concurrent
    /// first callers block until the winner finishes. A failed load is
    /// retried on the next call.
    pub fn initialize(&self) -> Result<(), RegistryError> {
        self.index().map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.index.get().is_some()
    }

    /// Number of load attempts, failed ones included.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn index(&self) -> Result<&HashMap<String, SchemaEntry>, RegistryError> {
        self.index.get_or_try_init(|| self.load())
    }

    fn load(&self) -> Result<HashMap<String, SchemaEntry>, RegistryError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        info!(source = ?self.source, "loading schema registry");
        let mut index = HashMap::new();

        let meta_body = json!({ "$ref": META_SCHEMA_ID });
        let meta = compile(META_SCHEMA_ID, &meta_body)?;

        for (origin, raw) in self.read_sources()? {
            let body: Value = serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                origin: origin.clone(),
                source,
            })?;

            let id = body
                .get("$id")
                .and_then(Value::as_str)
                .ok_or_else(|| RegistryError::MissingId {
                    origin: origin.clone(),
                })?
                .to_string();

            let problems = violations(&meta, &body);
            if !problems.is_empty() {
                let message = problems
                    .iter()
                    .map(|v| format!("{}: {}", v.instance_path, v.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(RegistryError::InvalidSchema { id, message });
            }

            if index.contains_key(&id) {
                debug!(%id, %origin, "schema already registered, keeping first");
                continue;
            }

            let validator = compile(&id, &body)?;
            debug!(%id, %origin, "registered schema");
            index.insert(
                id.clone(),
                SchemaEntry {
                    descriptor: SchemaDescriptor { id, body },
                    validator,
                },
            );
        }

        index.insert(
            META_SCHEMA_ID.to_string(),
            SchemaEntry {
                descriptor: SchemaDescriptor {
                    id: META_SCHEMA_ID.to_string(),
                    body: meta_body,
                },
                validator: meta,
            },
        );

        info!(schemas = index.len(), "schema registry ready");
        Ok(index)
    }

    fn read_sources(&self) -> Result<Vec<(String, String)>, RegistryError> {
        match &self.source {
            SchemaSource::Embedded => Ok(EMBEDDED_SCHEMAS
                .iter()
                .map(|(name, raw)| (format!("embedded:{}", name), raw.to_string()))
                .collect()),
            SchemaSource::Directory(dir) => read_dir_sources(dir),
        }
    }

    /// True once initialized and holding `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.index.get().is_some_and(|index| index.contains_key(id))
    }

    pub fn schema_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .index
            .get()
            .map(|index| index.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn descriptor(&self, id: &str) -> Result<&SchemaDescriptor, RegistryError> {
        self.index()?
            .get(id)
            .map(|entry| &entry.descriptor)
            .ok_or_else(|| RegistryError::SchemaNotFound(id.to_string()))
    }

    /// Validate `payload` against the schema registered as `id`.
    ///
    /// An unknown id is a configuration defect and returns `Err`; payload
    /// problems are reported in the returned [`ValidationResult`].
    pub fn validate(&self, id: &str, payload: &Value) -> Result<ValidationResult, RegistryError> {
        let entry = self
            .index()?
            .get(id)
            .ok_or_else(|| RegistryError::SchemaNotFound(id.to_string()))?;
        Ok(ValidationResult::from_violations(violations(
            &entry.validator,
            payload,
        )))
    }

    pub fn validate_primitive(
        &self,
        primitive: Primitive,
        payload: &Value,
    ) -> Result<ValidationResult, RegistryError> {
        let id = ProtocolDescriptor::current()
            .schema_id(primitive)
            .ok_or_else(|| RegistryError::SchemaNotFound(primitive.schema_key().to_string()))?;
        self.validate(&id, payload)
    }

    /// Validate against the canonical manifest schema.
    pub fn validate_manifest(&self, payload: &Value) -> Result<ValidationResult, RegistryError> {
        self.validate_primitive(Primitive::Manifest, payload)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::embedded()
    }
}

fn read_dir_sources(dir: &Path) -> Result<Vec<(String, String)>, RegistryError> {
    let io_err = |source| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_schema = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".schema.json"));
        if is_schema {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let raw = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            Ok((path.display().to_string(), raw))
        })
        .collect()
}
