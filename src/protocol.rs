//! Protocol Descriptor - The SMALL Contract
//!
//! One immutable descriptor per process. Documents and manifests are checked
//! against it; it is never loaded from disk.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const PROTOCOL_NAME: &str = "SMALL";
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Versions accepted by the fingerprint generator.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["1.0.0"];

/// Origin the schema paths resolve against to form registry identifiers.
pub const SCHEMA_ORIGIN: &str = "https://smallprotocol.dev";

pub const META_SCHEMA_ID: &str = "https://json-schema.org/draft/2020-12/schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Primitive {
    Schema,
    Manifest,
    Artifact,
    Lineage,
    Lifecycle,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::Schema,
        Primitive::Manifest,
        Primitive::Artifact,
        Primitive::Lineage,
        Primitive::Lifecycle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Schema => "Schema",
            Primitive::Manifest => "Manifest",
            Primitive::Artifact => "Artifact",
            Primitive::Lineage => "Lineage",
            Primitive::Lifecycle => "Lifecycle",
        }
    }

    /// Key used in the descriptor's schema map.
    pub fn schema_key(&self) -> &'static str {
        match self {
            Primitive::Schema => "schema",
            Primitive::Manifest => "manifest",
            Primitive::Artifact => "artifact",
            Primitive::Lineage => "lineage",
            Primitive::Lifecycle => "lifecycle",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Primitive::as_str).collect()
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Primitive {
    type Err = String;

    /// Exact, case-sensitive match on the canonical name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown primitive: {}", s))
    }
}

/// Rules and schemas keep their declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolDescriptor {
    pub protocol: String,
    pub version: String,
    pub primitives: Vec<Primitive>,
    pub rules: Vec<(String, bool)>,
    pub schemas: Vec<(String, String)>,
}

static SMALL_V1: Lazy<ProtocolDescriptor> = Lazy::new(|| {
    let rules = [
        "materializationRequiresValidation",
        "artifactsAreImmutable",
        "lineageIsAppendOnly",
        "lifecycleIsEventBased",
        "explicitContractsOnly",
    ]
    .into_iter()
    .map(|name| (name.to_string(), true))
    .collect();

    let schemas = Primitive::ALL
        .iter()
        .map(|p| {
            (
                p.schema_key().to_string(),
                format!("/schemas/small/v1/{}.schema.json", p.schema_key()),
            )
        })
        .collect();

    ProtocolDescriptor {
        protocol: PROTOCOL_NAME.to_string(),
        version: PROTOCOL_VERSION.to_string(),
        primitives: Primitive::ALL.to_vec(),
        rules,
        schemas,
    }
});

impl ProtocolDescriptor {
    /// The process-wide SMALL descriptor.
    pub fn current() -> &'static ProtocolDescriptor {
        &SMALL_V1
    }

    /// Registry identifier for a primitive's schema.
    pub fn schema_id(&self, primitive: Primitive) -> Option<String> {
        self.schemas
            .iter()
            .find(|(key, _)| key == primitive.schema_key())
            .map(|(_, path)| format!("{}{}", SCHEMA_ORIGIN, path))
    }

    /// Every schema identifier the descriptor references.
    pub fn schema_ids(&self) -> Vec<String> {
        self.schemas
            .iter()
            .map(|(_, path)| format!("{}{}", SCHEMA_ORIGIN, path))
            .collect()
    }

    pub fn rule(&self, name: &str) -> Option<bool> {
        self.rules
            .iter()
            .find(|(rule, _)| rule == name)
            .map(|(_, enabled)| *enabled)
    }

    pub fn semver(&self) -> Result<semver::Version, semver::Error> {
        semver::Version::parse(&self.version)
    }

    /// JSON form served verbatim to consumers. Key order is declaration order.
    pub fn to_json(&self) -> Value {
        let rules: Map<String, Value> = self
            .rules
            .iter()
            .map(|(name, enabled)| (name.clone(), Value::Bool(*enabled)))
            .collect();
        let schemas: Map<String, Value> = self
            .schemas
            .iter()
            .map(|(key, path)| (key.clone(), Value::String(path.clone())))
            .collect();

        let mut out = Map::new();
        out.insert("protocol".into(), Value::String(self.protocol.clone()));
        out.insert("version".into(), Value::String(self.version.clone()));
        out.insert(
            "primitives".into(),
            self.primitives
                .iter()
                .map(|p| Value::String(p.as_str().to_string()))
                .collect(),
        );
        out.insert("rules".into(), Value::Object(rules));
        out.insert("schemas".into(), Value::Object(schemas));
        Value::Object(out)
    }
}

pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}
