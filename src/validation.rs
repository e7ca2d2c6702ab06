//! Validation System - Schema Results and Protocol Checks
//!
//! Payload problems come back as data ([`ValidationResult`]).
//! Contract violations come back as errors ([`ProtocolError`]).

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::frontmatter::{Frontmatter, FrontmatterValue};
use crate::protocol::{Primitive, ProtocolDescriptor, META_SCHEMA_ID};
use crate::registry::SchemaRegistry;

/// One field-level schema failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaViolation {
    /// JSON pointer into the payload; empty for the root.
    pub instance_path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<SchemaViolation>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            errors: vec![],
        }
    }

    pub fn from_violations(errors: Vec<SchemaViolation>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.instance_path, e.message))
            .collect()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The registry is unusable. Not attributable to any one document.
    #[error("Schema registry verification failed:\n{}", format_problems(.0))]
    RegistryVerification(Vec<String>),

    #[error("Invalid {field} in {identity}: expected \"{expected}\", got \"{actual}\"")]
    Mismatch {
        identity: String,
        field: String,
        expected: String,
        actual: String,
    },
}

fn format_problems(problems: &[String]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Manifest every healthy registry must accept.
pub fn reference_manifest() -> serde_json::Value {
    json!({
        "artifact": "track.audio",
        "schema": "artifact.v1",
        "version": 1
    })
}

/// Checks document frontmatter against the protocol descriptor.
///
/// The first call verifies the registry; later calls skip that step once it
/// has succeeded.
#[derive(Debug)]
pub struct ProtocolValidator {
    registry: Arc<SchemaRegistry>,
    descriptor: &'static ProtocolDescriptor,
    verified: OnceCell<()>,
    verifications: AtomicUsize,
}

impl ProtocolValidator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            descriptor: ProtocolDescriptor::current(),
            verified: OnceCell::new(),
            verifications: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn is_verified(&self) -> bool {
        self.verified.get().is_some()
    }

    /// Number of times the self-check actually ran.
    pub fn verification_count(&self) -> usize {
        self.verifications.load(Ordering::Relaxed)
    }

    /// One-time registry self-check. All problems are reported together.
    pub fn verify_registry(&self) -> Result<(), ProtocolError> {
        self.verified
            .get_or_try_init(|| self.run_verification())
            .map(|_| ())
    }

    fn run_verification(&self) -> Result<(), ProtocolError> {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        info!("verifying schema registry");
        let mut problems = Vec::new();

        if let Err(e) = self.registry.initialize() {
            problems.push(e.to_string());
            return Err(ProtocolError::RegistryVerification(problems));
        }

        if let Err(e) = self.descriptor.semver() {
            problems.push(format!(
                "Protocol version {} is not semver: {}",
                self.descriptor.version, e
            ));
        }

        if !self.registry.contains(META_SCHEMA_ID) {
            problems.push(format!("Meta-schema not found: {}", META_SCHEMA_ID));
        }

        for id in self.descriptor.schema_ids() {
            if !self.registry.contains(&id) {
                problems.push(format!("Schema not found: {}", id));
            }
        }

        match self.registry.validate_manifest(&reference_manifest()) {
            Ok(result) if result.ok => {}
            Ok(result) => problems.push(format!(
                "Example manifest validation failed: {}",
                result.messages().join("; ")
            )),
            Err(e) => problems.push(format!("Failed to validate example manifest: {}", e)),
        }

        if problems.is_empty() {
            debug!("schema registry verified");
            Ok(())
        } else {
            Err(ProtocolError::RegistryVerification(problems))
        }
    }

    /// Validate a document's protocol frontmatter.
    ///
    /// Documents without a `protocol` key are not protocol documents and pass.
    pub fn validate_protocol_doc(
        &self,
        frontmatter: &Frontmatter,
        identity: &str,
    ) -> Result<(), ProtocolError> {
        self.verify_registry()?;

        let Some(protocol) = frontmatter.get("protocol").filter(|v| v.is_truthy()) else {
            return Ok(());
        };

        let mismatch = |field: &str, expected: &str, actual: String| ProtocolError::Mismatch {
            identity: identity.to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            actual,
        };

        if protocol.as_str() != Some(self.descriptor.protocol.as_str()) {
            return Err(mismatch("protocol", &self.descriptor.protocol, protocol.to_string()));
        }

        let version = frontmatter.get("version");
        if version.and_then(FrontmatterValue::as_str) != Some(self.descriptor.version.as_str()) {
            let actual = version.map(ToString::to_string).unwrap_or_default();
            return Err(mismatch("version", &self.descriptor.version, actual));
        }

        if let Some(primitive) = frontmatter.get("primitive").filter(|v| v.is_truthy()) {
            let name = primitive.to_string();
            if name.parse::<Primitive>().is_err() {
                return Err(mismatch("primitive", &Primitive::names().join(", "), name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::parse_frontmatter;
    use crate::registry::SchemaSource;

    fn validator() -> ProtocolValidator {
        ProtocolValidator::new(Arc::new(SchemaRegistry::embedded()))
    }

    fn fm(src: &str) -> Frontmatter {
        parse_frontmatter(src).frontmatter
    }

    #[test]
    fn test_non_protocol_doc_passes() {
        let v = validator();
        v.validate_protocol_doc(&fm("---\ntitle: x\n---\n"), "a.md").unwrap();
        assert!(v.is_verified());
    }

    #[test]
    fn test_valid_protocol_doc() {
        validator()
            .validate_protocol_doc(
                &fm("---\nprotocol: SMALL\nversion: \"1.0.0\"\nprimitive: Lineage\n---\n"),
                "lineage.md",
            )
            .unwrap();
    }

    #[test]
    fn test_wrong_protocol_name() {
        let err = validator()
            .validate_protocol_doc(&fm("---\nprotocol: small\nversion: 1.0.0\n---\n"), "a.md")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Invalid protocol in a.md: expected "SMALL", got "small""#
        );
    }

    #[test]
    fn test_wrong_version_names_expected_and_actual() {
        let err = validator()
            .validate_protocol_doc(&fm("---\nprotocol: SMALL\nversion: 1.1.0\n---\n"), "docs/b.md")
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Mismatch {
                identity: "docs/b.md".into(),
                field: "version".into(),
                expected: "1.0.0".into(),
                actual: "1.1.0".into(),
            }
        );
    }

    #[test]
    fn test_numeric_or_missing_version_rejected() {
        let v = validator();
        let numeric = v
            .validate_protocol_doc(&fm("---\nprotocol: SMALL\nversion: 1\n---\n"), "c.md")
            .unwrap_err();
        assert!(numeric.to_string().contains(r#"got "1""#));
        let missing = v
            .validate_protocol_doc(&fm("---\nprotocol: SMALL\n---\n"), "c.md")
            .unwrap_err();
        assert!(missing.to_string().contains(r#"got """#));
    }

    #[test]
    fn test_unknown_primitive() {
        let err = validator()
            .validate_protocol_doc(
                &fm("---\nprotocol: SMALL\nversion: 1.0.0\nprimitive: Widget\n---\n"),
                "d.md",
            )
            .unwrap_err();
        match err {
            ProtocolError::Mismatch { field, actual, .. } => {
                assert_eq!(field, "primitive");
                assert_eq!(actual, "Widget");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_broken_registry_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("other.schema.json"),
            r#"{"$id": "urn:test:other"}"#,
        )
        .unwrap();
        let v = ProtocolValidator::new(Arc::new(SchemaRegistry::new(SchemaSource::Directory(
            dir.path().to_path_buf(),
        ))));

        let err = v.validate_protocol_doc(&Frontmatter::new(), "a.md").unwrap_err();
        match &err {
            ProtocolError::RegistryVerification(problems) => {
                // five missing schemas plus the example manifest
                assert_eq!(problems.len(), 6);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!v.is_verified());
    }

    #[test]
    fn test_concurrent_first_verification_runs_once() {
        let v = Arc::new(validator());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let v = v.clone();
                std::thread::spawn(move || v.verify_registry())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert!(v.is_verified());
        assert_eq!(v.verification_count(), 1);
        assert_eq!(v.registry().load_count(), 1);
    }

    #[test]
    fn test_validation_result_from_violations() {
        assert!(ValidationResult::from_violations(vec![]).ok);
        let r = ValidationResult::from_violations(vec![SchemaViolation {
            instance_path: "/a".into(),
            message: "bad".into(),
        }]);
        assert!(!r.ok);
        assert_eq!(r.messages(), vec!["/a: bad".to_string()]);
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"ok": false, "errors": [{"instancePath": "/a", "message": "bad"}]})
        );
    }
}
