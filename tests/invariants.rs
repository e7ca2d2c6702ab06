//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

use small_docs_core::{
    canonical_json, compute_replay_id, emit_lifecycle, generate_lineage,
    hashing::replay_hash_input, parse_frontmatter, workflow::FixedClock, DocumentCompiler,
    FreshnessToken, FrontmatterValue, HashError, Manifest, Primitive, ProtocolError,
    ProtocolValidator, SchemaRegistry,
};

const TRACK_REPLAY_ID: &str = "LhKhb9nluL3hYsKIjYUQox1aLPTfL_-oefVbJLnA0XU";

fn track_manifest() -> Manifest {
    Manifest::new("track.audio", "artifact.v1", 1)
}

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
}

#[test]
fn invariant_canonical_json_ignores_key_order() {
    let a = json!({"b": {"y": 1, "x": [3, {"q": 1, "p": 2}]}, "a": "s"});
    let b = json!({"a": "s", "b": {"x": [3, {"p": 2, "q": 1}], "y": 1}});
    assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
}

#[test]
fn invariant_replay_id_is_deterministic() {
    let a = compute_replay_id(None, &track_manifest()).unwrap();
    let b = compute_replay_id(Some("1.0.0"), &track_manifest()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_str(), TRACK_REPLAY_ID);
}

#[test]
fn invariant_any_manifest_change_changes_replay_id() {
    let base = compute_replay_id(None, &track_manifest()).unwrap();
    let mut metadata = serde_json::Map::new();
    metadata.insert("bpm".into(), json!(120));

    let variants = [
        Manifest::new("track.video", "artifact.v1", 1),
        Manifest::new("track.audio", "artifact.v2", 1),
        Manifest::new("track.audio", "artifact.v1", 2),
        track_manifest().with_metadata(metadata),
    ];
    for variant in &variants {
        assert_ne!(compute_replay_id(None, variant).unwrap(), base, "{:?}", variant);
    }
}

#[test]
fn invariant_unsupported_version_rejected() {
    assert!(matches!(
        compute_replay_id(Some("9.9.9"), &track_manifest()),
        Err(HashError::UnsupportedProtocolVersion { .. })
    ));
}

#[test]
fn invariant_reference_manifest_validates() {
    let registry = SchemaRegistry::embedded();
    let result = registry
        .validate_manifest(&json!({"artifact": "track.audio", "schema": "artifact.v1", "version": 1}))
        .unwrap();
    assert!(result.ok);
    assert!(result.errors.is_empty());
}

#[test]
fn invariant_missing_artifact_reported_not_raised() {
    let registry = SchemaRegistry::embedded();
    let result = registry
        .validate_manifest(&json!({"schema": "artifact.v1", "version": 1}))
        .unwrap();
    assert!(!result.ok);
    assert!(result.errors.iter().any(|e| e.message.contains("artifact")));
}

#[test]
fn invariant_unknown_schema_is_an_error() {
    let registry = SchemaRegistry::embedded();
    assert!(registry
        .validate("https://smallprotocol.dev/schemas/small/v9/nope.schema.json", &json!({}))
        .is_err());
}

#[test]
fn invariant_frontmatter_example() {
    let parsed = parse_frontmatter("---\ntitle: Hello\nversion: 1\ndraft: true\n---\nBody");
    let fm = &parsed.frontmatter;
    assert_eq!(fm.get("title"), Some(&FrontmatterValue::String("Hello".into())));
    assert_eq!(fm.get("version"), Some(&FrontmatterValue::Integer(1)));
    assert_eq!(fm.get("draft"), Some(&FrontmatterValue::Bool(true)));
    assert_eq!(parsed.content, "Body");
}

#[tokio::test]
async fn invariant_cache_reuses_until_freshness_changes() {
    let compiler = DocumentCompiler::default();
    let source = "# Title\n\n```ts\nconst a = 1;\n```\n";

    let first = compiler.compile("doc", FreshnessToken::new(10), source).await.unwrap();
    let again = compiler.compile("doc", FreshnessToken::new(10), source).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(compiler.compilations(), 1);

    let newer = compiler.compile("doc", FreshnessToken::new(11), source).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &newer));
    assert_eq!(compiler.compilations(), 2);
}

#[test]
fn invariant_protocol_version_mismatch_names_both_versions() {
    let validator = ProtocolValidator::new(Arc::new(SchemaRegistry::embedded()));
    let parsed = parse_frontmatter("---\nprotocol: SMALL\nversion: 0.9.0\n---\n# Doc\n");
    let err = validator
        .validate_protocol_doc(&parsed.frontmatter, "docs/old.md")
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Mismatch { .. }));
    let message = err.to_string();
    assert!(message.contains("1.0.0"));
    assert!(message.contains("0.9.0"));
    assert!(message.contains("docs/old.md"));
}

#[test]
fn invariant_lineage_and_lifecycle_share_replay_id() {
    let manifest = track_manifest();
    assert_eq!(
        replay_hash_input("1.0.0", &manifest).unwrap(),
        r#"SMALL|1.0.0|{"artifact":"track.audio","schema":"artifact.v1","version":1}"#
    );

    let lineage = generate_lineage(&manifest, None, &clock()).unwrap();
    let lifecycle = emit_lifecycle(&manifest, None, &clock()).unwrap();

    assert_eq!(lineage.replay_id.as_str(), TRACK_REPLAY_ID);
    assert_eq!(lineage.derived_from, "artifact.v1");
    assert!(lifecycle.iter().all(|e| e.replay_id == lineage.replay_id));

    let registry = SchemaRegistry::embedded();
    let lineage_json = serde_json::to_value(&lineage).unwrap();
    let lifecycle_json = serde_json::to_value(&lifecycle).unwrap();
    assert!(registry.validate_primitive(Primitive::Lineage, &lineage_json).unwrap().ok);
    assert!(registry.validate_primitive(Primitive::Lifecycle, &lifecycle_json).unwrap().ok);
    assert_eq!(lifecycle_json[0]["type"], "validated");
    assert_eq!(lifecycle_json[1]["type"], "materialized");
}

#[test]
fn invariant_registry_verified_once() {
    let validator = ProtocolValidator::new(Arc::new(SchemaRegistry::embedded()));
    assert!(!validator.is_verified());
    validator.verify_registry().unwrap();
    assert!(validator.is_verified());
    assert!(validator.registry().is_initialized());
    validator.verify_registry().unwrap();
}
