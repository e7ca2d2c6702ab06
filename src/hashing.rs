//! Hashing System - Canonical JSON and Replay IDs
//!
//! Replay ids are reproducible: identical (protocol version, manifest) pairs
//! always hash to the same id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use crate::protocol::{self, PROTOCOL_NAME, SUPPORTED_PROTOCOL_VERSIONS};
use crate::workflow::Manifest;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Unsupported protocol version: {version}. Supported versions: {supported}")]
    UnsupportedProtocolVersion { version: String, supported: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Deterministic fingerprint of a manifest under a protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayId(String);

impl ReplayId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 digest of bytes, base64url without padding
pub fn sha256_base64url(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&v, &mut out)?;
    Ok(out)
}

fn write_canonical(v: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Exact string fed to the digest:
/// `"SMALL|" + protocol_version + "|" + canonical_json(manifest)`
pub fn replay_hash_input(protocol_version: &str, manifest: &Manifest) -> Result<String, HashError> {
    let manifest_json = canonical_json(manifest)?;
    Ok(format!("{}|{}|{}", PROTOCOL_NAME, protocol_version, manifest_json))
}

/// Compute the replay id for a manifest.
///
/// `None` selects the current protocol version. Versions outside
/// [`SUPPORTED_PROTOCOL_VERSIONS`] are rejected.
pub fn compute_replay_id(
    protocol_version: Option<&str>,
    manifest: &Manifest,
) -> Result<ReplayId, HashError> {
    let version = protocol_version.unwrap_or(protocol::PROTOCOL_VERSION);

    if !protocol::is_supported_version(version) {
        return Err(HashError::UnsupportedProtocolVersion {
            version: version.to_string(),
            supported: SUPPORTED_PROTOCOL_VERSIONS.join(", "),
        });
    }

    let input = replay_hash_input(version, manifest)?;
    Ok(ReplayId(sha256_base64url(input.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track_manifest() -> Manifest {
        Manifest::new("track.audio", "artifact.v1", 1)
    }

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_canonical_json_nested_and_arrays() {
        let obj = json!({"b": [{"y": null, "x": true}, 2, "s"], "a": {"d": 1.5, "c": "q\"uote"}});
        assert_eq!(
            canonical_json(&obj).unwrap(),
            r#"{"a":{"c":"q\"uote","d":1.5},"b":[{"x":true,"y":null},2,"s"]}"#
        );
    }

    #[test]
    fn test_canonical_json_scalars() {
        assert_eq!(canonical_json(&Value::Null).unwrap(), "null");
        assert_eq!(canonical_json(&"a").unwrap(), r#""a""#);
        assert_eq!(canonical_json(&42).unwrap(), "42");
    }

    #[test]
    fn test_canonical_json_sorts_by_codepoint() {
        let obj = json!({"b": 1, "B": 2, "é": 3, "a": 4});
        assert_eq!(canonical_json(&obj).unwrap(), r#"{"B":2,"a":4,"b":1,"é":3}"#);
    }

    #[test]
    fn test_hash_input_format() {
        let input = replay_hash_input("1.0.0", &track_manifest()).unwrap();
        assert_eq!(
            input,
            r#"SMALL|1.0.0|{"artifact":"track.audio","schema":"artifact.v1","version":1}"#
        );
    }

    #[test]
    fn test_replay_id_deterministic() {
        let a = compute_replay_id(Some("1.0.0"), &track_manifest()).unwrap();
        let b = compute_replay_id(None, &track_manifest()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_replay_id_alphabet() {
        let id = compute_replay_id(None, &track_manifest()).unwrap();
        assert_eq!(id.as_str().len(), 43);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_replay_id_rejects_unsupported_version() {
        let err = compute_replay_id(Some("9.9.9"), &track_manifest()).unwrap_err();
        assert!(matches!(err, HashError::UnsupportedProtocolVersion { .. }));
        assert!(err.to_string().contains("9.9.9"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // sha256("abc")
        assert_eq!(
            sha256_base64url(b"abc"),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }
}
