//! Workflow Primitives - Manifest, Lineage, Lifecycle
//!
//! Lineage and lifecycle are projections of a manifest plus its replay id.
//! Nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::hashing::{compute_replay_id, HashError, ReplayId};

/// Declared intent: an artifact, its governing schema, and a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub artifact: String,
    pub schema: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Manifest {
    pub fn new(artifact: impl Into<String>, schema: impl Into<String>, version: u64) -> Self {
        Self {
            artifact: artifact.into(),
            schema: schema.into(),
            version,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineage {
    pub artifact: String,
    pub derived_from: String,
    pub generated_at: DateTime<Utc>,
    pub replay_id: ReplayId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEventType {
    Validated,
    Materialized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub event_type: LifecycleEventType,
    pub at: DateTime<Utc>,
    pub replay_id: ReplayId,
}

pub type Lifecycle = Vec<LifecycleEvent>;

/// Wall-clock source. Inject [`FixedClock`] for reproducible output.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn generate_lineage(
    manifest: &Manifest,
    protocol_version: Option<&str>,
    clock: &dyn Clock,
) -> Result<Lineage, HashError> {
    let replay_id = compute_replay_id(protocol_version, manifest)?;
    Ok(Lineage {
        artifact: manifest.artifact.clone(),
        derived_from: manifest.schema.clone(),
        generated_at: clock.now(),
        replay_id,
    })
}

/// Emits `validated` then `materialized`, both stamped with one clock read.
pub fn emit_lifecycle(
    manifest: &Manifest,
    protocol_version: Option<&str>,
    clock: &dyn Clock,
) -> Result<Lifecycle, HashError> {
    let replay_id = compute_replay_id(protocol_version, manifest)?;
    let at = clock.now();
    Ok(vec![
        LifecycleEvent {
            event_type: LifecycleEventType::Validated,
            at,
            replay_id: replay_id.clone(),
        },
        LifecycleEvent {
            event_type: LifecycleEventType::Materialized,
            at,
            replay_id,
        },
    ])
}
