//! SMALL Docs Core - Protocol Document Compiler
//!
//! # Guarantees
//! 1. Replay ids are deterministic: same version and manifest, same id
//! 2. Schemas are resolved by `$id` from one registry
//! 3. The registry is verified before any document is accepted
//! 4. Compiled documents are data, rendered by a fixed interpreter
//! 5. Cached artifacts are reused until the source changes

pub mod config;
pub mod docs;
pub mod frontmatter;
pub mod hashing;
pub mod markdown;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod transform;
pub mod validation;
pub mod workflow;

pub use config::{ConfigError, PipelineConfig};
pub use docs::{DocumentLoader, LoadedDocument};
pub use frontmatter::{parse_frontmatter, Frontmatter, FrontmatterValue};
pub use hashing::{canonical_json, compute_replay_id, HashError, ReplayId};
pub use pipeline::{CompiledArtifact, DocumentCompiler, FreshnessToken, PipelineError};
pub use protocol::{Primitive, ProtocolDescriptor, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
pub use registry::{RegistryError, SchemaRegistry, SchemaSource};
pub use render::{RenderCapabilities, RenderEntryPoint, RenderNode};
pub use transform::{Highlighter, PlainHighlighter, RenderMode};
pub use validation::{ProtocolError, ProtocolValidator, SchemaViolation, ValidationResult};
pub use workflow::{
    emit_lifecycle, generate_lineage, Clock, Lifecycle, LifecycleEvent, LifecycleEventType,
    Lineage, Manifest, SystemClock,
};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
