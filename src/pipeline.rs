//! Compilation Pipeline - Single Entry Point for Documents
//!
//! Every compile goes frontmatter → syntax tree → code-fence transform →
//! render tree. Results are cached per identity and reused while the
//! freshness token is unchanged.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::frontmatter::{parse_frontmatter, Frontmatter};
use crate::markdown::SyntaxTree;
use crate::render::{compile_render_tree, RenderEntryPoint};
use crate::transform::{transform_code_fences, FenceOptions, Highlighter, PlainHighlighter, RenderMode};
use crate::validation::ProtocolError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Compilation error in {identity}: {reason}")]
    Compilation { identity: String, reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Configuration failures stop a whole batch; everything else is
    /// scoped to one document.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            PipelineError::Protocol(ProtocolError::RegistryVerification(_))
        )
    }
}

/// Opaque staleness marker, compared only for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreshnessToken(u128);

impl FreshnessToken {
    pub fn new(value: u128) -> Self {
        Self(value)
    }

    /// Nanoseconds since the Unix epoch; times before it map to zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        Self(
            time.duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
        )
    }
}

#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub freshness: FreshnessToken,
    pub frontmatter: Frontmatter,
    pub entry: RenderEntryPoint,
}

/// Compiles documents and caches the results in memory.
///
/// The cache is unbounded. Concurrent compiles of one identity may both do
/// the work; the later insert wins.
pub struct DocumentCompiler {
    mode: RenderMode,
    fences: FenceOptions,
    highlighter: Arc<dyn Highlighter>,
    cache: RwLock<HashMap<String, Arc<CompiledArtifact>>>,
    compilations: AtomicU64,
}

impl DocumentCompiler {
    pub fn new(mode: RenderMode, highlighter: Arc<dyn Highlighter>) -> Self {
        Self {
            mode,
            fences: FenceOptions::default(),
            highlighter,
            cache: RwLock::new(HashMap::new()),
            compilations: AtomicU64::new(0),
        }
    }

    pub fn with_fence_options(mut self, fences: FenceOptions) -> Self {
        self.fences = fences;
        self
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.mode,
            Arc::new(PlainHighlighter::new(config.highlight_theme.clone())),
        )
        .with_fence_options(config.fence_options())
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Compile `source`, or return the cached artifact if `freshness`
    /// matches the cached one.
    pub async fn compile(
        &self,
        identity: &str,
        freshness: FreshnessToken,
        source: &str,
    ) -> Result<Arc<CompiledArtifact>, PipelineError> {
        if let Some(hit) = self.lookup(identity, freshness) {
            debug!(%identity, "compile cache hit");
            return Ok(hit);
        }
        debug!(%identity, mode = ?self.mode, "compiling document");

        let failed = |reason: String| PipelineError::Compilation {
            identity: identity.to_string(),
            reason,
        };

        let parsed = parse_frontmatter(source);
        let tree = SyntaxTree::parse(parsed.content);
        let transformed =
            transform_code_fences(&tree, self.mode, &self.fences, self.highlighter.as_ref())
                .await
                .map_err(|e| failed(e.to_string()))?;
        let entry = compile_render_tree(&transformed).map_err(|e| failed(e.to_string()))?;

        let artifact = Arc::new(CompiledArtifact {
            freshness,
            frontmatter: parsed.frontmatter,
            entry,
        });
        self.cache
            .write()
            .insert(identity.to_string(), Arc::clone(&artifact));
        self.compilations.fetch_add(1, Ordering::Relaxed);

        Ok(artifact)
    }

    fn lookup(&self, identity: &str, freshness: FreshnessToken) -> Option<Arc<CompiledArtifact>> {
        self.cache
            .read()
            .get(identity)
            .filter(|artifact| artifact.freshness == freshness)
            .cloned()
    }

    /// Current cache entry regardless of freshness.
    pub fn cached(&self, identity: &str) -> Option<Arc<CompiledArtifact>> {
        self.cache.read().get(identity).cloned()
    }

    pub fn invalidate(&self, identity: &str) -> bool {
        self.cache.write().remove(identity).is_some()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Number of compiles that did real work (cache misses that succeeded).
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }
}

impl Default for DocumentCompiler {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
