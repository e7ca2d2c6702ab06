//! Document Loader
//!
//! Reads documents from disk, compiles them through the shared
//! [`DocumentCompiler`] and checks protocol frontmatter.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::pipeline::{CompiledArtifact, DocumentCompiler, FreshnessToken, PipelineError};
use crate::registry::SchemaRegistry;
use crate::render::RenderCapabilities;
use crate::validation::ProtocolValidator;

/// A compiled document and the identity it was cached under.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub identity: String,
    pub artifact: Arc<CompiledArtifact>,
    /// True when the file did not exist and a placeholder was compiled.
    pub missing: bool,
}

impl LoadedDocument {
    pub fn render_html(&self) -> String {
        self.artifact.entry.invoke(&RenderCapabilities::html())
    }
}

fn missing_source(path: &Path) -> String {
    format!(
        "# Missing doc\n\nNo document found at: `{}`\n",
        path.display()
    )
}

fn missing_identity(path: &Path) -> String {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("missing:{}", name)
}

pub struct DocumentLoader {
    compiler: Arc<DocumentCompiler>,
    validator: Arc<ProtocolValidator>,
}

impl DocumentLoader {
    pub fn new(compiler: Arc<DocumentCompiler>, validator: Arc<ProtocolValidator>) -> Self {
        Self { compiler, validator }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let registry = Arc::new(SchemaRegistry::new(config.schema_source()));
        Self::new(
            Arc::new(DocumentCompiler::from_config(config)),
            Arc::new(ProtocolValidator::new(registry)),
        )
    }

    pub fn compiler(&self) -> &Arc<DocumentCompiler> {
        &self.compiler
    }

    pub fn validator(&self) -> &Arc<ProtocolValidator> {
        &self.validator
    }

    /// Load and compile one document.
    ///
    /// The path is the cache identity and the modification time is the
    /// freshness token. A file that does not exist compiles a placeholder
    /// under `missing:<name>` instead of failing.
    pub async fn load(&self, path: &Path) -> Result<LoadedDocument, PipelineError> {
        let io_err = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.load_missing(path).await,
            Err(e) => return Err(io_err(e)),
        };
        let freshness = FreshnessToken::from_system_time(metadata.modified().map_err(io_err)?);
        let source = tokio::fs::read_to_string(path).await.map_err(io_err)?;

        let identity = path.display().to_string();
        let artifact = self.compiler.compile(&identity, freshness, &source).await?;
        self.validator
            .validate_protocol_doc(&artifact.frontmatter, &identity)?;

        Ok(LoadedDocument {
            identity,
            artifact,
            missing: false,
        })
    }

    async fn load_missing(&self, path: &Path) -> Result<LoadedDocument, PipelineError> {
        let identity = missing_identity(path);
        warn!(path = %path.display(), %identity, "document not found, using placeholder");
        let artifact = self
            .compiler
            .compile(&identity, FreshnessToken::new(0), &missing_source(path))
            .await?;
        self.validator
            .validate_protocol_doc(&artifact.frontmatter, &identity)?;
        Ok(LoadedDocument {
            identity,
            artifact,
            missing: true,
        })
    }

    /// Load a batch in order.
    ///
    /// Per-document failures are returned next to their path. A failure
    /// that makes every document unloadable aborts the batch.
    pub async fn load_all(
        &self,
        paths: &[PathBuf],
    ) -> Result<Vec<(PathBuf, Result<LoadedDocument, PipelineError>)>, PipelineError> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            match self.load(path).await {
                Err(e) if e.aborts_batch() => return Err(e),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "document failed");
                    results.push((path.clone(), Err(e)));
                }
                Ok(doc) => {
                    debug!(identity = %doc.identity, "document loaded");
                    results.push((path.clone(), Ok(doc)));
                }
            }
        }
        Ok(results)
    }
}
