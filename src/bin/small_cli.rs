//! SMALL CLI - Bridge interface for docs tooling
//!
//! Commands: protocol, replay-id, lineage, lifecycle, validate, render, check
//! Outputs JSON to stdout
//! Returns 1 on errors and 2 on validation or compile failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use small_docs_core::{
    compute_replay_id, emit_lifecycle, generate_lineage, DocumentLoader, Manifest,
    PipelineConfig, Primitive, ProtocolDescriptor, SchemaRegistry, SystemClock,
};

#[derive(Parser)]
#[command(name = "small-cli")]
#[command(about = "SMALL CLI - Protocol document compiler and schema registry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML pipeline config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the protocol descriptor
    Protocol,

    /// Compute the replay id of a manifest
    ReplayId {
        /// JSON payload (Manifest)
        #[arg(short, long)]
        payload: String,

        /// Protocol version (defaults to the current one)
        #[arg(long)]
        protocol_version: Option<String>,
    },

    /// Derive a lineage record from a manifest
    Lineage {
        #[arg(short, long)]
        payload: String,

        #[arg(long)]
        protocol_version: Option<String>,
    },

    /// Derive lifecycle events from a manifest
    Lifecycle {
        #[arg(short, long)]
        payload: String,

        #[arg(long)]
        protocol_version: Option<String>,
    },

    /// Validate a JSON payload against a registered schema
    Validate {
        /// Schema `$id` or primitive name (e.g. Manifest)
        #[arg(short, long)]
        schema: String,

        #[arg(short, long)]
        payload: String,
    },

    /// Compile a document and print its HTML
    Render { file: PathBuf },

    /// Compile and protocol-check a set of documents
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{}", out),
        Err(e) => println!(r#"{{"error": "Failed to serialize output: {}"}}"#, e),
    }
}

fn fail(error: impl ToString) -> ExitCode {
    emit(&json!({ "success": false, "error": error.to_string() }));
    ExitCode::FAILURE
}

fn parse_manifest(payload: &str) -> Result<Manifest, String> {
    serde_json::from_str(payload).map_err(|e| format!("Invalid payload: {}", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::load(path) {
            Ok(config) => config,
            Err(e) => return fail(e),
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Protocol => {
            emit(&ProtocolDescriptor::current().to_json());
            ExitCode::SUCCESS
        }

        Commands::ReplayId { payload, protocol_version } => {
            let manifest = match parse_manifest(&payload) {
                Ok(m) => m,
                Err(e) => return fail(e),
            };
            match compute_replay_id(protocol_version.as_deref(), &manifest) {
                Ok(id) => {
                    emit(&json!({ "success": true, "replayId": id }));
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Lineage { payload, protocol_version } => {
            let manifest = match parse_manifest(&payload) {
                Ok(m) => m,
                Err(e) => return fail(e),
            };
            match generate_lineage(&manifest, protocol_version.as_deref(), &SystemClock) {
                Ok(lineage) => {
                    emit(&lineage);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Lifecycle { payload, protocol_version } => {
            let manifest = match parse_manifest(&payload) {
                Ok(m) => m,
                Err(e) => return fail(e),
            };
            match emit_lifecycle(&manifest, protocol_version.as_deref(), &SystemClock) {
                Ok(events) => {
                    emit(&events);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Validate { schema, payload } => {
            let value: serde_json::Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(e) => return fail(format!("Invalid payload: {}", e)),
            };
            let registry = SchemaRegistry::new(config.schema_source());
            let result = match schema.parse::<Primitive>() {
                Ok(primitive) => registry.validate_primitive(primitive, &value),
                Err(_) => registry.validate(&schema, &value),
            };
            match result {
                Ok(result) => {
                    emit(&result);
                    if result.ok {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Err(e) => fail(e),
            }
        }

        Commands::Render { file } => {
            let loader = DocumentLoader::from_config(&config);
            match loader.load(&file).await {
                Ok(doc) => {
                    emit(&json!({
                        "success": true,
                        "identity": doc.identity,
                        "missing": doc.missing,
                        "frontmatter": doc.artifact.frontmatter,
                        "html": doc.render_html(),
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) if e.aborts_batch() => fail(e),
                Err(e) => {
                    emit(&json!({ "success": false, "error": e.to_string() }));
                    ExitCode::from(2)
                }
            }
        }

        Commands::Check { files } => {
            let loader = DocumentLoader::from_config(&config);
            let results = match loader.load_all(&files).await {
                Ok(results) => results,
                Err(e) => return fail(e),
            };

            let mut all_ok = true;
            let report: Vec<_> = results
                .iter()
                .map(|(path, result)| match result {
                    Ok(doc) => json!({
                        "path": path,
                        "ok": true,
                        "identity": doc.identity,
                        "missing": doc.missing,
                    }),
                    Err(e) => {
                        all_ok = false;
                        json!({ "path": path, "ok": false, "error": e.to_string() })
                    }
                })
                .collect();

            emit(&json!({ "success": all_ok, "documents": report }));
            if all_ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
    }
}
