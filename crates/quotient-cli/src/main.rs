use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quotient_client::{FsBlobStore, HttpBlobStore, HttpDocumentIntelligence, IntelligenceConfig};
use quotient_core::models::{DocumentSource, ParsedContent};
use quotient_core::parse_adaptive_table_format;
use quotient_core::pipeline::ParsingPipelineService;
use quotient_core::traits::BlobStore;

#[derive(Parser)]
#[command(name = "quotient", version, about = "Line item extraction from vendor quotes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a document through the parsing service and print its line items
    Parse {
        /// Document to parse. A local file, or a path under --storage-url
        file: String,

        /// Fetch the document from this HTTP storage root instead of disk
        #[arg(long, env = "QUOTIENT_STORAGE_URL")]
        storage_url: Option<String>,

        /// Give up on the document after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Parse already-converted markdown/HTML text offline
    ParseText {
        /// File holding the service's markdown output
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("quotient=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let parsed = match cli.command {
        Commands::Parse {
            file,
            storage_url,
            deadline_secs,
        } => {
            let deadline = deadline_secs.map(Duration::from_secs);
            match storage_url {
                Some(base_url) => {
                    let store = HttpBlobStore::new(&base_url).context("Invalid --storage-url")?;
                    cmd_parse(store, &file, deadline).await?
                }
                None => {
                    let (root, name) = split_local_path(Path::new(&file))?;
                    cmd_parse(FsBlobStore::new(root), &name, deadline).await?
                }
            }
        }
        Commands::ParseText { file } => cmd_parse_text(&file)?,
    };

    // Output JSON to stdout
    println!("{}", serde_json::to_string_pretty(&parsed)?);

    Ok(())
}

/// Local files are served from their parent directory.
fn split_local_path(file: &Path) -> Result<(PathBuf, String)> {
    let name = file
        .file_name()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Not a file path: {}", file.display()))?
        .to_string();
    let root = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((root, name))
}

async fn cmd_parse<B: BlobStore>(
    store: B,
    path: &str,
    deadline: Option<Duration>,
) -> Result<ParsedContent> {
    let config = IntelligenceConfig::from_env().context("Document service is not configured")?;
    let intelligence =
        HttpDocumentIntelligence::new(config).context("Failed to create document service client")?;
    let service = ParsingPipelineService::new(store, intelligence);

    let source = DocumentSource::path(path);
    let result = match deadline {
        Some(deadline) => service.parse_document_with_deadline(source, deadline).await,
        None => service.parse_document(source).await,
    };

    let executor = service.intelligence().executor();
    for stats in executor.registry().stats() {
        tracing::debug!(
            service = %stats.service_name,
            state = ?stats.state,
            failures = stats.failures,
            metrics = ?executor.metrics(&stats.service_name),
            "Service health"
        );
    }

    let parsed = result.with_context(|| format!("Failed to parse {path}"))?;
    tracing::info!(
        items = parsed.metadata.total_items,
        tables = parsed.metadata.total_tables,
        "Parsed {}",
        path
    );
    Ok(parsed)
}

fn cmd_parse_text(file: &Path) -> Result<ParsedContent> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(parse_adaptive_table_format(&text))
}
