use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::config::{EmbeddingProvider, IndexBackend};
use pdf_rag_core::{find_sentence_with_term, IndexOutcome, RagCoordinator, SearchScope, Settings};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML settings file
    #[arg(long, env = "PDF_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Folder scanned for PDFs
    #[arg(long, env = "PDF_RAG_PDF_DIR")]
    pdf_dir: Option<PathBuf>,

    /// Vector index backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Embedding provider
    #[arg(long, value_enum)]
    embedder: Option<Provider>,

    /// Embedding service base URL
    #[arg(long)]
    embedding_url: Option<String>,

    /// Qdrant base URL
    #[arg(long)]
    qdrant_url: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Local,
    Qdrant,
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Ollama,
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Index one PDF, or every PDF under the folder.
    Index {
        /// Single document to index.
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Retrieve the chunks that best answer a question.
    Query {
        question: String,
        /// Restrict the search to one document.
        #[arg(long)]
        document: Option<PathBuf>,
        /// Number of chunks to return.
        #[arg(long)]
        limit: Option<usize>,
        /// Also print a short quote containing the detected term.
        #[arg(long, default_value_t = false)]
        quote: bool,
    },
    /// Collection statistics, and a document's index state.
    Status {
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Table, figure and section titles of a document.
    Titles {
        #[arg(long)]
        document: PathBuf,
        #[arg(long, default_value = "")]
        keyword: String,
    },
    /// Physical page number of a printed page label.
    Label {
        #[arg(long)]
        document: PathBuf,
        label: String,
    },
}

fn apply_overrides(cli: &Cli, settings: &mut Settings) {
    if let Some(dir) = &cli.pdf_dir {
        settings.pdf_dir = dir.clone();
    }
    if let Some(backend) = cli.backend {
        settings.index.backend = match backend {
            Backend::Local => IndexBackend::Local,
            Backend::Qdrant => IndexBackend::Qdrant,
        };
    }
    if let Some(provider) = cli.embedder {
        settings.embedding.provider = match provider {
            Provider::Ollama => EmbeddingProvider::Ollama,
            Provider::Ngram => EmbeddingProvider::Ngram,
        };
    }
    if let Some(url) = &cli.embedding_url {
        settings.embedding.url = url.clone();
    }
    if let Some(url) = &cli.qdrant_url {
        settings.index.qdrant_url = url.clone();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    apply_overrides(&cli, &mut settings);
    settings.validate()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );
    let rag = RagCoordinator::from_settings(settings)?;

    match cli.command {
        Command::Index { document } => {
            let reports = match document {
                Some(path) => vec![rag.index(&path).await?],
                None => rag.preindex_folder().await,
            };

            for report in &reports {
                match &report.outcome {
                    IndexOutcome::UpToDate => {
                        println!("{} up to date ({})", report.document_id, report.version)
                    }
                    IndexOutcome::NoText => println!("{} has no usable text", report.document_id),
                    IndexOutcome::Indexed {
                        stored,
                        total,
                        replaced,
                    } => println!(
                        "{} indexed {stored}/{total} chunks{} ({})",
                        report.document_id,
                        if *replaced { ", replaced previous version" } else { "" },
                        report.version
                    ),
                }
            }

            let progress = rag.progress();
            println!(
                "{} documents processed at {} (scheduled={} done={})",
                reports.len(),
                Utc::now().to_rfc3339(),
                progress.scheduled,
                progress.done
            );
        }
        Command::Query {
            question,
            document,
            limit,
            quote,
        } => {
            let scope = match &document {
                Some(path) => {
                    let status = rag.document_status(path).await?;
                    if !status.indexed || status.stale {
                        println!(
                            "{} is not indexed at its current version; run `index` first",
                            status.document_id
                        );
                        return Ok(());
                    }
                    SearchScope::Document(status.document_id)
                }
                None => SearchScope::Global,
            };

            let term = rag.detect_term(&question);
            println!("query: {question}");
            if let Some(term) = &term {
                println!("term: {term}");
            }

            let chunks = rag.retrieve(&question, &scope, limit).await?;
            for chunk in &chunks {
                println!(
                    "[{:?}] score={:.4} chunk={}/{} document={}{}",
                    chunk.match_kind,
                    chunk.similarity_score,
                    chunk.chunk_index,
                    chunk.total_chunks,
                    chunk.document_id,
                    if chunk.boosted { " boosted" } else { "" }
                );
                println!("  {}", chunk.text);
            }
            if chunks.is_empty() {
                println!("no matching chunks");
            }

            if quote {
                if let Some(sentence) = term
                    .as_deref()
                    .and_then(|term| find_sentence_with_term(term, &chunks))
                {
                    println!("quote: {sentence}");
                }
            }
        }
        Command::Status { document } => {
            let stats = rag.collection_stats().await?;
            println!(
                "chunks={} location={} model={} batch_size={}",
                stats.total_chunks, stats.location, stats.embedding_model, stats.batch_size
            );

            if let Some(path) = document {
                let status = rag.document_status(&path).await?;
                println!(
                    "document={} indexed={} stale={} chunks={} version={}",
                    status.document_id,
                    status.indexed,
                    status.stale,
                    status.chunks,
                    status.version.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Titles { document, keyword } => {
            let titles = rag.find_titles(&document, &keyword).await?;
            if titles.is_empty() {
                println!("no titles found (is `index.title_index` enabled?)");
            }
            for title in titles {
                println!("p.{} [{}] {}", title.page, title.kind.as_str(), title.title);
            }
        }
        Command::Label { document, label } => match rag.resolve_page(&document, &label).await? {
            Some(page) => println!("{label} -> page {page}"),
            None => println!("{label} does not resolve to a page"),
        },
    }

    Ok(())
}
