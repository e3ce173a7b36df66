use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    format_metrics, open_store, resolve_model, AppConfig, CharacterNgramEmbedder,
    ChatOrchestrator, ChatSession, Embedder, IngestOutcome, IngestionPipeline, IngestionReport,
    OpenAiCompatibleClient, RecordStore,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "PDF_RAG_CONFIG", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every PDF in the configured source directory.
    Ingest,
    /// Ingest the given files through temporary copies and print their logs.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer one question with relevance metrics.
    Ask {
        /// Display name of a model from `llm_model.models`.
        #[arg(long)]
        model: String,
        query: String,
    },
    /// Interactive chat over stdin. An empty line or `exit` ends the session.
    Chat {
        /// Display name of a model from `llm_model.models`.
        #[arg(long)]
        model: String,
    },
}

fn print_report(report: &IngestionReport) {
    match &report.outcome {
        IngestOutcome::Ingested => println!(
            "ingested {}: {} text chunks, {} tables, {} images",
            report.filename, report.text_chunks, report.tables, report.images
        ),
        IngestOutcome::Duplicate => println!("skipped {}: already processed", report.filename),
        IngestOutcome::Failed { reason } => println!("failed {}: {reason}", report.filename),
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
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let embedder = CharacterNgramEmbedder::default();
    let store = open_store(&config.vector_store, embedder.dimensions())
        .await
        .with_context(|| format!("opening vector store {}", config.vector_store.path.display()))?;

    match cli.command {
        Command::Ingest => {
            let folder = &config.data_sources.pdf.directory;
            let pipeline = IngestionPipeline::with_lopdf(store, embedder)?;
            let batch = pipeline
                .ingest_directory(folder)
                .await
                .with_context(|| format!("scanning {}", folder.display()))?;

            for report in &batch.reports {
                print_report(report);
            }
            if batch.failed() > 0 {
                warn!(failed = batch.failed(), "some files were skipped");
            }
            println!(
                "{} ingested, {} already present, {} failed at {}",
                batch.ingested(),
                batch.duplicates(),
                batch.failed(),
                Utc::now().to_rfc3339()
            );

            pipeline.into_store().close().await?;
        }
        Command::Upload { files } => {
            let pipeline = IngestionPipeline::with_lopdf(store, embedder)?;

            for file in files {
                let name = file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| file.display().to_string());
                println!("Processing: {name}");

                let bytes = match std::fs::read(&file) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        warn!(file = %file.display(), %error, "cannot read upload");
                        println!("failed {name}: {error}");
                        continue;
                    }
                };

                let report = pipeline
                    .ingest_upload(&name, &bytes)
                    .await
                    .with_context(|| format!("staging upload {name}"))?;
                for line in &report.diagnostics {
                    println!("  {line}");
                }
                print_report(&report);
            }

            pipeline.into_store().close().await?;
        }
        Command::Ask { model, query } => {
            let model_id = resolve_model(&config.llm_model, &model)?;
            let llm = OpenAiCompatibleClient::from_config(&config.llm_model)?;
            let orchestrator =
                ChatOrchestrator::new(store, embedder, llm, model_id, config.retrieval.top_k);

            let result = orchestrator.ask(&query, true).await?;
            println!("{}", result.answer);
            if let Some(metrics) = &result.metrics {
                println!("{}", format_metrics(metrics));
            }

            orchestrator.store().close().await?;
        }
        Command::Chat { model } => {
            let model_id = resolve_model(&config.llm_model, &model)?;
            let llm = OpenAiCompatibleClient::from_config(&config.llm_model)?;
            println!("Model in use: {model} ({model_id})");
            let mut session = ChatSession::new(ChatOrchestrator::new(
                store,
                embedder,
                llm,
                model_id,
                config.retrieval.top_k,
            ));

            let stdin = std::io::stdin();
            let mut lines = stdin.lock().lines();
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let Some(line) = lines.next() else {
                    break;
                };
                let question = line?;
                let question = question.trim();
                if question.is_empty() || question == "exit" {
                    break;
                }

                match session.ask(question).await {
                    Ok(turn) => {
                        println!("{}", turn.answer);
                        if let Some(metrics) = &turn.metrics {
                            println!("{metrics}");
                        }
                    }
                    Err(error) => println!("error: {error}"),
                }
            }

            info!(turns = session.history().len(), "chat session ended");
            session.into_orchestrator().store().close().await?;
        }
    }

    Ok(())
}
