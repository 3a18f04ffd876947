//! Terminal client (stdin/stdout).
//!
//! Uploads one PDF, runs the simulated ingestion with a live stage log, then answers questions
//! read line by line from stdin. Tracing goes to the log file only so stdout stays readable.
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use ragforge::conversation::{ApiKey, ConversationEngine, GeminiClient};
use ragforge::document::Upload;
use ragforge::metrics::SessionMetrics;
use ragforge::pipeline::{ConfigUpdate, ModelProvider, ParserKind};
use ragforge::sequencer::{Clock, InstantClock, ProcessingEvent, TokioClock};
use ragforge::session::{SessionOrchestrator, drive_processing_observed};
use ragforge::{config, logging};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(
    name = "ragforge-chat",
    about = "Chat with a PDF through a simulated RAG pipeline"
)]
struct Cli {
    /// PDF to ingest.
    pdf: PathBuf,
    /// Parsing strategy: docling, langchain or unstructured.
    #[arg(long)]
    parser: Option<ParserKind>,
    /// Chunk size in tokens.
    #[arg(long)]
    chunk_size: Option<u32>,
    /// Overlap between chunks in tokens.
    #[arg(long)]
    overlap: Option<u32>,
    /// Retrieval depth.
    #[arg(long)]
    top_k: Option<u32>,
    /// Model provider: google or hf.
    #[arg(long)]
    provider: Option<ModelProvider>,
    /// Model identifier for the chosen provider.
    #[arg(long)]
    model: Option<String>,
    /// Disable the /export command.
    #[arg(long)]
    no_export: bool,
    /// Skip the cosmetic stage delays.
    #[arg(long)]
    instant: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_config();
    logging::init_file_tracing();
    let cli = Cli::parse();
    let config = config::get_config();

    let backend = GeminiClient::new(config.gemini_base_url.clone(), config.request_timeout)
        .context("failed to build backend client")?;
    let engine = ConversationEngine::new(
        Arc::new(backend),
        config.gemini_api_key.clone().and_then(ApiKey::new),
        config.request_timeout,
    );
    let mut orchestrator = SessionOrchestrator::new(engine, Arc::new(SessionMetrics::new()));

    let upload = Upload::from_path(&cli.pdf).await?;
    let summary = orchestrator.accept_upload(upload)?.summary();
    println!("Loaded {} ({} MB)", summary.name, summary.size_mb);

    orchestrator.configure(ConfigUpdate {
        chunk_size: cli.chunk_size,
        overlap: cli.overlap,
        retrieval_k: cli.top_k,
        parser: cli.parser,
        model_provider: cli.provider,
        model: cli.model,
        export_enabled: cli.no_export.then_some(false),
    })?;

    let clock: Arc<dyn Clock> = if cli.instant || config.instant_processing {
        Arc::new(InstantClock)
    } else {
        Arc::new(TokioClock)
    };
    let run = orchestrator.start_processing(clock)?;
    let session = Arc::new(Mutex::new(orchestrator));
    drive_processing_observed(Arc::clone(&session), run, |event| match event {
        ProcessingEvent::StageStarted { line, .. } | ProcessingEvent::StageFinished { line, .. } => {
            println!("{line}")
        }
        ProcessingEvent::Completed => println!("Pipeline ready."),
        ProcessingEvent::VectorSample(_) => {}
    })
    .await
    .context("processing run failed")?;

    let mut session = Arc::try_unwrap(session)
        .map_err(|_| anyhow!("session still shared after processing"))?
        .into_inner();
    if let Some(seed) = session.transcript().last() {
        println!("\n{}\n", seed.text);
    }
    println!("Ask a question, or use /export [path], /key <value>, /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/key", value) => {
                let credential = ApiKey::new(value);
                println!(
                    "{}",
                    if credential.is_some() {
                        "Credential updated."
                    } else {
                        "Credential cleared."
                    }
                );
                session.update_credential(credential);
            }
            ("/export", path) => match export(&session, path).await {
                Ok(written) => println!("Exported session to {}", written.display()),
                Err(err) => eprintln!("error: {err:#}"),
            },
            _ => match session.ask(line).await {
                Ok(message) => println!("\n{}\n", message.text),
                Err(err) => eprintln!("error: {err}"),
            },
        }
    }

    Ok(())
}

async fn export(session: &SessionOrchestrator, path: &str) -> Result<PathBuf> {
    let bundle = session.export_bundle()?;
    let path = if path.trim().is_empty() {
        PathBuf::from(bundle.file_name())
    } else {
        PathBuf::from(path.trim())
    };
    let json = bundle.to_json().context("failed to encode export")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
