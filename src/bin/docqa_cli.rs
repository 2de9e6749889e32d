//! Command-line front end: ingest a PDF or chat with the persisted corpus.
//!
//! Shares configuration with the HTTP binary, so a corpus ingested here is served there and vice
//! versa.
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docqa::{
    config, logging,
    processing::{AnswerStrategy, AskRequest, DocumentPipeline},
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "docqa-cli", about = "Ask questions about an ingested PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed, and index a PDF, replacing the persisted corpus.
    Ingest {
        /// PDF to ingest.
        pdf: PathBuf,
        /// Window length in characters (overrides `CHUNK_SIZE`).
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Characters shared by consecutive windows (overrides `CHUNK_OVERLAP`).
        #[arg(long)]
        overlap: Option<usize>,
        /// Embedding model identifier (overrides `EMBEDDING_MODEL`).
        #[arg(long)]
        model: Option<String>,
        /// Output directory for the index and store (overrides `INDEX_DIR`).
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },
    /// Interactive question loop against the persisted corpus.
    Chat {
        /// Session identifier; follow-up handling is scoped to it.
        #[arg(long, default_value = "default")]
        session: String,
        /// Number of passages to return.
        #[arg(long)]
        top_k: Option<usize>,
        /// Summarize the passages with the configured language model.
        #[arg(long)]
        llm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_config();
    logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Ingest {
            pdf,
            chunk_size,
            overlap,
            model,
            index_dir,
        } => {
            let mut config = config::get_config().clone();
            config.chunk_size = chunk_size.unwrap_or(config.chunk_size);
            config.chunk_overlap = overlap.unwrap_or(config.chunk_overlap);
            config.embedding_model = model.unwrap_or(config.embedding_model);
            config.index_dir = index_dir.unwrap_or(config.index_dir);
            config.validate().context("invalid ingestion parameters")?;

            let pipeline = DocumentPipeline::new(config);
            let outcome = pipeline
                .ingest_pdf(&pdf)
                .await
                .with_context(|| format!("failed to ingest {}", pdf.display()))?;
            println!(
                "Indexed {} chunks from {} pages into {} and {}",
                outcome.chunks,
                outcome.pages,
                outcome.index_path.display(),
                outcome.store_path.display()
            );
        }
        Command::Chat {
            session,
            top_k,
            llm,
        } => {
            let pipeline = DocumentPipeline::new(config::get_config().clone());
            if !pipeline
                .load_existing()
                .await
                .context("failed to load persisted corpus")?
            {
                bail!("no corpus found; run `docqa-cli ingest <pdf>` first");
            }
            chat_loop(&pipeline, &session, top_k, AnswerStrategy::from_flag(llm)).await?;
        }
    }
    Ok(())
}

async fn chat_loop(
    pipeline: &DocumentPipeline,
    session: &str,
    top_k: Option<usize>,
    strategy: AnswerStrategy,
) -> Result<()> {
    println!("Document chatbot. Type /exit to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if matches!(question.to_lowercase().as_str(), "/exit" | "exit" | "quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let request = AskRequest {
            session_id: session.to_string(),
            question: question.to_string(),
            top_k,
            strategy,
        };
        match pipeline.ask(request).await {
            Ok(outcome) => println!("\n{}\n", outcome.answer),
            Err(error) => eprintln!("\nError: {error}\n"),
        }
    }
    Ok(())
}
