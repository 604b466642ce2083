use clap::{Parser, Subcommand};
use pdf_rag::Result;
use pdf_rag::commands::{ask_question, ingest_document, run_chat, show_status};
use pdf_rag::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Ask questions about PDF documents using local Ollama models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Describe, chunk and index a rendered document
    Ingest {
        /// Directory of rendered page images, a single page image, or a text file
        document: PathBuf,
        /// Collection name; defaults to the document name without spaces
        #[arg(long)]
        collection: Option<String>,
    },
    /// Answer one question about an ingested document
    Ask {
        /// Collection to search
        collection: String,
        /// The question
        question: String,
    },
    /// Chat about a document interactively
    Chat {
        /// Document to ingest before chatting
        document: Option<PathBuf>,
        /// Collection to use, or to store the document under
        #[arg(long)]
        collection: Option<String>,
    },
    /// Show Ollama health and stored collections
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest {
            document,
            collection,
        } => {
            ingest_document(&document, collection).await?;
        }
        Commands::Ask {
            collection,
            question,
        } => {
            ask_question(&collection, &question).await?;
        }
        Commands::Chat {
            document,
            collection,
        } => {
            run_chat(document, collection).await?;
        }
        Commands::Status => {
            show_status()?;
        }
    }

    Ok(())
}
