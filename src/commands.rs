use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Input;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::collection_from_table_name;
use crate::ollama::OllamaClient;
use crate::session::RagSession;

/// Describe, chunk and index a document
#[inline]
pub async fn ingest_document(document: &Path, collection: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let mut session = RagSession::with_ollama(&config)?;

    info!("Ingesting document: {}", document.display());
    let report = match collection {
        Some(name) => session.init_session_as(document, &name).await,
        None => session.init_session(document).await,
    }
    .with_context(|| format!("Failed to ingest {}", document.display()))?;

    if report.reused_existing {
        println!(
            "Collection '{}' already exists with {} chunks; nothing to do.",
            report.collection, report.total_documents
        );
        return Ok(());
    }

    println!("Ingested {}", document.display());
    println!("  Collection: {}", report.collection);
    println!("  Pages: {}", report.pages);
    if report.empty_pages > 0 {
        println!("  Pages without text: {}", report.empty_pages);
    }
    println!("  Chunks indexed: {}", report.documents_indexed);
    if report.is_empty() {
        println!(
            "{}",
            style("⚠ No text could be extracted; answers will have no context").yellow()
        );
    }

    Ok(())
}

/// Answer a single question against an ingested collection
#[inline]
pub async fn ask_question(collection: &str, question: &str) -> Result<()> {
    let config = Config::load()?;
    let mut session = RagSession::with_ollama(&config)?;

    let count = session
        .open_collection(collection)
        .await
        .with_context(|| format!("Failed to open collection '{}'", collection))?;
    if count == 0 {
        warn!("Collection '{}' has no documents", collection);
    }

    let answer = session.ask(question).await?;
    println!("{}", answer);
    Ok(())
}

/// Interactive question loop over a document or an ingested collection
#[inline]
pub async fn run_chat(document: Option<PathBuf>, collection: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let mut session = RagSession::with_ollama(&config)?;

    match (document, collection) {
        (Some(document), collection) => {
            eprintln!("{}", style("Processing document...").yellow());
            let report = match collection {
                Some(name) => session.init_session_as(&document, &name).await,
                None => session.init_session(&document).await,
            }
            .with_context(|| format!("Error during setup of {}", document.display()))?;
            eprintln!(
                "{}",
                style(format!(
                    "✓ Ready: {} chunks in '{}'",
                    report.total_documents, report.collection
                ))
                .green()
            );
        }
        (None, Some(name)) => {
            let count = session.open_collection(&name).await?;
            eprintln!(
                "{}",
                style(format!("✓ Ready: {} chunks in '{}'", count, name)).green()
            );
        }
        (None, None) => bail!("Provide a document to ingest or --collection to reuse"),
    }

    eprintln!("Ask a question, '/history' to review, empty line or '/exit' to quit.");

    loop {
        let question: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();

        match question {
            "" | "/exit" | "/quit" => break,
            "/history" => {
                for turn in session.history() {
                    println!("{} {}", style("You:").bold(), turn.user);
                    println!("{} {}", style("Bot:").bold().cyan(), turn.bot);
                }
            }
            _ => match session.ask(question).await {
                Ok(answer) => println!("{} {}", style("Bot:").bold().cyan(), answer),
                Err(e) => {
                    error!("Query failed: {}", e);
                    eprintln!("{}", style(format!("Error during query: {}", e)).red());
                }
            },
        }
    }

    Ok(())
}

/// Collections persisted under the vector directory by name, with their on-disk size
#[inline]
pub fn list_collections(persist_dir: &Path) -> Result<Vec<(String, u64)>> {
    if !persist_dir.exists() {
        return Ok(Vec::new());
    }

    let mut collections = Vec::new();
    for entry in fs::read_dir(persist_dir)
        .with_context(|| format!("Failed to read {}", persist_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some("lance") {
            continue;
        }
        if let Some(table_name) = path.file_stem().and_then(|s| s.to_str()) {
            let name = collection_from_table_name(table_name).unwrap_or_else(|| {
                warn!("Table '{}' does not follow collection naming", table_name);
                table_name.to_string()
            });
            collections.push((name, directory_size(&path)));
        }
    }

    collections.sort();
    Ok(collections)
}

fn directory_size(path: &Path) -> u64 {
    fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        directory_size(&path)
                    } else {
                        entry.metadata().map(|m| m.len()).unwrap_or(0)
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

/// Show configuration, Ollama health and stored collections
#[inline]
pub fn show_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("📊 PDF RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   💬 Chat Model: {}", config.ollama.chat_model);
                println!("   🖼️  Vision Model: {}", config.ollama.vision_model);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    println!();
    println!("🔍 Vector Database Status:");
    let persist_dir = config.vector_database_path();
    println!("   📁 Location: {}", persist_dir.display());
    match list_collections(&persist_dir) {
        Ok(collections) if collections.is_empty() => {
            println!("   📭 No documents ingested yet");
        }
        Ok(collections) => {
            for (name, bytes) in &collections {
                println!("   📄 {} ({:.2} MB)", name, *bytes as f64 / 1_048_576.0);
            }
        }
        Err(e) => {
            println!("   ❌ Failed to list collections - {}", e);
        }
    }

    println!();
    println!(
        "⚙️  Retrieval: k={} fetch_k={} lambda={}",
        config.retrieval.k, config.retrieval.fetch_k, config.retrieval.lambda_mult
    );
    println!(
        "💬 Chat: {} turns kept, temperature {}",
        config.chat.max_turns, config.chat.temperature
    );

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'pdf-rag ingest <PAGES_DIR>' to index a rendered document");
    println!("   • Use 'pdf-rag chat --collection <NAME>' to ask questions");

    Ok(())
}
