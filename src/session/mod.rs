// Session module
// Document setup and question answering for one user, the API the CLI drives


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::conversation::{ChatConfig, ChatModel, ConversationEngine};
use crate::database::IndexManager;
use crate::embeddings::{ChunkIdSequence, Embedder};
use crate::extract::PageDescriber;
use crate::indexer::{DocumentIndexer, IngestReport};
use crate::ollama::OllamaClient;
use crate::retriever::{RetrievalConfig, Retriever};
use crate::{RagError, Result};

/// One answered question as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub bot: String,
}

/// Collection name for a document: its file stem without spaces
#[inline]
pub fn collection_name(document: &Path) -> String {
    document
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace(' ', ""))
        .unwrap_or_default()
}

/// Question answering over one document at a time.
///
/// Owns the pipeline context: the index manager, the chunk id sequence (kept
/// for the lifetime of the session, across resets), the conversation engine
/// and the displayed chat turns.
pub struct RagSession {
    manager: IndexManager,
    indexer: DocumentIndexer,
    chat_model: Arc<dyn ChatModel>,
    retrieval: RetrievalConfig,
    chat: ChatConfig,
    engine: Option<ConversationEngine>,
    turns: Vec<ChatTurn>,
    document: Option<PathBuf>,
}

impl std::fmt::Debug for RagSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagSession")
            .field("manager", &self.manager)
            .field("indexer", &self.indexer)
            .field("engine", &self.engine)
            .field("turns", &self.turns.len())
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl RagSession {
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
        describer: Arc<dyn PageDescriber>,
    ) -> Self {
        Self {
            manager: IndexManager::new(config.vector_database_path(), embedder),
            indexer: DocumentIndexer::new(
                describer,
                config.chunking.clone(),
                Arc::new(ChunkIdSequence::new()),
            ),
            chat_model,
            retrieval: config.retrieval.clone(),
            chat: config.chat.clone(),
            engine: None,
            turns: Vec::new(),
            document: None,
        }
    }

    /// Session backed by a single Ollama server for all three model capabilities
    #[inline]
    pub fn with_ollama(config: &Config) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(&config.ollama)?);
        Ok(Self::new(
            config,
            Arc::clone(&client) as Arc<dyn Embedder>,
            Arc::clone(&client) as Arc<dyn ChatModel>,
            client,
        ))
    }

    /// Build (or reload) the index for `document` and get ready for questions.
    ///
    /// Any previous document's history and engine are discarded first.
    #[inline]
    pub async fn init_session(&mut self, document: &Path) -> Result<IngestReport> {
        self.init_session_as(document, &collection_name(document)).await
    }

    /// Like [`RagSession::init_session`], storing the document under `collection`
    #[inline]
    pub async fn init_session_as(
        &mut self,
        document: &Path,
        collection: &str,
    ) -> Result<IngestReport> {
        self.reset();

        match self.set_up(document, collection).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    async fn set_up(&mut self, document: &Path, collection: &str) -> Result<IngestReport> {
        info!(
            "Setting up session for {} (collection '{}')",
            document.display(),
            collection
        );

        let index = self.manager.init(collection).await?;
        let report = self.indexer.ingest(document, &index).await?;
        self.build_engine()?;
        self.document = Some(document.to_path_buf());

        if report.is_empty() {
            warn!(
                "No text was indexed from {}; answers will have no context",
                document.display()
            );
        }
        Ok(report)
    }

    /// Reload an already ingested collection and get ready for questions
    ///
    /// # Returns
    /// * `Result<usize>` - Number of documents in the collection
    ///
    /// # Errors
    /// * `RagError::NotInitialized` if the collection was never ingested
    #[inline]
    pub async fn open_collection(&mut self, collection: &str) -> Result<usize> {
        self.reset();

        let index = self.manager.open(collection).await?;
        self.indexer.resume_sequence(&index).await?;
        let count = index.count().await?;
        if count == 0 {
            warn!("Collection '{}' is empty", index.collection());
        }

        self.build_engine()?;
        Ok(count)
    }

    fn build_engine(&mut self) -> Result<()> {
        let retriever = Retriever::from_manager(&self.manager, &self.retrieval)?;
        self.engine = Some(ConversationEngine::new(
            Arc::new(retriever),
            Arc::clone(&self.chat_model),
            self.chat.clone(),
            self.retrieval.k,
        )?);
        Ok(())
    }

    /// Answer a question about the current document
    ///
    /// # Errors
    /// * `RagError::NotInitialized` before a document or collection is set up
    #[inline]
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let engine = self.engine.as_mut().ok_or_else(|| {
            RagError::NotInitialized("No document has been set up for this session".to_string())
        })?;

        let answer = engine.query(question).await?;
        self.turns.push(ChatTurn {
            user: question.to_string(),
            bot: answer.clone(),
        });
        Ok(answer)
    }

    #[inline]
    pub fn history(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    #[inline]
    pub fn document(&self) -> Option<&Path> {
        self.document.as_deref()
    }

    /// Name of the active collection, if any
    #[inline]
    pub fn collection(&self) -> Option<String> {
        self.manager
            .get_active()
            .ok()
            .map(|index| index.collection().to_string())
    }

    /// Next chunk id the session will hand out
    #[inline]
    pub fn next_chunk_id(&self) -> u64 {
        self.indexer.sequence().peek()
    }

    /// Drop history, engine and active index; the chunk id sequence is kept
    #[inline]
    pub fn reset(&mut self) {
        self.engine = None;
        self.turns.clear();
        self.document = None;
        self.manager.reset();
    }
}
