// Conversation module
// Retrieval-augmented chat with a bounded rolling history

pub mod history;


pub use history::RollingHistory;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::retriever::DocumentRetriever;
use crate::{RagError, Result};

/// Instruction sent as the first message of every generation request
pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful assistant for PDF documents Q/A from partial document contexts.";

/// Prefix stored in front of every model answer kept in history
pub const RESPONSE_LABEL: &str = "response: ";

const DEFAULT_MAX_TURNS: usize = 4;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for a single generation request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    #[inline]
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Text generation capability
pub trait ChatModel: Send + Sync {
    fn generate(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Conversation turns kept in history; one turn is a prompt plus its answer
    pub max_turns: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ChatConfig {
    #[inline]
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// History entries kept: two per turn
    #[inline]
    pub fn history_capacity(&self) -> usize {
        self.max_turns.saturating_mul(2)
    }
}

/// One entry of the rolling history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    /// Fully rendered prompt, context included
    Prompt(String),
    /// Model answer, stored with [`RESPONSE_LABEL`]
    Response(String),
}

impl HistoryEntry {
    #[inline]
    pub fn to_message(&self) -> ChatMessage {
        match self {
            Self::Prompt(text) => ChatMessage::user(text.as_str()),
            Self::Response(text) => ChatMessage::assistant(text.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingRetrieval,
    AwaitingGeneration,
}

/// Fill the answer template with retrieved context and the user question
#[inline]
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following context to answer the question concisely and accurately.\n\n\
         Context: {context}\n\n\
         User Question: {question}"
    )
}

/// Runs query cycles against one index: retrieve, prompt, generate, remember.
pub struct ConversationEngine {
    retriever: Arc<dyn DocumentRetriever>,
    model: Arc<dyn ChatModel>,
    config: ChatConfig,
    retrieval_k: usize,
    history: RollingHistory<HistoryEntry>,
    state: ConversationState,
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("config", &self.config)
            .field("retrieval_k", &self.retrieval_k)
            .field("history", &self.history)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConversationEngine {
    #[inline]
    pub fn new(
        retriever: Arc<dyn DocumentRetriever>,
        model: Arc<dyn ChatModel>,
        config: ChatConfig,
        retrieval_k: usize,
    ) -> Result<Self> {
        if config.max_turns == 0 {
            return Err(RagError::Config(
                "Conversation history must keep at least one turn".to_string(),
            ));
        }
        if retrieval_k == 0 {
            return Err(RagError::Config(
                "Retrieval must return at least one document".to_string(),
            ));
        }

        Ok(Self {
            retriever,
            model,
            history: RollingHistory::with_capacity(config.history_capacity()),
            config,
            retrieval_k,
            state: ConversationState::Idle,
        })
    }

    #[inline]
    pub fn state(&self) -> ConversationState {
        self.state
    }

    #[inline]
    pub fn history(&self) -> &RollingHistory<HistoryEntry> {
        &self.history
    }

    #[inline]
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Messages for the next generation request: system instruction, then history
    #[inline]
    pub fn messages(&self) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage::system(SYSTEM_INSTRUCTION))
            .chain(self.history.iter().map(HistoryEntry::to_message))
            .collect()
    }

    /// Answer one question from retrieved context and the rolling history.
    ///
    /// A failed generation leaves the history exactly as it was before the call.
    pub async fn query(&mut self, question: &str) -> Result<String> {
        let result = self.run_cycle(question).await;
        self.state = ConversationState::Idle;
        result
    }

    async fn run_cycle(&mut self, question: &str) -> Result<String> {
        self.state = ConversationState::AwaitingRetrieval;
        let documents = self.retriever.retrieve(question, self.retrieval_k).await?;
        debug!("Retrieved {} documents for question", documents.len());

        let context = documents
            .iter()
            .map(|doc| doc.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render_prompt(&context, question);

        let evicted = self.history.push(HistoryEntry::Prompt(prompt));
        let messages = self.messages();

        self.state = ConversationState::AwaitingGeneration;
        let model = Arc::clone(&self.model);
        let options = self.config.generation_options();
        let generated =
            match tokio::task::spawn_blocking(move || model.generate(&messages, &options)).await {
                Ok(result) => result,
                Err(e) => Err(RagError::ExternalService(format!(
                    "Generation task failed: {e}"
                ))),
            };

        match generated {
            Ok(answer) => {
                self.history
                    .push(HistoryEntry::Response(format!("{RESPONSE_LABEL}{answer}")));
                Ok(answer)
            }
            Err(e) => {
                warn!("Generation failed, discarding prompt from history: {}", e);
                self.history.pop_newest();
                if let Some(entry) = evicted {
                    self.history.restore_oldest(entry);
                }
                Err(e)
            }
        }
    }
}
