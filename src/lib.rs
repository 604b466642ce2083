use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector index not initialized: {0}")]
    NotInitialized(String),

    #[error("Invalid vector index: {0}")]
    InvalidIndex(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("No extractable text: {0}")]
    EmptyInput(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod conversation;
pub mod database;
pub mod embeddings;
pub mod extract;
pub mod indexer;
pub mod ollama;
pub mod retriever;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
