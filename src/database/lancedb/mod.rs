// LanceDB vector database module
// Handles vector storage and flat similarity search for page chunks

#[cfg(test)]
mod tests;

pub mod vector_store;

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::embeddings::Chunk;

/// Provenance stored alongside each indexed document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Value drawn from the chunk id sequence
    pub chunk_id: String,
    /// 1-based page number of the source page
    pub page_no: String,
}

/// A chunk as stored in and returned from the vector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl From<Chunk> for IndexedDocument {
    #[inline]
    fn from(chunk: Chunk) -> Self {
        Self {
            content: chunk.text,
            metadata: DocumentMetadata {
                chunk_id: chunk.chunk_id,
                page_no: chunk.page_no,
            },
        }
    }
}

/// Collection name used when none is given
pub const DEFAULT_COLLECTION: &str = "pdf_chunks";

/// Document a collection was built from, kept next to its table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    /// Canonical path of the ingested document
    pub document: PathBuf,
    /// RFC 3339 time of ingestion
    pub ingested_at: String,
}

impl DocumentSource {
    /// Identity of `document` as it exists on disk now
    #[inline]
    pub fn for_document(document: &Path) -> Result<Self> {
        Ok(Self {
            document: fs::canonicalize(document)?,
            ingested_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    #[inline]
    pub fn is_same_document(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

/// Collection name with surrounding whitespace removed, or the default when blank
#[inline]
pub fn normalize_collection_name(collection: &str) -> &str {
    let trimmed = collection.trim();
    if trimmed.is_empty() {
        DEFAULT_COLLECTION
    } else {
        trimmed
    }
}

/// Table name for a collection.
///
/// ASCII letters, digits and `-` are kept; any other character `c` is written
/// as `_<hex code point>_`. Distinct collection names never share a table and
/// [`collection_from_table_name`] recovers the original name.
#[inline]
pub fn sanitize_collection_name(collection: &str) -> String {
    let mut table_name = String::new();
    for c in normalize_collection_name(collection).chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            table_name.push(c);
        } else {
            let _ = write!(table_name, "_{:x}_", u32::from(c));
        }
    }
    table_name
}

/// Collection name a table was created for, if `table_name` is a valid encoding
#[inline]
pub fn collection_from_table_name(table_name: &str) -> Option<String> {
    let mut collection = String::new();
    let mut chars = table_name.chars();

    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '-' {
            collection.push(c);
        } else if c == '_' {
            let hex: String = chars.by_ref().take_while(|&h| h != '_').collect();
            if hex.is_empty() || !hex.chars().all(|h| h.is_ascii_hexdigit()) {
                return None;
            }
            collection.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
        } else {
            return None;
        }
    }

    (!collection.is_empty() && sanitize_collection_name(&collection) == table_name)
        .then_some(collection)
}
