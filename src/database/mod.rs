// Database module
// LanceDB-backed vector collections and the manager tracking the active one

pub mod lancedb;
pub mod manager;

pub use self::lancedb::vector_store::{SearchCandidate, VectorIndex};
pub use self::lancedb::{
    DEFAULT_COLLECTION, DocumentMetadata, DocumentSource, IndexedDocument,
    collection_from_table_name, normalize_collection_name, sanitize_collection_name,
};
pub use manager::{IndexHandle, IndexManager};
