use super::*;
use crate::database::IndexManager;
use crate::test_support::{HashEmbedder, TextDescriber};
use std::fs;
use tempfile::TempDir;

fn indexer(sequence: Arc<ChunkIdSequence>) -> DocumentIndexer {
    DocumentIndexer::new(Arc::new(TextDescriber), ChunkingConfig::default(), sequence)
}

async fn fresh_index(dir: &Path, collection: &str) -> IndexHandle {
    let mut manager = IndexManager::new(dir, Arc::new(HashEmbedder::new(32)));
    manager.init(collection).await.expect("init should succeed")
}

#[tokio::test]
async fn ingests_rendered_page_directory() {
    let store = TempDir::new().expect("should create temp dir");
    let pages = TempDir::new().expect("should create temp dir");
    fs::write(pages.path().join("page_2.png"), "Second page about wells.").expect("write page");
    fs::write(pages.path().join("page_1.png"), "First page about ponds.").expect("write page");
    fs::write(pages.path().join("notes.md"), "ignored").expect("write file");

    let index = fresh_index(store.path(), "pages").await;
    let report = indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(pages.path(), &index)
        .await
        .expect("ingest should succeed");

    assert_eq!(report.collection, "pages");
    assert_eq!(report.pages, 2);
    assert_eq!(report.chunks_created, 2);
    assert_eq!(report.documents_indexed, 2);
    assert_eq!(report.total_documents, 2);
    assert!(!report.reused_existing);
}

#[tokio::test]
async fn empty_document_leaves_queryable_empty_index() {
    let store = TempDir::new().expect("should create temp dir");
    let index = fresh_index(store.path(), "blank").await;

    let pages = vec![
        Page {
            page_number: 1,
            text: String::new(),
        },
        Page {
            page_number: 2,
            text: "  \n ".to_string(),
        },
    ];
    let report = indexer(Arc::new(ChunkIdSequence::new()))
        .ingest_pages(&pages, &index)
        .await
        .expect("ingest should succeed");

    assert_eq!(report.empty_pages, 2);
    assert_eq!(report.chunks_created, 0);
    assert!(report.is_empty());
    assert!(
        index
            .search(&[0.0; 32], 5)
            .await
            .expect("search works")
            .is_empty()
    );
}

#[tokio::test]
async fn existing_collection_is_reused() {
    let store = TempDir::new().expect("should create temp dir");
    let pages = TempDir::new().expect("should create temp dir");
    fs::write(pages.path().join("1.png"), "Only page.").expect("write page");

    let first = fresh_index(store.path(), "reuse").await;
    indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(pages.path(), &first)
        .await
        .expect("ingest should succeed");

    let second = fresh_index(store.path(), "reuse").await;
    let report = indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(pages.path(), &second)
        .await
        .expect("ingest should succeed");

    assert!(report.reused_existing);
    assert_eq!(report.total_documents, 1);
    assert_eq!(second.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn sequence_resumes_after_persisted_ids() {
    let store = TempDir::new().expect("should create temp dir");
    let index = fresh_index(store.path(), "ids").await;
    let pages = vec![Page {
        page_number: 1,
        text: "stored text".to_string(),
    }];
    indexer(Arc::new(ChunkIdSequence::starting_at(40)))
        .ingest_pages(&pages, &index)
        .await
        .expect("ingest should succeed");

    let sequence = Arc::new(ChunkIdSequence::new());
    indexer(Arc::clone(&sequence))
        .resume_sequence(&index)
        .await
        .expect("resume should succeed");

    assert_eq!(sequence.peek(), 41);
}

#[tokio::test]
async fn describer_failure_aborts_ingest() {
    let store = TempDir::new().expect("should create temp dir");
    let pages = TempDir::new().expect("should create temp dir");
    fs::write(pages.path().join("page_1.png"), [0xff, 0xfe, 0x00]).expect("write page");

    let index = fresh_index(store.path(), "broken").await;
    let result = indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(pages.path(), &index)
        .await;

    assert!(matches!(result, Err(RagError::ExternalService(_))));
    assert_eq!(index.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn unsupported_document_is_rejected() {
    let store = TempDir::new().expect("should create temp dir");
    let document = store.path().join("report.pdf");
    fs::write(&document, "%PDF-1.7").expect("write file");

    let index = fresh_index(store.path(), "pdf").await;
    let result = indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(&document, &index)
        .await;

    assert!(matches!(result, Err(RagError::Io(_))));
}

#[tokio::test]
async fn ingest_records_document_source() {
    let store = TempDir::new().expect("should create temp dir");
    let pages = TempDir::new().expect("should create temp dir");
    fs::write(pages.path().join("1.png"), "Recorded page.").expect("write page");

    let index = fresh_index(store.path(), "recorded").await;
    indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(pages.path(), &index)
        .await
        .expect("ingest should succeed");

    let source = index
        .source()
        .await
        .expect("should read source")
        .expect("source is recorded");
    assert_eq!(
        source.document,
        fs::canonicalize(pages.path()).expect("path exists")
    );
}

#[tokio::test]
async fn other_document_with_same_collection_is_rejected() {
    let store = TempDir::new().expect("should create temp dir");
    let documents = TempDir::new().expect("should create temp dir");
    let first = documents.path().join("one").join("report");
    let second = documents.path().join("two").join("report");
    fs::create_dir_all(&first).expect("create document dir");
    fs::create_dir_all(&second).expect("create document dir");
    fs::write(first.join("1.png"), "Ponds freeze in January.").expect("write page");
    fs::write(second.join("1.png"), "Zebras graze at dawn.").expect("write page");

    let index = fresh_index(store.path(), "report").await;
    indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(&first, &index)
        .await
        .expect("ingest should succeed");

    let reopened = fresh_index(store.path(), "report").await;
    let result = indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(&second, &reopened)
        .await;

    assert!(matches!(result, Err(RagError::Config(_))));
    assert_eq!(reopened.count().await.expect("should count"), 1);
    let source = reopened
        .source()
        .await
        .expect("should read source")
        .expect("source is recorded");
    assert_eq!(
        source.document,
        fs::canonicalize(&first).expect("path exists")
    );
}

#[tokio::test]
async fn unrecorded_collection_is_not_reused() {
    let store = TempDir::new().expect("should create temp dir");
    let pages = TempDir::new().expect("should create temp dir");
    fs::write(pages.path().join("1.png"), "New page.").expect("write page");

    let index = fresh_index(store.path(), "legacy").await;
    indexer(Arc::new(ChunkIdSequence::new()))
        .ingest_pages(
            &[Page {
                page_number: 1,
                text: "Unknown origin.".to_string(),
            }],
            &index,
        )
        .await
        .expect("ingest should succeed");

    let result = indexer(Arc::new(ChunkIdSequence::new()))
        .ingest(pages.path(), &index)
        .await;

    assert!(matches!(result, Err(RagError::Config(_))));
}
