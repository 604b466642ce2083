use super::*;

#[test]
fn indexed_document_from_chunk() {
    let chunk = Chunk {
        chunk_id: "7".to_string(),
        page_no: "3".to_string(),
        text: "Quarterly revenue grew".to_string(),
    };

    let document = IndexedDocument::from(chunk);

    assert_eq!(document.content, "Quarterly revenue grew");
    assert_eq!(document.metadata.chunk_id, "7");
    assert_eq!(document.metadata.page_no, "3");
}

#[test]
fn indexed_document_serialization() {
    let document = IndexedDocument {
        content: "Test content".to_string(),
        metadata: DocumentMetadata {
            chunk_id: "1".to_string(),
            page_no: "1".to_string(),
        },
    };

    let json = serde_json::to_string(&document).expect("can serialize json");
    let deserialized: IndexedDocument = serde_json::from_str(&json).expect("can parse json");

    assert_eq!(document, deserialized);
}

#[test]
fn collection_names_are_encoded() {
    assert_eq!(sanitize_collection_name("AnnualReport-2024"), "AnnualReport-2024");
    assert_eq!(sanitize_collection_name("Annual Report.pdf"), "Annual_20_Report_2e_pdf");
    assert_eq!(sanitize_collection_name("../escape"), "_2e__2e__2f_escape");
    assert_eq!(sanitize_collection_name("bericht-ä"), "bericht-_e4_");
    assert_eq!(sanitize_collection_name("  "), "pdf_5f_chunks");
}

#[test]
fn look_alike_names_get_distinct_tables() {
    let names = ["a.b", "a_b", "a b", "a_2e_b", "ab"];
    let tables: std::collections::HashSet<String> =
        names.iter().map(|name| sanitize_collection_name(name)).collect();

    assert_eq!(tables.len(), names.len());
}

#[test]
fn table_names_decode_to_collection_names() {
    for name in ["report", "Annual Report", "a_b", "a.b", "bericht-ä", "a_2e_b"] {
        assert_eq!(
            collection_from_table_name(&sanitize_collection_name(name)).as_deref(),
            Some(name)
        );
    }

    assert_eq!(collection_from_table_name("pdf_5f_chunks").as_deref(), Some(DEFAULT_COLLECTION));
    assert_eq!(collection_from_table_name("a_2e"), None);
    assert_eq!(collection_from_table_name("a_zz_b"), None);
    assert_eq!(collection_from_table_name("a.b"), None);
    assert_eq!(collection_from_table_name("_41_"), None);
    assert_eq!(collection_from_table_name(""), None);
}

#[test]
fn blank_collection_names_fall_back_to_default() {
    assert_eq!(normalize_collection_name("  report "), "report");
    assert_eq!(normalize_collection_name(" \t"), DEFAULT_COLLECTION);
}
