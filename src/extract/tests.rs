use super::*;
use std::sync::Mutex;
use tempfile::TempDir;

/// Describes an image as its byte length and records every call
struct RecordingDescriber {
    calls: Mutex<Vec<usize>>,
}

impl PageDescriber for RecordingDescriber {
    fn describe_page(&self, image: &[u8]) -> Result<String> {
        self.calls
            .lock()
            .map_err(|_| RagError::Other(anyhow::anyhow!("poisoned")))?
            .push(image.len());
        Ok(format!("1. Textual Information:\nimage of {} bytes", image.len()))
    }
}

struct FailingDescriber;

impl PageDescriber for FailingDescriber {
    fn describe_page(&self, _image: &[u8]) -> Result<String> {
        Err(RagError::ExternalService("vision model offline".to_string()))
    }
}

#[test]
fn directory_pages_are_ordered_by_number() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(dir.path().join("page-10.txt"), "ten").expect("write");
    fs::write(dir.path().join("page-2.txt"), "two").expect("write");
    fs::write(dir.path().join("page-1.txt"), "one").expect("write");
    fs::write(dir.path().join("notes.md"), "ignored").expect("write");

    let sources = discover_pages(dir.path()).expect("should discover pages");

    assert_eq!(
        sources,
        vec![
            PageSource::Text("one".to_string()),
            PageSource::Text("two".to_string()),
            PageSource::Text("ten".to_string()),
        ]
    );
}

#[test]
fn text_file_splits_on_form_feeds() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("document.txt");
    fs::write(&path, "first page\u{c}second page\u{c}").expect("write");

    let sources = discover_pages(&path).expect("should discover pages");

    assert_eq!(sources.len(), 3);
    assert_eq!(sources[0], PageSource::Text("first page".to_string()));
    assert_eq!(sources[2], PageSource::Text(String::new()));
}

#[test]
fn unsupported_document_is_rejected() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("document.pdf");
    fs::write(&path, b"%PDF-1.7").expect("write");

    assert!(matches!(discover_pages(&path), Err(RagError::Io(_))));
}

#[test]
fn images_are_described_and_text_passes_through() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(dir.path().join("p1.png"), [0_u8; 16]).expect("write");
    fs::write(dir.path().join("p2.txt"), "already extracted").expect("write");
    fs::write(dir.path().join("p3.JPG"), [0_u8; 4]).expect("write");

    let describer = RecordingDescriber {
        calls: Mutex::new(Vec::new()),
    };
    let sources = discover_pages(dir.path()).expect("should discover pages");
    let pages = extract_pages(&sources, &describer).expect("should extract pages");

    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].page_number, 1);
    assert!(pages[0].text.contains("16 bytes"));
    assert_eq!(pages[1].text, "already extracted");
    assert_eq!(pages[2].page_number, 3);
    assert_eq!(
        *describer.calls.lock().expect("lock should not be poisoned"),
        vec![16, 4]
    );
}

#[test]
fn describer_failure_aborts_extraction() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(dir.path().join("p1.png"), [1_u8; 8]).expect("write");

    let sources = discover_pages(dir.path()).expect("should discover pages");
    let result = extract_pages(&sources, &FailingDescriber);

    match result {
        Err(RagError::ExternalService(message)) => {
            assert!(message.contains("page 1"));
            assert!(message.contains("vision model offline"));
        }
        other => panic!("expected external service error, got {other:?}"),
    }
}

#[test]
fn prompt_names_all_four_sections() {
    for section in [
        "Textual Information:",
        "Tables:",
        "Textual Information in Embedded Images:",
        "Images Short Description:",
    ] {
        assert!(DESCRIBE_PAGE_PROMPT.contains(section));
    }
    assert!(DESCRIBE_PAGE_PROMPT.contains("\"None\""));
}
