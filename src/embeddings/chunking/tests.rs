use super::*;

fn page(page_number: u32, text: &str) -> Page {
    Page {
        page_number,
        text: text.to_string(),
    }
}

fn prose(len: usize) -> String {
    "The quick brown fox jumps over the lazy dog. "
        .repeat(len / 40 + 1)
        .chars()
        .take(len)
        .collect()
}

fn shared_chars(previous: &str, next: &str) -> usize {
    let previous: Vec<char> = previous.chars().collect();
    let next: Vec<char> = next.chars().collect();
    (1..=previous.len().min(next.len()))
        .rev()
        .find(|&n| previous[previous.len() - n..] == next[..n])
        .unwrap_or(0)
}

#[test]
fn small_page_is_kept_verbatim() {
    let config = ChunkingConfig::default();
    let text = "  Short page.\n\nWith a second paragraph.  ";

    let windows = split_text(text, &config);

    assert_eq!(windows, vec![text.to_string()]);
}

#[test]
fn page_of_exactly_chunk_size_is_single_chunk() {
    let config = ChunkingConfig::default();
    let text = prose(500);
    assert_eq!(text.chars().count(), 500);

    let windows = split_text(&text, &config);

    assert_eq!(windows, vec![text]);
}

#[test]
fn twelve_hundred_characters_make_three_chunks() {
    let config = ChunkingConfig::default();

    for text in [prose(1200), "a".repeat(1200), "word ".repeat(240)] {
        let windows = split_text(&text, &config);
        assert_eq!(windows.len(), 3, "unexpected windows for {text:?}");

        for pair in windows.windows(2) {
            assert!(shared_chars(&pair[0], &pair[1]) >= config.chunk_overlap);
        }
    }
}

#[test]
fn hard_cut_without_boundaries() {
    let config = ChunkingConfig::default();
    let windows = split_text(&"x".repeat(1200), &config);

    let lengths: Vec<usize> = windows.iter().map(|w| w.chars().count()).collect();
    assert_eq!(lengths, vec![500, 500, 300]);
}

#[test]
fn large_pages_respect_size_and_overlap() {
    let config = ChunkingConfig::default();
    let text = format!(
        "{}\n\n{}\n{}",
        prose(900),
        "Tables:\n| a | b |\n| 1 | 2 |".repeat(20),
        prose(1400)
    );

    let windows = split_text(&text, &config);

    assert!(windows.len() > 3);
    for window in &windows {
        assert!(window.chars().count() <= config.chunk_size);
        assert!(!window.trim().is_empty());
    }
    for pair in windows.windows(2) {
        assert!(
            shared_chars(&pair[0], &pair[1]) >= config.chunk_overlap,
            "windows {:?} and {:?} do not overlap enough",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn prefers_paragraph_breaks() {
    let config = ChunkingConfig::default();
    let first = prose(380);
    let text = format!("{first}\n\n{}", prose(700));

    let windows = split_text(&text, &config);

    assert_eq!(windows[0], format!("{first}\n\n"));
}

#[test]
fn prefers_word_boundaries_over_hard_cuts() {
    let config = ChunkingConfig::default();
    let text = "lorem ipsum dolor ".repeat(60);

    let windows = split_text(&text, &config);

    for window in &windows[..windows.len() - 1] {
        assert!(window.ends_with(' '), "window cut mid-word: {window:?}");
    }
}

#[test]
fn multibyte_text_is_split_on_characters() {
    let config = ChunkingConfig::default();
    let text = "日本語のテキスト。".repeat(150);

    let windows = split_text(&text, &config);

    assert!(windows.len() > 1);
    for window in &windows {
        assert!(window.chars().count() <= config.chunk_size);
    }
}

#[test]
fn whitespace_only_text_yields_nothing() {
    let config = ChunkingConfig::default();
    assert!(split_text("", &config).is_empty());
    assert!(split_text(" \n\t ", &config).is_empty());
    assert!(split_text(&" ".repeat(2000), &config).is_empty());
}

#[test]
fn chunk_pages_skips_empty_pages_and_keeps_provenance() {
    let config = ChunkingConfig::default();
    let ids = ChunkIdSequence::new();
    let pages = vec![
        page(1, "First page."),
        page(2, ""),
        page(3, "   "),
        page(4, &prose(1200)),
    ];

    let chunks = chunk_pages(&pages, &config, &ids);

    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].page_no, "1");
    assert_eq!(chunks[0].text, "First page.");
    assert!(chunks[1..].iter().all(|c| c.page_no == "4"));
    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
}

#[test]
fn chunk_ids_continue_across_documents() {
    let config = ChunkingConfig::default();
    let ids = ChunkIdSequence::new();

    let first = chunk_pages(&[page(1, &prose(1200))], &config, &ids);
    let second = chunk_pages(&[page(1, "Another document.")], &config, &ids);

    let all: Vec<u64> = first
        .iter()
        .chain(second.iter())
        .map(|c| c.chunk_id.parse().expect("numeric chunk id"))
        .collect();
    assert!(all.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(second[0].chunk_id, "4");
    assert_eq!(second[0].page_no, "1");
}

#[test]
fn empty_document_produces_no_chunks() {
    let ids = ChunkIdSequence::new();
    let chunks = chunk_pages(&[], &ChunkingConfig::default(), &ids);

    assert!(chunks.is_empty());
    assert_eq!(ids.peek(), 1);
}

#[test]
fn sequence_advance_past_never_goes_backwards() {
    let ids = ChunkIdSequence::starting_at(10);
    ids.advance_past(4);
    assert_eq!(ids.peek(), 10);

    ids.advance_past(41);
    assert_eq!(ids.next_id(), 42);
    assert_eq!(ids.next_id(), 43);
}
