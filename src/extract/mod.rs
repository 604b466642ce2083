// Page extraction
// Turns rendered page images (or pre-extracted page text) into numbered pages

#[cfg(test)]
mod tests;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// Form feed, the page separator `pdftotext` writes between pages
pub const PAGE_SEPARATOR: char = '\u{c}';

/// Instruction sent with every page image to the vision model
pub const DESCRIBE_PAGE_PROMPT: &str = "\
You are an image analysis assistant. Extract the information on this document page \
as accurately and completely as possible, including text inside images embedded in the page.

Answer with exactly these four sections, in this order:

1. Textual Information:
All visible text exactly as it appears. Preserve line breaks, punctuation and reading order. \
Rewrite multi-column layouts as a single column.

2. Tables:
Every table, including tables inside embedded images or diagrams, in a structured format. \
Keep table titles; give untitled tables a short descriptive title.

3. Textual Information in Embedded Images:
Text found inside embedded images (charts, signs, screenshots), numbered serially.

4. Images Short Description:
A very short description of each regular image, e.g. \"Image 1: a bar chart of yearly sales\".

Always output all four sections. Write \"None\" in a section that has no content. \
Do not merge sections and do not add commentary.";

/// One page of extracted text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number
    pub page_number: u32,
    pub text: String,
}

/// Page-to-text oracle: describes a rendered page image as structured text
pub trait PageDescriber: Send + Sync {
    fn describe_page(&self, image: &[u8]) -> Result<String>;
}

/// Where the text of a page comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// A rendered page image to run through the page describer
    Image(PathBuf),
    /// Text that was already extracted
    Text(String),
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Discover the pages of a document.
///
/// `document` may be a directory of page files (images and/or `.txt`, ordered by
/// the number in their file name), a single page image, or a `.txt` file whose
/// pages are separated by form feeds.
#[inline]
pub fn discover_pages(document: &Path) -> Result<Vec<PageSource>> {
    if document.is_dir() {
        return discover_page_directory(document);
    }

    match extension_of(document).as_deref() {
        Some("txt") => {
            let content = fs::read_to_string(document)?;
            Ok(content
                .split(PAGE_SEPARATOR)
                .map(|text| PageSource::Text(text.to_string()))
                .collect())
        }
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => {
            Ok(vec![PageSource::Image(document.to_path_buf())])
        }
        _ => Err(RagError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Unsupported document {}: expected a directory of rendered pages, a page image or a text file",
                document.display()
            ),
        ))),
    }
}

fn discover_page_directory(dir: &Path) -> Result<Vec<PageSource>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        match extension_of(&path).as_deref() {
            Some("txt") => files.push(path),
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => files.push(path),
            _ => debug!("Ignoring non-page file {}", path.display()),
        }
    }

    files.sort_by_cached_key(|path| page_sort_key(path));

    files
        .into_iter()
        .map(|path| {
            if extension_of(&path).as_deref() == Some("txt") {
                Ok(PageSource::Text(fs::read_to_string(&path)?))
            } else {
                Ok(PageSource::Image(path))
            }
        })
        .collect()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Order page files by the last number in their name, then by name
fn page_sort_key(path: &Path) -> (u64, String) {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let number = stem
        .rsplit(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(u64::MAX);

    (number, stem)
}

/// Turn page sources into numbered pages, describing images with `describer`.
///
/// A failure on any page aborts the whole extraction.
#[inline]
pub fn extract_pages(sources: &[PageSource], describer: &dyn PageDescriber) -> Result<Vec<Page>> {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new(sources.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Describing pages {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    };

    let mut pages = Vec::with_capacity(sources.len());

    for (index, source) in sources.iter().enumerate() {
        let page_number = u32::try_from(index + 1)
            .map_err(|_| RagError::Other(anyhow::anyhow!("Too many pages in document")))?;

        let text = match source {
            PageSource::Text(text) => text.clone(),
            PageSource::Image(path) => {
                bar.set_message(path.display().to_string());
                let image = fs::read(path)?;
                describer.describe_page(&image).map_err(|e| {
                    RagError::ExternalService(format!(
                        "Failed to describe page {} ({}): {}",
                        page_number,
                        path.display(),
                        e
                    ))
                })?
            }
        };

        if text.trim().is_empty() {
            warn!("Page {} has no extractable text", page_number);
        }

        pages.push(Page { page_number, text });
        bar.inc(1);
    }

    bar.finish_and_clear();
    info!("Extracted {} pages", pages.len());
    Ok(pages)
}
