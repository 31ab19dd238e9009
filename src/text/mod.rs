//! Plain-text chapter builder

pub mod decode;
pub mod segmenter;

use log::info;

use crate::model::{Chapter, Document, DocumentFormat, Locator};

pub use decode::{DecodedText, decode_text};
pub use segmenter::{Segment, is_heading, segment};

/// A text document together with the body of every chapter
#[derive(Clone, Debug)]
pub struct TextBook {
    pub document: Document,
    /// Parallel to `document.chapters()`
    pub bodies: Vec<String>,
}

/// Build the chapter list for already-decoded text.
///
/// `name` labels the single chapter of a heading-less text; `front_matter`
/// labels any content preceding the first heading.
pub fn build_text_book(text: &str, name: &str, front_matter: &str) -> TextBook {
    let normalized = decode::normalize_line_endings(text);
    let lines: Vec<&str> = normalized.split('\n').collect();
    let segments = segment(&lines);

    let (chapters, bodies): (Vec<Chapter>, Vec<String>) = if segments.is_empty() {
        (
            vec![Chapter::new(name, Locator::lines(0, lines.len()), 1)],
            vec![normalized.clone()],
        )
    } else {
        segments
            .into_iter()
            .map(|seg| {
                let label = seg.heading.unwrap_or_else(|| front_matter.to_string());
                (
                    Chapter::new(label, Locator::lines(seg.start_line, seg.end_line), 1),
                    seg.body,
                )
            })
            .unzip()
    };

    info!(
        "Text '{name}': {} lines, {} chapters",
        lines.len(),
        chapters.len()
    );

    let document = Document::new(DocumentFormat::Text, name, chapters, lines.len());
    // Document::new only drops duplicates, which line ranges never produce.
    debug_assert_eq!(document.len(), bodies.len());

    TextBook { document, bodies }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_less_text_is_one_chapter_named_after_file() {
        let book = build_text_book("a\nb\nc", "notes.txt", "Front Matter");
        assert_eq!(book.document.len(), 1);
        assert_eq!(book.document.chapters()[0].label, "notes.txt");
        assert_eq!(book.document.chapters()[0].locator, Locator::lines(0, 3));
        assert_eq!(book.bodies, vec!["a\nb\nc".to_string()]);
        assert_eq!(book.document.total_units, 3);
    }

    #[test]
    fn cjk_scenario() {
        let book = build_text_book(
            "intro text\n第一章 开端\nbody1\n第二章 发展\nbody2",
            "book.txt",
            "Front Matter",
        );
        let labels: Vec<_> = book
            .document
            .chapters()
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Front Matter", "第一章 开端", "第二章 发展"]);
        assert!(book.bodies[0].contains("intro text"));
        assert!(book.bodies[1].contains("body1"));
        assert!(!book.bodies[1].contains("body2"));
        assert!(book.bodies[2].contains("body2"));
        assert!(book.document.is_in_document_order());
    }

    #[test]
    fn windows_line_endings_are_normalized() {
        let book = build_text_book("Chapter 1\r\none\r\nChapter 2\r\ntwo", "w.txt", "Front");
        assert_eq!(book.document.len(), 2);
        assert_eq!(book.bodies[0], "Chapter 1\n\none");
    }
}
