//! Paginated-document (PDF) chapter builder

#[cfg(feature = "pdf")]
mod outline;

#[cfg(feature = "pdf")]
pub use outline::PdfOutline;

use log::{info, warn};

use crate::error::{ReaderError, Result};
use crate::model::{Chapter, Document, DocumentFormat, Locator, anchor_height};

/// Page named by an explicit destination
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageRef {
    /// Zero-based page number
    Index(usize),
    /// Indirect reference to a page object
    Object(u32, u16),
}

/// Destination written out in full
#[derive(Clone, Debug, PartialEq)]
pub struct ExplicitDest {
    pub page: PageRef,
    /// Vertical anchor in page space, if the destination type carries one
    pub top: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Destination {
    Explicit(ExplicitDest),
    /// Looked up in the document's name dictionary
    Named(String),
}

/// Raw outline (bookmarks tree) entry
#[derive(Clone, Debug, PartialEq)]
pub struct OutlineItem {
    pub title: String,
    pub dest: Option<Destination>,
    pub children: Vec<OutlineItem>,
}

impl OutlineItem {
    pub fn new(title: impl Into<String>, dest: Option<Destination>) -> Self {
        Self {
            title: title.into(),
            dest,
            children: Vec::new(),
        }
    }

    pub fn at_page(title: impl Into<String>, page: usize, top: Option<f32>) -> Self {
        Self::new(
            title,
            Some(Destination::Explicit(ExplicitDest {
                page: PageRef::Index(page),
                top,
            })),
        )
    }

    pub fn with_children(mut self, children: Vec<OutlineItem>) -> Self {
        self.children = children;
        self
    }
}

/// A paginated document as seen by the chapter builder
pub trait OutlineSource {
    fn page_count(&self) -> usize;
    fn outline(&self) -> &[OutlineItem];
    /// Resolve a destination to a zero-based page index and optional anchor.
    fn resolve(&self, dest: &Destination) -> Result<(usize, Option<f32>)>;
}

struct Resolved {
    page: usize,
    top: Option<f32>,
    label: String,
    level: usize,
}

fn resolve_entries(
    source: &impl OutlineSource,
    items: &[OutlineItem],
    level: usize,
    page_label: &str,
    out: &mut Vec<Resolved>,
    failures: &mut usize,
) {
    for item in items {
        let resolution = match &item.dest {
            Some(dest) => source.resolve(dest).and_then(|(page, top)| {
                if page < source.page_count() {
                    Ok((page, top))
                } else {
                    Err(ReaderError::outline(
                        &item.title,
                        format!("page {page} is beyond the last page"),
                    ))
                }
            }),
            None => Err(ReaderError::outline(&item.title, "entry has no destination")),
        };

        match resolution {
            Ok((page, top)) => {
                let label = match item.title.trim() {
                    "" => format!("{page_label} {}", page + 1),
                    title => title.to_string(),
                };
                out.push(Resolved {
                    page,
                    top: top.filter(|y| y.is_finite()),
                    label,
                    level,
                });
            }
            Err(e) => {
                warn!("Skipping outline entry: {e}");
                *failures += 1;
            }
        }

        // Children of an unresolvable entry may still point somewhere useful.
        resolve_entries(source, &item.children, level + 1, page_label, out, failures);
    }
}

/// Build the chapter list for a paginated document.
///
/// Outline entries are resolved one by one; failures are logged and
/// skipped. The result is sorted by page and, within a page, top anchor
/// first. When nothing resolves, every page becomes its own chapter.
pub fn build_paged_document(source: &impl OutlineSource, title: &str, page_label: &str) -> Document {
    let page_count = source.page_count();
    let mut resolved = Vec::new();
    let mut failures = 0;
    resolve_entries(
        source,
        source.outline(),
        1,
        page_label,
        &mut resolved,
        &mut failures,
    );

    resolved.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then_with(|| anchor_height(b.top).total_cmp(&anchor_height(a.top)))
    });

    let mut chapters: Vec<Chapter> = Vec::with_capacity(resolved.len());
    let mut seen: Vec<(usize, &str)> = Vec::new();
    for entry in &resolved {
        if seen.contains(&(entry.page, entry.label.as_str())) {
            continue;
        }
        seen.push((entry.page, entry.label.as_str()));
        chapters.push(Chapter::new(
            &entry.label,
            Locator::Page {
                page_index: entry.page,
                y_offset: entry.top,
            },
            entry.level,
        ));
    }

    let fallback = chapters.is_empty();
    if fallback {
        chapters = (0..page_count)
            .map(|page| Chapter::new(format!("{page_label} {}", page + 1), Locator::page(page), 1))
            .collect();
    }

    info!(
        "Paged document '{title}': {page_count} pages, {} chapters, {failures} unresolved outline entries{}",
        chapters.len(),
        if fallback { ", using page fallback" } else { "" }
    );

    Document::new(DocumentFormat::Paged, title, chapters, page_count)
}

/// Pre-resolved outline; destinations are page indices only.
#[derive(Clone, Debug, Default)]
pub struct StaticOutline {
    pub page_count: usize,
    pub items: Vec<OutlineItem>,
}

impl OutlineSource for StaticOutline {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn outline(&self) -> &[OutlineItem] {
        &self.items
    }

    fn resolve(&self, dest: &Destination) -> Result<(usize, Option<f32>)> {
        match dest {
            Destination::Explicit(ExplicitDest {
                page: PageRef::Index(page),
                top,
            }) => Ok((*page, *top)),
            other => Err(ReaderError::outline("", format!("cannot resolve {other:?}"))),
        }
    }
}
