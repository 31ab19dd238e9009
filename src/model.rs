//! Canonical chapter model shared by every document format.

use serde::{Deserialize, Serialize};

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 3;

/// Format of an open document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Zipped e-book package with a spine (EPUB)
    Package,
    /// Fixed-layout paginated document (PDF)
    Paged,
    /// Plain text
    Text,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Package => "package",
            DocumentFormat::Paged => "paged",
            DocumentFormat::Text => "text",
        }
    }
}

/// Format-specific position inside a document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Package-relative reference, may carry a `#fragment`
    Ref { href: String },
    /// Zero-based page, with an optional vertical anchor in page space
    Page {
        page_index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y_offset: Option<f32>,
    },
    /// Half-open line range `[start_line, end_line)`
    Line { start_line: usize, end_line: usize },
}

impl Locator {
    pub fn href(href: impl Into<String>) -> Self {
        Self::Ref { href: href.into() }
    }

    pub fn page(page_index: usize) -> Self {
        Self::Page {
            page_index,
            y_offset: None,
        }
    }

    pub fn lines(start_line: usize, end_line: usize) -> Self {
        Self::Line {
            start_line,
            end_line,
        }
    }

    /// Reference with its fragment removed; `None` for non-reference locators.
    pub fn reference_key(&self) -> Option<&str> {
        match self {
            Locator::Ref { href } => Some(strip_fragment(href)),
            _ => None,
        }
    }

    fn same_kind(&self, other: &Locator) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Strip `#fragment` from an href.
pub fn strip_fragment(href: &str) -> &str {
    match href.find('#') {
        Some(pos) => &href[..pos],
        None => href,
    }
}

/// One addressable unit of content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub label: String,
    pub locator: Locator,
    pub level: u8,
}

impl Chapter {
    /// Create a chapter, trimming the label and clamping `level` into `1..=3`.
    pub fn new(label: impl AsRef<str>, locator: Locator, level: usize) -> Self {
        Self {
            label: label.as_ref().trim().to_string(),
            locator,
            level: clamp_level(level),
        }
    }
}

pub fn clamp_level(level: usize) -> u8 {
    level.clamp(MIN_LEVEL as usize, MAX_LEVEL as usize) as u8
}

/// The open book
#[derive(Clone, Debug)]
pub struct Document {
    pub format: DocumentFormat,
    pub title: String,
    chapters: Vec<Chapter>,
    /// Spine items, pages or lines depending on `format`
    pub total_units: usize,
}

impl Document {
    /// Assemble a document from builder output.
    ///
    /// Empty labels get a positional placeholder, a chapter repeating the
    /// locator and level of any earlier one is dropped, and an empty list is
    /// replaced by one
    /// synthetic chapter spanning the whole document.
    pub fn new(
        format: DocumentFormat,
        title: impl Into<String>,
        chapters: Vec<Chapter>,
        total_units: usize,
    ) -> Self {
        let title = title.into();
        let mut normalized: Vec<Chapter> = Vec::with_capacity(chapters.len());
        for mut chapter in chapters {
            if normalized
                .iter()
                .any(|c| c.level == chapter.level && c.locator == chapter.locator)
            {
                continue;
            }
            if chapter.label.is_empty() {
                chapter.label = format!("Section {}", normalized.len() + 1);
            }
            normalized.push(chapter);
        }

        if normalized.is_empty() {
            normalized.push(Self::whole_document(format, &title, total_units));
        }

        Self {
            format,
            title,
            chapters: normalized,
            total_units,
        }
    }

    fn whole_document(format: DocumentFormat, title: &str, total_units: usize) -> Chapter {
        let locator = match format {
            DocumentFormat::Package => Locator::href(""),
            DocumentFormat::Paged => Locator::page(0),
            DocumentFormat::Text => Locator::lines(0, total_units),
        };
        let label = if title.trim().is_empty() {
            "Document"
        } else {
            title
        };
        Chapter::new(label, locator, 1)
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Check that chapters appear in document order.
    ///
    /// Pages ascend, and within a page anchors descend (page space grows
    /// upward). Line ranges strictly ascend. References carry no intrinsic
    /// order, so only uniqueness of `(href, level)` is checked.
    pub fn is_in_document_order(&self) -> bool {
        self.chapters.windows(2).all(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            match (&a.locator, &b.locator) {
                (
                    Locator::Page {
                        page_index: pa,
                        y_offset: ya,
                    },
                    Locator::Page {
                        page_index: pb,
                        y_offset: yb,
                    },
                ) => pa < pb || (pa == pb && anchor_height(*ya) >= anchor_height(*yb)),
                (Locator::Line { start_line: sa, .. }, Locator::Line { start_line: sb, .. }) => {
                    sa < sb
                }
                (Locator::Ref { .. }, Locator::Ref { .. }) => {
                    !(a.locator == b.locator && a.level == b.level)
                }
                _ => false,
            }
        })
    }
}

/// Missing anchors mean "top of page", which sorts above any explicit one.
pub(crate) fn anchor_height(y: Option<f32>) -> f32 {
    y.unwrap_or(f32::INFINITY)
}

/// Resolve a locator to the index of the chapter that contains it.
///
/// References match on the exact href first, then on the href without its
/// fragment, then by path suffix (packages often mix relative and rooted
/// paths). Pages and lines map to the last chapter starting at or before the
/// position. Returns `None` when the locator kind does not belong to this
/// document or nothing matches.
pub fn index_for_locator(doc: &Document, locator: &Locator) -> Option<usize> {
    let chapters = doc.chapters();
    if !chapters.iter().any(|c| c.locator.same_kind(locator)) {
        return None;
    }

    match locator {
        Locator::Ref { href } => {
            if let Some(idx) = chapters.iter().position(|c| &c.locator == locator) {
                return Some(idx);
            }
            let key = strip_fragment(href);
            if key.is_empty() {
                return None;
            }
            if let Some(idx) = chapters
                .iter()
                .position(|c| c.locator.reference_key() == Some(key))
            {
                return Some(idx);
            }
            chapters.iter().position(|c| {
                c.locator.reference_key().is_some_and(|candidate| {
                    !candidate.is_empty()
                        && (is_path_suffix(candidate, key) || is_path_suffix(key, candidate))
                })
            })
        }
        Locator::Page {
            page_index,
            y_offset,
        } => {
            let mut found = None;
            for (idx, chapter) in chapters.iter().enumerate() {
                if let Locator::Page {
                    page_index: start,
                    y_offset: anchor,
                } = &chapter.locator
                {
                    let starts_before = *start < *page_index
                        || (*start == *page_index
                            && anchor_height(*anchor) >= anchor_height(*y_offset));
                    if starts_before {
                        found = Some(idx);
                    }
                }
            }
            found.or(Some(0))
        }
        Locator::Line { start_line, .. } => {
            let mut found = None;
            for (idx, chapter) in chapters.iter().enumerate() {
                if let Locator::Line {
                    start_line: start, ..
                } = &chapter.locator
                {
                    if start <= start_line {
                        found = Some(idx);
                    }
                }
            }
            found.or(Some(0))
        }
    }
}

/// `suffix` ends `path` on a path segment boundary.
fn is_path_suffix(path: &str, suffix: &str) -> bool {
    path.strip_suffix(suffix)
        .is_some_and(|head| head.is_empty() || head.ends_with('/'))
}
