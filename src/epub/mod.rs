//! Structured-package (EPUB) chapter builder

pub mod container;
pub mod nav_parser;

use std::collections::HashMap;

use log::info;

use crate::model::{Chapter, Document, DocumentFormat, Locator, strip_fragment};

pub use container::EpubContainer;
pub use nav_parser::NavParser;

/// One item of the linear reading order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineEntry {
    /// Package-relative path, possibly with a fragment
    pub href: String,
    /// Manifest identifier, used as a label of last resort
    pub id: Option<String>,
}

impl SpineEntry {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            id: None,
        }
    }

    pub fn with_id(href: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            id: Some(id.into()),
        }
    }
}

/// Node of the navigation tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavEntry {
    pub title: String,
    pub href: String,
    pub children: Vec<NavEntry>,
}

impl NavEntry {
    pub fn leaf(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            children: Vec::new(),
        }
    }
}

/// A package as seen by the chapter builder
pub trait PackageContainer {
    fn spine(&self) -> &[SpineEntry];
    /// Navigation tree with hrefs in the same path space as the spine
    fn navigation(&self) -> &[NavEntry];
    fn title(&self) -> Option<&str>;
}

/// Depth-first flatten of the navigation tree into `reference key -> title`,
/// keeping the first title seen for each key.
fn flatten_navigation(entries: &[NavEntry], titles: &mut HashMap<String, String>) {
    for entry in entries {
        let key = strip_fragment(&entry.href);
        let title = entry.title.trim();
        if !key.is_empty() && !title.is_empty() {
            titles
                .entry(key.to_string())
                .or_insert_with(|| title.to_string());
        }
        flatten_navigation(&entry.children, titles);
    }
}

/// Build one chapter per spine item, in spine order.
///
/// Titles come from the navigation tree by fragment-less href; items missing
/// from navigation fall back to their manifest id, then to
/// `"{fallback_label} {n}"`. Navigation entries pointing outside the spine
/// are ignored.
pub fn build_package_document(
    container: &impl PackageContainer,
    fallback_title: &str,
    fallback_label: &str,
) -> Document {
    let mut titles = HashMap::new();
    flatten_navigation(container.navigation(), &mut titles);

    let spine = container.spine();
    let chapters: Vec<Chapter> = spine
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let label = titles
                .get(strip_fragment(&item.href))
                .cloned()
                .or_else(|| item.id.clone().filter(|id| !id.trim().is_empty()))
                .unwrap_or_else(|| format!("{fallback_label} {}", idx + 1));
            Chapter::new(label, Locator::href(item.href.clone()), 1)
        })
        .collect();

    let named = spine
        .iter()
        .filter(|item| titles.contains_key(strip_fragment(&item.href)))
        .count();
    info!(
        "Package: {} spine items, {} titled from navigation, {} navigation keys",
        spine.len(),
        named,
        titles.len()
    );

    let title = container
        .title()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(fallback_title);
    Document::new(DocumentFormat::Package, title, chapters, spine.len())
}

/// In-memory package, mostly useful for tests and for callers that already
/// have spine and navigation data.
#[derive(Clone, Debug, Default)]
pub struct StaticPackage {
    pub spine: Vec<SpineEntry>,
    pub navigation: Vec<NavEntry>,
    pub title: Option<String>,
}

impl PackageContainer for StaticPackage {
    fn spine(&self) -> &[SpineEntry] {
        &self.spine
    }

    fn navigation(&self) -> &[NavEntry] {
        &self.navigation
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(doc: &Document) -> Vec<&str> {
        doc.chapters().iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn spine_order_with_nav_titles() {
        let package = StaticPackage {
            spine: vec![
                SpineEntry::new("a.html"),
                SpineEntry::new("b.html#frag"),
                SpineEntry::new("c.html"),
            ],
            navigation: vec![NavEntry::leaf("One", "a.html"), NavEntry::leaf("Two", "b.html")],
            title: None,
        };
        let doc = build_package_document(&package, "book", "Chapter");
        assert_eq!(labels(&doc), vec!["One", "Two", "Chapter 3"]);
        assert_eq!(doc.chapters()[1].locator, Locator::href("b.html#frag"));
        assert_eq!(doc.total_units, 3);
    }

    #[test]
    fn nested_navigation_keeps_first_title_per_key() {
        let package = StaticPackage {
            spine: vec![SpineEntry::new("a.html"), SpineEntry::new("b.html")],
            navigation: vec![NavEntry {
                title: "Part".into(),
                href: "a.html".into(),
                children: vec![
                    NavEntry::leaf("Section A", "a.html#s1"),
                    NavEntry::leaf("B", "b.html#top"),
                    NavEntry::leaf("B again", "b.html"),
                ],
            }],
            title: Some("Nested".into()),
        };
        let doc = build_package_document(&package, "fallback", "Chapter");
        assert_eq!(labels(&doc), vec!["Part", "B"]);
        assert_eq!(doc.title, "Nested");
    }

    #[test]
    fn orphaned_nav_entries_are_dropped() {
        let package = StaticPackage {
            spine: vec![SpineEntry::with_id("a.html", "item-a")],
            navigation: vec![
                NavEntry::leaf("Missing", "gone.html"),
                NavEntry::leaf("Also missing", "gone2.html"),
            ],
            title: None,
        };
        let doc = build_package_document(&package, "book", "Chapter");
        assert_eq!(labels(&doc), vec!["item-a"]);
    }

    #[test]
    fn navigation_order_does_not_reorder_spine() {
        let package = StaticPackage {
            spine: vec![SpineEntry::new("1.html"), SpineEntry::new("2.html")],
            navigation: vec![NavEntry::leaf("Second", "2.html"), NavEntry::leaf("First", "1.html")],
            title: None,
        };
        let doc = build_package_document(&package, "book", "Chapter");
        assert_eq!(labels(&doc), vec!["First", "Second"]);
    }

    #[test]
    fn empty_spine_yields_single_chapter() {
        let doc = build_package_document(&StaticPackage::default(), "Lonely", "Chapter");
        assert_eq!(doc.len(), 1);
        assert_eq!(labels(&doc), vec!["Lonely"]);
    }
}
