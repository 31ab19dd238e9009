//! Parsers for EPUB navigation documents (NCX for EPUB2, XHTML nav for EPUB3).

use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;
use roxmltree::{Document, Node, ParsingOptions};

use super::NavEntry;

static NCX_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<navLabel[^>]*>.*?<text[^>]*>([^<]*)</text>.*?</navLabel>\s*<content[^>]*src=["']([^"']*)["']"#,
    )
    .expect("Failed to compile NCX link regex")
});

static HTML_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*href=["']([^"']*)["'][^>]*>(.*?)</a>"#)
        .expect("Failed to compile nav link regex")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Failed to compile tag regex"));

pub struct NavParser;

impl NavParser {
    /// Parse an NCX document into a navigation tree.
    ///
    /// Hrefs are returned exactly as written; resolving them against the
    /// NCX location is the caller's job.
    pub fn parse_ncx(content: &str) -> Vec<NavEntry> {
        match parse_xml(content) {
            Ok(doc) => {
                let Some(nav_map) = doc
                    .descendants()
                    .find(|n| n.is_element() && n.tag_name().name() == "navMap")
                else {
                    debug!("NCX has no navMap");
                    return Vec::new();
                };
                Self::ncx_children(nav_map)
            }
            Err(e) => {
                warn!("NCX is not well-formed XML ({e}), scanning for links instead");
                NCX_LINK
                    .captures_iter(content)
                    .map(|caps| NavEntry::leaf(clean_text(&caps[1]), caps[2].to_string()))
                    .collect()
            }
        }
    }

    fn ncx_children(parent: Node) -> Vec<NavEntry> {
        parent
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "navPoint")
            .filter_map(|point| {
                let title = point
                    .children()
                    .find(|n| n.is_element() && n.tag_name().name() == "navLabel")
                    .and_then(|label| {
                        label
                            .descendants()
                            .find(|n| n.is_element() && n.tag_name().name() == "text")
                    })
                    .map(collect_text)
                    .unwrap_or_default();
                let href = point
                    .children()
                    .find(|n| n.is_element() && n.tag_name().name() == "content")
                    .and_then(|c| c.attribute("src"))?;
                Some(NavEntry {
                    title,
                    href: href.to_string(),
                    children: Self::ncx_children(point),
                })
            })
            .collect()
    }

    /// Parse an EPUB3 navigation document.
    ///
    /// Uses the `<nav epub:type="toc">` element when present, otherwise the
    /// first `<nav>`, otherwise the whole body.
    pub fn parse_nav(content: &str) -> Vec<NavEntry> {
        match parse_xml(content) {
            Ok(doc) => {
                let navs: Vec<Node> = doc
                    .descendants()
                    .filter(|n| n.is_element() && n.tag_name().name() == "nav")
                    .collect();
                let root = navs
                    .iter()
                    .find(|n| {
                        n.attributes()
                            .any(|a| a.name() == "type" && a.value().split_whitespace().any(|t| t == "toc"))
                    })
                    .or_else(|| navs.first())
                    .copied()
                    .unwrap_or_else(|| doc.root_element());
                match root
                    .descendants()
                    .find(|n| n.is_element() && n.tag_name().name() == "ol")
                {
                    Some(list) => Self::list_items(list),
                    None => Vec::new(),
                }
            }
            Err(e) => {
                warn!("Navigation document is not well-formed XML ({e}), scanning for links instead");
                HTML_LINK
                    .captures_iter(content)
                    .map(|caps| NavEntry::leaf(clean_text(&caps[2]), caps[1].to_string()))
                    .filter(|entry| !entry.href.is_empty())
                    .collect()
            }
        }
    }

    fn list_items(list: Node) -> Vec<NavEntry> {
        let mut entries = Vec::new();
        for item in list
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "li")
        {
            let children = item
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "ol")
                .map(Self::list_items)
                .unwrap_or_default();

            let link = item
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "a");
            match link.and_then(|a| a.attribute("href").map(|href| (a, href))) {
                Some((a, href)) => entries.push(NavEntry {
                    title: collect_text(a),
                    href: href.to_string(),
                    children,
                }),
                // Unlinked headings (<span>) only group their children
                None => entries.extend(children),
            }
        }
        entries
    }
}

fn parse_xml(content: &str) -> Result<Document<'_>, roxmltree::Error> {
    Document::parse_with_options(
        content,
        ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        },
    )
}

fn collect_text(node: Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    normalize_whitespace(&text)
}

fn clean_text(raw: &str) -> String {
    let without_tags = TAG.replace_all(raw, "");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    normalize_whitespace(&decoded)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
