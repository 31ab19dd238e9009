//! Outline extraction from PDF files via `lopdf`.

use std::collections::HashSet;

use log::{debug, info};
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId};

use super::{Destination, ExplicitDest, OutlineItem, OutlineSource, PageRef};
use crate::error::{ReaderError, Result};

/// Name trees deeper than this are treated as malformed.
const MAX_NAME_TREE_DEPTH: usize = 32;

/// Parsed PDF: page objects in order plus the raw outline tree.
pub struct PdfOutline {
    doc: PdfDocument,
    pages: Vec<ObjectId>,
    items: Vec<OutlineItem>,
    title: Option<String>,
}

impl PdfOutline {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = PdfDocument::load_mem(bytes)
            .map_err(|e| ReaderError::corrupt(format!("invalid PDF: {e}")))?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(ReaderError::corrupt("PDF is encrypted"));
        }

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(ReaderError::corrupt("PDF has no pages"));
        }

        let items = match catalog(&doc).and_then(|c| c.get(b"Outlines").ok()) {
            Some(outlines) => {
                let mut visited = HashSet::new();
                deref(&doc, outlines)
                    .and_then(|o| o.as_dict().ok())
                    .and_then(|o| o.get(b"First").ok())
                    .map(|first| read_siblings(&doc, first, &mut visited))
                    .unwrap_or_default()
            }
            None => {
                debug!("PDF has no outline");
                Vec::new()
            }
        };

        let title = info_title(&doc);
        info!(
            "Opened PDF: {} pages, {} top-level outline entries",
            pages.len(),
            items.len()
        );

        Ok(Self {
            doc,
            pages,
            items,
            title,
        })
    }

    /// `/Title` from the document information dictionary
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn resolve_explicit(&self, dest: &ExplicitDest) -> Result<(usize, Option<f32>)> {
        let page = match dest.page {
            PageRef::Index(idx) => idx,
            PageRef::Object(num, generation) => self
                .pages
                .iter()
                .position(|id| *id == (num, generation))
                .ok_or_else(|| {
                    ReaderError::outline("", format!("object {num} {generation} R is not a page"))
                })?,
        };
        Ok((page, dest.top))
    }

    fn lookup_named(&self, name: &str) -> Option<Destination> {
        let catalog = catalog(&self.doc)?;

        // PDF 1.1 style: /Dests dictionary in the catalog
        if let Some(dests) = catalog
            .get(b"Dests")
            .ok()
            .and_then(|d| deref(&self.doc, d))
            .and_then(|d| d.as_dict().ok())
        {
            if let Ok(value) = dests.get(name.as_bytes()) {
                if let Some(dest) = parse_dest(&self.doc, value) {
                    return Some(dest);
                }
            }
        }

        // PDF 1.2+: /Names -> /Dests name tree
        let tree = catalog
            .get(b"Names")
            .ok()
            .and_then(|n| deref(&self.doc, n))
            .and_then(|n| n.as_dict().ok())?
            .get(b"Dests")
            .ok()?;
        let value = search_name_tree(&self.doc, tree, name.as_bytes(), 0)?;
        parse_dest(&self.doc, value)
    }
}

impl OutlineSource for PdfOutline {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn outline(&self) -> &[OutlineItem] {
        &self.items
    }

    fn resolve(&self, dest: &Destination) -> Result<(usize, Option<f32>)> {
        match dest {
            Destination::Explicit(explicit) => self.resolve_explicit(explicit),
            Destination::Named(name) => match self.lookup_named(name) {
                Some(Destination::Explicit(explicit)) => self.resolve_explicit(&explicit),
                Some(Destination::Named(other)) => Err(ReaderError::outline(
                    "",
                    format!("named destination '{name}' points at another name '{other}'"),
                )),
                None => Err(ReaderError::outline(
                    "",
                    format!("named destination '{name}' not found"),
                )),
            },
        }
    }
}

fn catalog(doc: &PdfDocument) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    deref(doc, root)?.as_dict().ok()
}

/// Follow at most one indirect reference.
fn deref<'a>(doc: &'a PdfDocument, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn read_siblings(
    doc: &PdfDocument,
    first: &Object,
    visited: &mut HashSet<ObjectId>,
) -> Vec<OutlineItem> {
    let mut items = Vec::new();
    let mut cursor = first.as_reference().ok();

    while let Some(id) = cursor {
        if !visited.insert(id) {
            debug!("Outline cycle at object {id:?}, stopping");
            break;
        }
        let Some(dict) = doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) else {
            break;
        };

        let title = dict
            .get(b"Title")
            .ok()
            .and_then(|t| deref(doc, t))
            .and_then(string_bytes)
            .map(decode_text_string)
            .unwrap_or_default();
        let dest = item_destination(doc, dict);
        let children = dict
            .get(b"First")
            .ok()
            .map(|child| read_siblings(doc, child, visited))
            .unwrap_or_default();

        items.push(OutlineItem {
            title,
            dest,
            children,
        });
        cursor = dict.get(b"Next").ok().and_then(|n| n.as_reference().ok());
    }

    items
}

fn item_destination(doc: &PdfDocument, item: &Dictionary) -> Option<Destination> {
    if let Ok(dest) = item.get(b"Dest") {
        return parse_dest(doc, dest);
    }
    let action = item.get(b"A").ok().and_then(|a| deref(doc, a))?.as_dict().ok()?;
    match action.get(b"S").ok().and_then(|s| s.as_name().ok()) {
        Some(b"GoTo") => parse_dest(doc, action.get(b"D").ok()?),
        _ => None,
    }
}

fn parse_dest(doc: &PdfDocument, raw: &Object) -> Option<Destination> {
    match deref(doc, raw)? {
        Object::Array(parts) => parse_explicit(parts).map(Destination::Explicit),
        Object::Name(name) => Some(Destination::Named(
            String::from_utf8_lossy(name).into_owned(),
        )),
        Object::String(bytes, _) => Some(Destination::Named(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        // Named destination values may be wrapped as << /D [...] >>
        Object::Dictionary(dict) => match deref(doc, dict.get(b"D").ok()?)? {
            Object::Array(parts) => parse_explicit(parts).map(Destination::Explicit),
            _ => None,
        },
        _ => None,
    }
}

fn parse_explicit(parts: &[Object]) -> Option<ExplicitDest> {
    let page = match parts.first()? {
        Object::Reference((num, generation)) => PageRef::Object(*num, *generation),
        Object::Integer(idx) if *idx >= 0 => PageRef::Index(*idx as usize),
        _ => return None,
    };
    let kind = parts.get(1).and_then(|k| k.as_name().ok()).unwrap_or(&b"Fit"[..]);
    let top_index = match kind {
        b"XYZ" => Some(3),
        b"FitH" | b"FitBH" => Some(2),
        b"FitR" => Some(5),
        _ => None,
    };
    let top = top_index.and_then(|idx| number(parts.get(idx)?));
    Some(ExplicitDest { page, top })
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn string_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::String(bytes, _) => Some(bytes),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise single-byte.
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn search_name_tree<'a>(
    doc: &'a PdfDocument,
    node: &'a Object,
    key: &[u8],
    depth: usize,
) -> Option<&'a Object> {
    if depth > MAX_NAME_TREE_DEPTH {
        return None;
    }
    let dict = deref(doc, node)?.as_dict().ok()?;

    if let Ok(names) = dict.get(b"Names").and_then(Object::as_array) {
        for pair in names.chunks(2) {
            if let [name, value] = pair {
                if deref(doc, name).and_then(string_bytes) == Some(key) {
                    return Some(value);
                }
            }
        }
    }

    if let Ok(kids) = dict.get(b"Kids").and_then(Object::as_array) {
        for kid in kids {
            if let Some(found) = search_name_tree(doc, kid, key, depth + 1) {
                return Some(found);
            }
        }
    }
    None
}

fn info_title(doc: &PdfDocument) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let title = deref(doc, info)?.as_dict().ok()?.get(b"Title").ok()?;
    let text = decode_text_string(string_bytes(deref(doc, title)?)?);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_titles_are_decoded() {
        let bytes = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i', 0x4E, 0x2D];
        assert_eq!(decode_text_string(&bytes), "Hi中");
    }

    #[test]
    fn latin1_titles_are_decoded() {
        assert_eq!(decode_text_string(&[b'C', 0xE9]), "Cé");
    }

    #[test]
    fn explicit_destination_anchors() {
        let xyz = vec![
            Object::Reference((12, 0)),
            Object::Name(b"XYZ".to_vec()),
            Object::Integer(0),
            Object::Real(640.5),
            Object::Null,
        ];
        assert_eq!(
            parse_explicit(&xyz),
            Some(ExplicitDest {
                page: PageRef::Object(12, 0),
                top: Some(640.5)
            })
        );

        let fit = vec![Object::Integer(3), Object::Name(b"Fit".to_vec())];
        assert_eq!(
            parse_explicit(&fit),
            Some(ExplicitDest {
                page: PageRef::Index(3),
                top: None
            })
        );

        let fith_null = vec![
            Object::Integer(1),
            Object::Name(b"FitH".to_vec()),
            Object::Null,
        ];
        assert_eq!(parse_explicit(&fith_null).and_then(|d| d.top), None);
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            PdfOutline::from_bytes(b"%PDF-1.4 nothing here"),
            Err(ReaderError::DocumentCorrupt { .. })
        ));
    }
}
