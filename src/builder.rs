//! Format dispatch: raw bytes in, canonical document out.

use log::{error, info};

use crate::epub::{EpubContainer, build_package_document};
use crate::error::Result;
use crate::model::{Document, DocumentFormat};
use crate::settings::Settings;
use crate::text::{build_text_book, decode_text};

/// A built document plus anything the session needs to display it
#[derive(Clone, Debug)]
pub struct LoadedDocument {
    pub document: Document,
    /// Chapter bodies for plain text, parallel to the chapters; empty for
    /// formats with an external renderer
    pub text_bodies: Vec<String>,
}

/// Build the chapter model for `raw`.
///
/// `name` is the file name, used as title when the document has none.
/// Fails only when the document cannot be opened at all.
pub fn build_document(
    format: DocumentFormat,
    raw: Vec<u8>,
    name: &str,
    settings: &Settings,
) -> Result<LoadedDocument> {
    let loaded = match format {
        DocumentFormat::Package => {
            let container = EpubContainer::from_bytes(raw)?;
            LoadedDocument {
                document: build_package_document(
                    &container,
                    name,
                    &settings.package_fallback_label,
                ),
                text_bodies: Vec::new(),
            }
        }
        DocumentFormat::Paged => LoadedDocument {
            document: build_paged(&raw, name, settings)?,
            text_bodies: Vec::new(),
        },
        DocumentFormat::Text => {
            let decoded = decode_text(&raw, &settings.fallback_encoding);
            let book = build_text_book(&decoded.text, name, &settings.front_matter_label);
            LoadedDocument {
                document: book.document,
                text_bodies: book.bodies,
            }
        }
    };

    info!(
        "Built {} document '{}' with {} chapters over {} units",
        format.as_str(),
        loaded.document.title,
        loaded.document.len(),
        loaded.document.total_units
    );
    Ok(loaded)
}

#[cfg(feature = "pdf")]
fn build_paged(raw: &[u8], name: &str, settings: &Settings) -> Result<Document> {
    use crate::pdf::{PdfOutline, build_paged_document};

    let source = PdfOutline::from_bytes(raw)?;
    let title = source.title().unwrap_or(name).to_string();
    Ok(build_paged_document(&source, &title, &settings.page_label))
}

#[cfg(not(feature = "pdf"))]
fn build_paged(_raw: &[u8], name: &str, _settings: &Settings) -> Result<Document> {
    error!("Cannot open '{name}': built without PDF support");
    Err(crate::error::ReaderError::UnsupportedFormat(
        "paged documents require the `pdf` feature".to_string(),
    ))
}

/// Same as [`build_document`], but logs a fatal error before returning it.
pub fn build_document_logged(
    format: DocumentFormat,
    raw: Vec<u8>,
    name: &str,
    settings: &Settings,
) -> Result<LoadedDocument> {
    build_document(format, raw, name, settings).inspect_err(|e| {
        if e.is_fatal() {
            error!("Could not open '{name}': {e}");
        }
    })
}
