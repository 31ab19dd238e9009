//! Document identity and the directory-backed content source.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::epub::container::zip_directory;
use crate::model::DocumentFormat;

/// Stable identity of a stored document: its storage path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentId(PathBuf);

impl DocumentId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Persistence key derived from the storage path.
    /// Format: `reader_<md5_first_12>_<slugified_file_name>`
    pub fn storage_key(&self) -> String {
        let path_str = self.0.to_string_lossy();
        let digest = md5::compute(path_str.as_bytes());
        let hash_prefix = &format!("{digest:x}")[..12];
        format!("reader_{hash_prefix}_{}", slugify(&self.file_name()))
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Supplies the raw bytes of a document.
pub trait ContentSource {
    fn fetch(&self, id: &DocumentId) -> Result<Vec<u8>>;
}

/// Format from the file extension, then from magic bytes, else text.
pub fn detect_format(path: &Path, bytes: &[u8]) -> DocumentFormat {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("epub") => return DocumentFormat::Package,
        Some("pdf") => return DocumentFormat::Paged,
        Some("txt") => return DocumentFormat::Text,
        _ => {}
    }
    if bytes.starts_with(b"PK\x03\x04") {
        DocumentFormat::Package
    } else if bytes.starts_with(b"%PDF") {
        DocumentFormat::Paged
    } else {
        DocumentFormat::Text
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookInfo {
    pub id: DocumentId,
    pub display_name: String,
    pub format: DocumentFormat,
}

/// Books stored under one root directory
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &DocumentId) -> PathBuf {
        if id.path().is_absolute() {
            id.path().to_path_buf()
        } else {
            self.root.join(id.path())
        }
    }

    /// Supported books below the root, sorted by display name.
    /// Exploded `*.epub` directories count as one book.
    pub fn list(&self) -> Result<Vec<BookInfo>> {
        let mut books = Vec::new();
        let mut walker = WalkDir::new(&self.root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.with_context(|| format!("Failed to scan {:?}", self.root))?;
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase);

            let format = match (entry.file_type().is_dir(), ext.as_deref()) {
                (true, Some("epub")) => {
                    walker.skip_current_dir();
                    DocumentFormat::Package
                }
                (false, Some("epub")) => DocumentFormat::Package,
                (false, Some("pdf")) if cfg!(feature = "pdf") => DocumentFormat::Paged,
                (false, Some("txt")) => DocumentFormat::Text,
                _ => continue,
            };

            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            let display_name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            books.push(BookInfo {
                id: DocumentId::new(rel),
                display_name,
                format,
            });
        }

        books.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        });
        info!("Found {} books under {:?}", books.len(), self.root);
        Ok(books)
    }
}

impl ContentSource for DirectoryLibrary {
    fn fetch(&self, id: &DocumentId) -> Result<Vec<u8>> {
        let path = self.resolve(id);
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            anyhow::bail!("Refusing to read outside the library: {path:?}");
        }
        if path.is_dir() {
            debug!("Zipping exploded package {path:?}");
            return zip_directory(&path)
                .with_context(|| format!("Failed to pack exploded EPUB {path:?}"));
        }
        fs::read(&path).with_context(|| format!("Failed to read {path:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn storage_key_is_stable_and_filesystem_safe() {
        let id = DocumentId::new("books/My Book (2nd).epub");
        let key = id.storage_key();
        assert_eq!(key, id.storage_key());
        assert!(key.starts_with("reader_"));
        assert!(key.ends_with("_my_book__2nd__epub"));
        assert!(
            key.chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
        assert_ne!(key, DocumentId::new("other/My Book (2nd).epub").storage_key());
    }

    #[test]
    fn format_detection_prefers_extension_then_magic() {
        assert_eq!(
            detect_format(Path::new("a.pdf"), b"PK\x03\x04"),
            DocumentFormat::Paged
        );
        assert_eq!(
            detect_format(Path::new("blob"), b"PK\x03\x04rest"),
            DocumentFormat::Package
        );
        assert_eq!(
            detect_format(Path::new("blob"), b"%PDF-1.7"),
            DocumentFormat::Paged
        );
        assert_eq!(detect_format(Path::new("README"), b"hello"), DocumentFormat::Text);
    }

    #[test]
    fn lists_supported_books() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "text").unwrap();
        fs::write(dir.path().join("a.epub"), "zip").unwrap();
        fs::write(dir.path().join("notes.md"), "skip").unwrap();
        fs::create_dir_all(dir.path().join("c.epub/OEBPS")).unwrap();
        fs::write(dir.path().join("c.epub/OEBPS/x.xhtml"), "<html/>").unwrap();

        let library = DirectoryLibrary::new(dir.path());
        let names: Vec<_> = library
            .list()
            .unwrap()
            .into_iter()
            .map(|b| b.display_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn fetch_reads_relative_ids() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "hello").unwrap();
        let library = DirectoryLibrary::new(dir.path());
        assert_eq!(library.fetch(&DocumentId::new("b.txt")).unwrap(), b"hello");
        assert!(library.fetch(&DocumentId::new("missing.txt")).is_err());
        assert!(library.fetch(&DocumentId::new("../b.txt")).is_err());
    }
}
