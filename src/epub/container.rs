use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use epub::doc::EpubDoc;
use log::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::write::FileOptions;

use super::{NavEntry, NavParser, PackageContainer, SpineEntry};
use crate::error::{ReaderError, Result};

const ENCRYPTION_XML: &str = "META-INF/encryption.xml";
const NCX_MIME: &str = "application/x-dtbncx+xml";

/// Font obfuscation algorithms; these leave text content readable.
const FONT_OBFUSCATION: [&str; 2] = [
    "http://www.idpf.org/2008/embedding",
    "http://ns.adobe.com/pdf/enc#RC",
];

/// An opened EPUB package: spine, navigation tree and metadata title.
///
/// All paths are archive paths (`OEBPS/text/ch1.xhtml`) so spine and
/// navigation hrefs can be compared directly.
#[derive(Clone, Debug)]
pub struct EpubContainer {
    spine: Vec<SpineEntry>,
    navigation: Vec<NavEntry>,
    title: Option<String>,
}

impl EpubContainer {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        {
            let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice()))
                .map_err(|e| ReaderError::corrupt(format!("not a zip archive: {e}")))?;
            reject_encrypted(&mut archive)?;
        }

        let mut doc = EpubDoc::from_reader(Cursor::new(bytes))
            .map_err(|e| ReaderError::corrupt(format!("invalid package: {e}")))?;

        let title = doc.mdata("title").map(|item| item.value.trim().to_string());

        let mut spine = Vec::with_capacity(doc.spine.len());
        for item in &doc.spine {
            match doc.resources.get(&item.idref) {
                Some(resource) => spine.push(SpineEntry::with_id(
                    path_to_href(&resource.path),
                    item.idref.clone(),
                )),
                None => warn!("Spine item '{}' is missing from the manifest", item.idref),
            }
        }
        if spine.is_empty() {
            return Err(ReaderError::corrupt("package has an empty spine"));
        }

        let navigation = Self::load_navigation(&mut doc);
        info!(
            "Opened EPUB '{}': {} spine items, {} top-level navigation entries",
            title.as_deref().unwrap_or(""),
            spine.len(),
            navigation.len()
        );

        Ok(Self {
            spine,
            navigation,
            title,
        })
    }

    /// Zip an exploded EPUB directory in memory and open it.
    ///
    /// `mimetype` goes first and uncompressed; everything else is deflated
    /// in path order.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        info!("Packing exploded EPUB directory: {dir:?}");
        let bytes = zip_directory(dir)?;
        Self::from_bytes(bytes)
    }

    fn load_navigation(doc: &mut EpubDoc<Cursor<Vec<u8>>>) -> Vec<NavEntry> {
        let resources: Vec<(String, String)> = doc
            .resources
            .values()
            .map(|r| (path_to_href(&r.path), r.mime.clone()))
            .collect();

        let ncx = resources
            .iter()
            .find(|(path, mime)| mime == NCX_MIME || path.to_lowercase().ends_with(".ncx"))
            .map(|(path, _)| path.clone());
        if let Some(path) = ncx {
            if let Some(content) = doc.get_resource_str_by_path(&path) {
                let entries = NavParser::parse_ncx(&content);
                if !entries.is_empty() {
                    debug!("Using NCX navigation from {path}");
                    return resolve_tree(entries, &path);
                }
            }
        }

        let nav = resources
            .iter()
            .filter(|(_, mime)| mime.contains("html"))
            .map(|(path, _)| path)
            .find(|path| {
                let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
                name.contains("nav") || name.contains("toc")
            })
            .cloned();
        if let Some(path) = nav {
            if let Some(content) = doc.get_resource_str_by_path(&path) {
                debug!("Using XHTML navigation from {path}");
                return resolve_tree(NavParser::parse_nav(&content), &path);
            }
        }

        warn!("Package has no readable navigation document");
        Vec::new()
    }
}

impl PackageContainer for EpubContainer {
    fn spine(&self) -> &[SpineEntry] {
        &self.spine
    }

    fn navigation(&self) -> &[NavEntry] {
        &self.navigation
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }
}

fn reject_encrypted<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Result<()> {
    let Some(content) = read_entry(archive, ENCRYPTION_XML) else {
        return Ok(());
    };
    let doc = match roxmltree::Document::parse(&content) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Unreadable {ENCRYPTION_XML} ({e}), assuming encrypted content");
            return Err(ReaderError::corrupt("package is encrypted"));
        }
    };
    let encrypted_content = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "EncryptionMethod")
        .filter_map(|n| n.attribute("Algorithm"))
        .any(|alg| !FONT_OBFUSCATION.contains(&alg));
    if encrypted_content {
        return Err(ReaderError::corrupt("package is encrypted"));
    }
    Ok(())
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn path_to_href(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn resolve_tree(entries: Vec<NavEntry>, nav_path: &str) -> Vec<NavEntry> {
    let base = nav_path.rsplit_once('/').map_or("", |(dir, _)| dir);
    entries
        .into_iter()
        .map(|entry| NavEntry {
            title: entry.title,
            href: resolve_href(base, &entry.href),
            children: resolve_tree(entry.children, nav_path),
        })
        .collect()
}

/// Resolve `href` against the directory `base`, keeping any fragment.
pub(crate) fn resolve_href(base: &str, href: &str) -> String {
    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };
    let path = path.replace("%20", " ");

    let mut parts: Vec<&str> = if path.starts_with('/') {
        Vec::new()
    } else {
        base.split('/').filter(|p| !p.is_empty()).collect()
    };
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let mut resolved = parts.join("/");
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    resolved
}

pub(crate) fn zip_directory(dir: &Path) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let zip_err = |e: zip::result::ZipError| ReaderError::corrupt(format!("zip: {e}"));

    let mimetype_path = dir.join("mimetype");
    if mimetype_path.is_file() {
        let data = std::fs::read(&mimetype_path)?;
        zip.start_file("mimetype", stored).map_err(zip_err)?;
        zip.write_all(&data)?;
    } else {
        info!("Exploded EPUB missing mimetype file: {mimetype_path:?}");
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || entry.file_name() == ".DS_Store" {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        if rel == Path::new("mimetype") {
            continue;
        }
        files.push(rel.to_path_buf());
    }
    files.sort();

    for rel in files {
        let zip_path = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(zip_path, deflated).map_err(zip_err)?;
        let data = std::fs::read(dir.join(&rel))?;
        zip.write_all(&data)?;
    }

    let cursor = zip.finish().map_err(zip_err)?;
    Ok(cursor.into_inner())
}
