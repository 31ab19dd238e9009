use pagemark::epub::container::EpubContainer;
use pagemark::epub::{PackageContainer, build_package_document};
use pagemark::test_utils::test_helpers::{
    EpubChapter, epub_bytes, epub_files, sample_chapters, sample_epub, write_exploded_epub,
};
use pagemark::{DocumentFormat, Locator, ReaderError, Settings, build_document};
use tempfile::TempDir;

fn labels(doc: &pagemark::Document) -> Vec<String> {
    doc.chapters().iter().map(|c| c.label.clone()).collect()
}

#[test]
fn epub_chapters_follow_the_spine() {
    let container = EpubContainer::from_bytes(sample_epub()).unwrap();
    assert_eq!(container.title(), Some("Sample Book"));
    assert_eq!(container.spine().len(), 3);
    assert!(container.spine()[0].href.ends_with("text/ch1.xhtml"));

    let doc = build_package_document(&container, "sample.epub", "Chapter");
    assert_eq!(doc.format, DocumentFormat::Package);
    assert_eq!(doc.title, "Sample Book");
    assert_eq!(labels(&doc), vec!["Chapter 1", "Chapter 2", "Chapter 3"]);
    assert_eq!(doc.total_units, 3);
    assert!(doc.is_in_document_order());
}

#[test]
fn navigation_hrefs_share_the_spine_path_space() {
    let container = EpubContainer::from_bytes(sample_epub()).unwrap();
    let nav = container.navigation();
    assert_eq!(nav.len(), 3);
    assert_eq!(nav[1].children.len(), 2);
    assert_eq!(
        nav[1].children[0].href,
        format!("{}#s1", container.spine()[1].href)
    );
}

#[test]
fn spine_items_missing_from_navigation_get_fallback_labels() {
    let chapters = vec![
        EpubChapter::untitled("cover.xhtml"),
        EpubChapter::new("one.xhtml", "One"),
        EpubChapter::untitled("two.xhtml"),
    ];
    let bytes = epub_bytes(&epub_files("Gaps", &chapters));
    let loaded = build_document(
        DocumentFormat::Package,
        bytes,
        "gaps.epub",
        &Settings::default(),
    )
    .unwrap();
    // Untitled items fall back to their manifest id
    assert_eq!(labels(&loaded.document), vec!["chap1", "One", "chap3"]);
    assert!(loaded.text_bodies.is_empty());
}

#[test]
fn exploded_directory_opens_like_a_zipped_package() {
    let dir = TempDir::new().unwrap();
    let book = dir.path().join("sample.epub");
    write_exploded_epub(&book, &epub_files("Sample Book", &sample_chapters()));

    let container = EpubContainer::from_directory(&book).unwrap();
    let doc = build_package_document(&container, "sample.epub", "Chapter");
    assert_eq!(labels(&doc), vec!["Chapter 1", "Chapter 2", "Chapter 3"]);
}

#[test]
fn encrypted_package_is_refused() {
    let mut files = epub_files("Locked", &sample_chapters());
    files.push((
        "META-INF/encryption.xml".to_string(),
        r#"<?xml version="1.0"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>
    <enc:CipherData><enc:CipherReference URI="OEBPS/text/ch1.xhtml"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#
            .to_string(),
    ));
    let err = EpubContainer::from_bytes(epub_bytes(&files)).unwrap_err();
    assert!(matches!(err, ReaderError::DocumentCorrupt { .. }));
}

#[test]
fn font_obfuscation_is_not_encryption() {
    let mut files = epub_files("Fonts", &sample_chapters());
    files.push((
        "META-INF/encryption.xml".to_string(),
        r#"<?xml version="1.0"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
    <enc:CipherData><enc:CipherReference URI="OEBPS/fonts/a.otf"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#
            .to_string(),
    ));
    assert!(EpubContainer::from_bytes(epub_bytes(&files)).is_ok());
}

#[test]
fn gbk_text_is_decoded_with_fallback() {
    let source = "序章\n很久以前\n第一章 出发\n他们出发了\n第二章 归来\n他们回来了";
    let (gbk, _, _) = encoding_rs::GBK.encode(source);
    let loaded = build_document(
        DocumentFormat::Text,
        gbk.into_owned(),
        "story.txt",
        &Settings::default(),
    )
    .unwrap();
    assert_eq!(
        labels(&loaded.document),
        vec!["序章", "第一章 出发", "第二章 归来"]
    );
    assert_eq!(loaded.document.chapters()[1].locator, Locator::lines(2, 4));
    assert_eq!(loaded.text_bodies[2], "第二章 归来\n\n他们回来了");
    assert_eq!(loaded.document.total_units, 6);
}

#[test]
fn crlf_text_has_no_stray_carriage_returns() {
    let loaded = build_document(
        DocumentFormat::Text,
        b"Chapter 1\r\nfirst\r\nChapter 2\r\nsecond\r\n".to_vec(),
        "dos.txt",
        &Settings::default(),
    )
    .unwrap();
    assert_eq!(labels(&loaded.document), vec!["Chapter 1", "Chapter 2"]);
    assert!(loaded.text_bodies.iter().all(|b| !b.contains('\r')));
}

#[cfg(feature = "pdf")]
mod pdf {
    use super::labels;
    use pagemark::pdf::{OutlineSource, PdfOutline, build_paged_document};
    use pagemark::test_utils::test_helpers::{FixtureOutline, pdf_bytes};
    use pagemark::{DocumentFormat, Locator, Settings, build_document};

    #[test]
    fn outline_is_flattened_sorted_and_leveled() {
        let outline = vec![
            FixtureOutline::page("Part One", 0, None).with_children(vec![
                FixtureOutline::page("Lower", 2, Some(200.0)),
                FixtureOutline::page("Upper", 2, Some(700.0)),
            ]),
            FixtureOutline::page("Part Two", 4, None),
        ];
        let bytes = pdf_bytes(Some("Manual"), 6, &outline, &[]);
        let loaded =
            build_document(DocumentFormat::Paged, bytes, "manual.pdf", &Settings::default())
                .unwrap();
        let doc = &loaded.document;

        assert_eq!(doc.title, "Manual");
        assert_eq!(doc.total_units, 6);
        assert_eq!(labels(doc), vec!["Part One", "Upper", "Lower", "Part Two"]);
        let levels: Vec<u8> = doc.chapters().iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![1, 2, 2, 1]);
        assert_eq!(
            doc.chapters()[1].locator,
            Locator::Page {
                page_index: 2,
                y_offset: Some(700.0)
            }
        );
        assert!(doc.is_in_document_order());
    }

    #[test]
    fn named_destinations_resolve_and_broken_entries_are_skipped() {
        let outline = vec![
            FixtureOutline::named("Appendix", "appendix"),
            FixtureOutline::named("Missing", "nowhere"),
            FixtureOutline::dangling("No target"),
            FixtureOutline::page("Start", 0, None),
        ];
        let bytes = pdf_bytes(None, 3, &outline, &[("appendix", 2)]);
        let source = PdfOutline::from_bytes(&bytes).unwrap();
        assert_eq!(source.page_count(), 3);
        assert_eq!(source.title(), None);

        let doc = build_paged_document(&source, "fallback.pdf", "Page");
        assert_eq!(labels(&doc), vec!["Start", "Appendix"]);
        assert_eq!(doc.chapters()[1].locator, Locator::page(2));
    }

    #[test]
    fn pdf_without_outline_lists_every_page() {
        let bytes = pdf_bytes(None, 4, &[], &[]);
        let loaded =
            build_document(DocumentFormat::Paged, bytes, "scan.pdf", &Settings::default())
                .unwrap();
        assert_eq!(
            labels(&loaded.document),
            vec!["Page 1", "Page 2", "Page 3", "Page 4"]
        );
        assert_eq!(loaded.document.title, "scan.pdf");
    }
}
