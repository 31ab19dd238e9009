pub mod test_helpers {
    use std::cell::RefCell;
    use std::fs;
    use std::io::{Cursor, Write};
    use std::path::Path;
    use std::rc::Rc;

    use serde_json::Value;
    use zip::write::FileOptions;

    use crate::error::Result;
    use crate::model::{Chapter, Locator};
    use crate::observer::{ReaderEvent, ReaderObserver};
    use crate::persistence::{MemoryStore, ProgressStore};
    use crate::progress::ReadingProgress;
    use crate::render::{SeekAdapter, SeekOutcome, Viewport};
    use crate::session::SessionParts;
    use crate::typography::TypographyPrefs;

    /// One chapter of a generated EPUB: file name under `OEBPS/text/`,
    /// navigation title (None leaves it out of the NCX) and nested entries.
    #[derive(Clone, Debug)]
    pub struct EpubChapter {
        pub file: String,
        pub title: Option<String>,
        pub children: Vec<(String, String)>,
    }

    impl EpubChapter {
        pub fn new(file: &str, title: &str) -> Self {
            Self {
                file: file.to_string(),
                title: Some(title.to_string()),
                children: Vec::new(),
            }
        }

        pub fn untitled(file: &str) -> Self {
            Self {
                file: file.to_string(),
                title: None,
                children: Vec::new(),
            }
        }

        /// Nested NCX entry pointing at `#fragment` inside this chapter
        pub fn with_section(mut self, fragment: &str, title: &str) -> Self {
            self.children.push((fragment.to_string(), title.to_string()));
            self
        }
    }

    /// Files of a minimal EPUB 2 package, `mimetype` first.
    pub fn epub_files(title: &str, chapters: &[EpubChapter]) -> Vec<(String, String)> {
        let mut files = vec![
            ("mimetype".to_string(), "application/epub+zip".to_string()),
            (
                "META-INF/container.xml".to_string(),
                r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#
                    .to_string(),
            ),
        ];

        let mut manifest = String::from(
            r#"    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
"#,
        );
        let mut spine = String::new();
        let mut nav_points = String::new();
        let mut play_order = 1;

        for (idx, chapter) in chapters.iter().enumerate() {
            let id = format!("chap{}", idx + 1);
            manifest.push_str(&format!(
                "    <item id=\"{id}\" href=\"text/{}\" media-type=\"application/xhtml+xml\"/>\n",
                chapter.file
            ));
            spine.push_str(&format!("    <itemref idref=\"{id}\"/>\n"));

            let mut body = String::new();
            if let Some(title) = &chapter.title {
                body.push_str(&format!("<h1>{title}</h1>\n"));
                nav_points.push_str(&format!(
                    "    <navPoint id=\"np{play_order}\" playOrder=\"{play_order}\">\n      <navLabel><text>{title}</text></navLabel>\n      <content src=\"text/{}\"/>\n",
                    chapter.file
                ));
                play_order += 1;
                for (fragment, section) in &chapter.children {
                    nav_points.push_str(&format!(
                        "      <navPoint id=\"np{play_order}\" playOrder=\"{play_order}\">\n        <navLabel><text>{section}</text></navLabel>\n        <content src=\"text/{}#{fragment}\"/>\n      </navPoint>\n",
                        chapter.file
                    ));
                    play_order += 1;
                }
                nav_points.push_str("    </navPoint>\n");
            }
            for (fragment, section) in &chapter.children {
                body.push_str(&format!("<h2 id=\"{fragment}\">{section}</h2>\n"));
            }
            body.push_str("<p>Lorem ipsum dolor sit amet.</p>\n");
            files.push((
                format!("OEBPS/text/{}", chapter.file),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{}</title></head>
<body>
{body}</body>
</html>"#,
                    chapter.title.as_deref().unwrap_or("")
                ),
            ));
        }

        files.push((
            "OEBPS/content.opf".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>
    <dc:identifier id="bookid">urn:uuid:00000000-0000-0000-0000-000000000001</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>"#
            ),
        ));
        files.push((
            "OEBPS/toc.ncx".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:00000000-0000-0000-0000-000000000001"/></head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{nav_points}  </navMap>
</ncx>"#
            ),
        ));
        files
    }

    /// Zip `files` into an EPUB, storing `mimetype` uncompressed.
    pub fn epub_bytes(files: &[(String, String)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let deflated =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in files {
            let options = if name == "mimetype" { stored } else { deflated };
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Three chapters; the second has two titled sections.
    pub fn sample_epub() -> Vec<u8> {
        epub_bytes(&epub_files("Sample Book", &sample_chapters()))
    }

    pub fn sample_chapters() -> Vec<EpubChapter> {
        vec![
            EpubChapter::new("ch1.xhtml", "Chapter 1"),
            EpubChapter::new("ch2.xhtml", "Chapter 2")
                .with_section("s1", "Section 2.1")
                .with_section("s2", "Section 2.2"),
            EpubChapter::new("ch3.xhtml", "Chapter 3"),
        ]
    }

    /// Write `files` as an exploded EPUB directory.
    pub fn write_exploded_epub(dir: &Path, files: &[(String, String)]) {
        for (name, content) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
    }

    /// Destination of a generated outline entry
    #[derive(Clone, Debug)]
    pub enum FixtureDest {
        /// Zero-based page and optional `/XYZ` top
        Page(usize, Option<f32>),
        /// Looked up in the catalog `/Dests` dictionary
        Named(String),
        None,
    }

    #[derive(Clone, Debug)]
    pub struct FixtureOutline {
        pub title: String,
        pub dest: FixtureDest,
        pub children: Vec<FixtureOutline>,
    }

    impl FixtureOutline {
        pub fn page(title: &str, page: usize, top: Option<f32>) -> Self {
            Self {
                title: title.to_string(),
                dest: FixtureDest::Page(page, top),
                children: Vec::new(),
            }
        }

        pub fn named(title: &str, name: &str) -> Self {
            Self {
                title: title.to_string(),
                dest: FixtureDest::Named(name.to_string()),
                children: Vec::new(),
            }
        }

        pub fn dangling(title: &str) -> Self {
            Self {
                title: title.to_string(),
                dest: FixtureDest::None,
                children: Vec::new(),
            }
        }

        pub fn with_children(mut self, children: Vec<FixtureOutline>) -> Self {
            self.children = children;
            self
        }
    }

    /// Build a PDF with `page_count` empty pages, an outline and optional
    /// named destinations (`name -> zero-based page`).
    #[cfg(feature = "pdf")]
    pub fn pdf_bytes(
        title: Option<&str>,
        page_count: usize,
        outline: &[FixtureOutline],
        named: &[(&str, usize)],
    ) -> Vec<u8> {
        use lopdf::{Dictionary, Document, Object, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_ids: Vec<_> = (0..page_count)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                })
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
                "Count" => page_count as i64,
            }),
        );

        let explicit = |page: usize, top: Option<f32>| -> Object {
            let page_ref = Object::Reference(page_ids[page]);
            match top {
                Some(top) => Object::Array(vec![
                    page_ref,
                    "XYZ".into(),
                    0.into(),
                    Object::Real(top.into()),
                    Object::Null,
                ]),
                None => Object::Array(vec![page_ref, "Fit".into()]),
            }
        };

        fn add_items(
            doc: &mut Document,
            parent: lopdf::ObjectId,
            items: &[FixtureOutline],
            explicit: &dyn Fn(usize, Option<f32>) -> Object,
        ) -> Option<(lopdf::ObjectId, lopdf::ObjectId)> {
            let ids: Vec<_> = items.iter().map(|_| doc.new_object_id()).collect();
            for (idx, item) in items.iter().enumerate() {
                let mut dict = Dictionary::new();
                dict.set("Title", Object::string_literal(item.title.as_str()));
                dict.set("Parent", parent);
                if idx > 0 {
                    dict.set("Prev", ids[idx - 1]);
                }
                if idx + 1 < ids.len() {
                    dict.set("Next", ids[idx + 1]);
                }
                match &item.dest {
                    FixtureDest::Page(page, top) => dict.set("Dest", explicit(*page, *top)),
                    FixtureDest::Named(name) => {
                        dict.set("Dest", Object::Name(name.as_bytes().to_vec()))
                    }
                    FixtureDest::None => {}
                }
                if let Some((first, last)) = add_items(doc, ids[idx], &item.children, explicit) {
                    dict.set("First", first);
                    dict.set("Last", last);
                    dict.set("Count", item.children.len() as i64);
                }
                doc.objects.insert(ids[idx], Object::Dictionary(dict));
            }
            Some((*ids.first()?, *ids.last()?))
        }

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };

        if !outline.is_empty() {
            let outlines_id = doc.new_object_id();
            let mut outlines = dictionary! { "Type" => "Outlines" };
            if let Some((first, last)) = add_items(&mut doc, outlines_id, outline, &explicit) {
                outlines.set("First", first);
                outlines.set("Last", last);
                outlines.set("Count", outline.len() as i64);
            }
            doc.objects.insert(outlines_id, Object::Dictionary(outlines));
            catalog.set("Outlines", outlines_id);
        }

        if !named.is_empty() {
            let mut dests = Dictionary::new();
            for (name, page) in named {
                dests.set(*name, explicit(*page, None));
            }
            catalog.set("Dests", Object::Dictionary(dests));
        }

        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);
        if let Some(title) = title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title),
            });
            doc.trailer.set("Info", info_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// Plain text with front matter and three numbered chapters.
    pub fn sample_text() -> String {
        [
            "A Short Novel",
            "by Someone",
            "",
            "Chapter 1 The Start",
            "It was a quiet morning.",
            "Nothing happened.",
            "",
            "Chapter 2 The Middle",
            "Something happened.",
            "",
            "Chapter 3 The End",
            "Everything was fine again.",
        ]
        .join("\n")
    }

    #[derive(Debug)]
    pub struct ViewportState {
        pub offset: f64,
        pub extent: f64,
        /// Extent after the next layout pass
        pub pending_extent: Option<f64>,
        pub applied: Vec<TypographyPrefs>,
        content_area: f64,
    }

    /// Scroll container whose extent depends on line height and column
    /// width. Typography changes take effect on [`FakeViewport::finish_layout`].
    ///
    /// Clones share state, so a test can keep a handle after boxing one into
    /// a session.
    #[derive(Clone, Debug)]
    pub struct FakeViewport {
        state: Rc<RefCell<ViewportState>>,
    }

    impl FakeViewport {
        /// `content_area` is text area in px²; extent = area * line_height / width.
        pub fn new(content_area: f64) -> Self {
            let extent = Self::extent_for(content_area, &TypographyPrefs::default());
            Self {
                state: Rc::new(RefCell::new(ViewportState {
                    offset: 0.0,
                    extent,
                    pending_extent: None,
                    applied: Vec::new(),
                    content_area,
                })),
            }
        }

        fn extent_for(content_area: f64, prefs: &TypographyPrefs) -> f64 {
            content_area * prefs.line_height / prefs.page_width
        }

        pub fn offset(&self) -> f64 {
            self.state.borrow().offset
        }

        pub fn extent(&self) -> f64 {
            self.state.borrow().extent
        }

        /// Scroll as a user would
        pub fn user_scroll(&self, offset: f64) {
            let mut state = self.state.borrow_mut();
            state.offset = offset.clamp(0.0, state.extent.max(0.0));
        }

        /// Run the pending layout pass; the offset stays in pixels, so the
        /// reading percentage drifts until the session re-anchors.
        pub fn finish_layout(&self) -> bool {
            let mut state = self.state.borrow_mut();
            match state.pending_extent.take() {
                Some(extent) => {
                    state.extent = extent;
                    state.offset = state.offset.clamp(0.0, extent.max(0.0));
                    true
                }
                None => false,
            }
        }

        pub fn applied(&self) -> Vec<TypographyPrefs> {
            self.state.borrow().applied.clone()
        }
    }

    impl Viewport for FakeViewport {
        fn scroll_offset(&self) -> f64 {
            self.state.borrow().offset
        }

        fn scrollable_extent(&self) -> f64 {
            self.state.borrow().extent
        }

        fn scroll_to(&mut self, offset: f64) {
            self.user_scroll(offset);
        }

        fn apply_typography(&mut self, prefs: &TypographyPrefs) {
            let mut state = self.state.borrow_mut();
            let extent = Self::extent_for(state.content_area, prefs);
            state.pending_extent = Some(extent);
            state.applied.push(*prefs);
        }
    }

    /// Seek adapter that records every request and answers with a fixed
    /// outcome.
    #[derive(Clone, Debug)]
    pub struct ScriptedAdapter {
        seeks: Rc<RefCell<Vec<Locator>>>,
        outcome: SeekOutcome,
    }

    impl ScriptedAdapter {
        pub fn pending() -> Self {
            Self {
                seeks: Rc::default(),
                outcome: SeekOutcome::Pending,
            }
        }

        pub fn settled() -> Self {
            Self {
                seeks: Rc::default(),
                outcome: SeekOutcome::Settled,
            }
        }

        pub fn seeks(&self) -> Vec<Locator> {
            self.seeks.borrow().clone()
        }
    }

    impl SeekAdapter for ScriptedAdapter {
        fn seek(&mut self, locator: &Locator) -> SeekOutcome {
            self.seeks.borrow_mut().push(locator.clone());
            self.outcome
        }
    }

    /// Observer that keeps an owned copy of every notification.
    #[derive(Clone, Debug, Default)]
    pub struct RecordingObserver {
        events: Rc<RefCell<Vec<ReaderEvent>>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ReaderEvent> {
            self.events.borrow().clone()
        }

        pub fn take(&self) -> Vec<ReaderEvent> {
            std::mem::take(&mut *self.events.borrow_mut())
        }

        /// Indices from `ActiveChapterChanged`, in order
        pub fn chapter_changes(&self) -> Vec<usize> {
            self.events
                .borrow()
                .iter()
                .filter_map(|e| match e {
                    ReaderEvent::ActiveChapterChanged { index, .. } => Some(*index),
                    _ => None,
                })
                .collect()
        }

        pub fn last_availability(&self) -> Option<(bool, bool)> {
            self.events.borrow().iter().rev().find_map(|e| match e {
                ReaderEvent::AvailabilityChanged { has_prev, has_next } => {
                    Some((*has_prev, *has_next))
                }
                _ => None,
            })
        }

        pub fn saves(&self) -> Vec<(f64, bool)> {
            self.events
                .borrow()
                .iter()
                .filter_map(|e| match e {
                    ReaderEvent::ProgressSaved { percentage, ok } => Some((*percentage, *ok)),
                    _ => None,
                })
                .collect()
        }
    }

    impl ReaderObserver for RecordingObserver {
        fn active_chapter_changed(&mut self, index: usize, chapter: &Chapter) {
            self.events.borrow_mut().push(ReaderEvent::ActiveChapterChanged {
                index,
                label: chapter.label.clone(),
            });
        }

        fn availability_changed(&mut self, has_prev: bool, has_next: bool) {
            self.events
                .borrow_mut()
                .push(ReaderEvent::AvailabilityChanged { has_prev, has_next });
        }

        fn progress_saved(&mut self, progress: &ReadingProgress, ok: bool) {
            self.events.borrow_mut().push(ReaderEvent::ProgressSaved {
                percentage: progress.percentage,
                ok,
            });
        }

        fn document_failed(&mut self, error: &crate::error::ReaderError) {
            self.events
                .borrow_mut()
                .push(ReaderEvent::DocumentFailed(error.to_string()));
        }
    }

    /// Memory store that outlives the session it is handed to.
    #[derive(Clone, Debug, Default)]
    pub struct SharedStore {
        inner: Rc<RefCell<MemoryStore>>,
    }

    impl SharedStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.inner.borrow_mut().fail_writes = failing;
        }

        pub fn writes(&self) -> usize {
            self.inner.borrow().writes
        }

        pub fn get(&self, key: &str) -> Option<Value> {
            self.inner.borrow().load(key)
        }
    }

    impl ProgressStore for SharedStore {
        fn save(&mut self, key: &str, value: &Value) -> Result<()> {
            self.inner.borrow_mut().save(key, value)
        }

        fn load(&self, key: &str) -> Option<Value> {
            self.inner.borrow().load(key)
        }

        fn remove(&mut self, key: &str) -> Result<()> {
            self.inner.borrow_mut().remove(key)
        }
    }

    /// Session collaborators built from shared test handles
    pub fn session_parts(
        adapter: Option<ScriptedAdapter>,
        viewport: &FakeViewport,
        store: &SharedStore,
        observer: &RecordingObserver,
    ) -> SessionParts {
        SessionParts {
            adapter: adapter.map(|a| Box::new(a) as Box<dyn SeekAdapter>),
            viewport: Box::new(viewport.clone()),
            store: Box::new(store.clone()),
            observers: vec![Box::new(observer.clone())],
        }
    }
}
