//! Per-document reading session.

use chrono::Utc;
use log::{debug, info, warn};
use std::time::Instant;

use crate::bookmark::{Bookmark, Bookmarks, NewBookmark};
use crate::builder::{LoadedDocument, build_document_logged};
use crate::error::ReaderError;
use crate::library::{ContentSource, DocumentId, detect_format};
use crate::model::{Chapter, Document, DocumentFormat, Locator, index_for_locator};
use crate::navigation::{NavCommand, NavEffect, NavState, NavigationController};
use crate::observer::{Observers, ReaderObserver};
use crate::persistence::{
    LastRead, ProgressStore, bookmarks_key, load_json, load_prefs, load_progress,
    record_last_read, save_json, save_prefs, save_progress,
};
use crate::progress::{ProgressCoordinator, ReadingProgress};
use crate::render::{ImmediateAdapter, SeekAdapter, SeekOutcome, TextRenderer, Viewport};
use crate::settings::Settings;
use crate::typography::TypographyPrefs;

/// Inputs from the host, each delivered with the instant it happened
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The renderer or viewport observer reports a new reading position
    Relocated(Locator),
    /// The viewport scrolled within the current chapter
    Scrolled,
    /// The pending asynchronous seek finished
    SeekSettled,
    /// One scheduler turn; also runs debounce deadlines
    Tick,
    /// Content finished laying out
    RenderSettled,
    PrefsChanged(TypographyPrefs),
}

/// Host-provided collaborators
pub struct SessionParts {
    /// Seek capability for package and paged documents. Plain text always
    /// uses the built-in text renderer.
    pub adapter: Option<Box<dyn SeekAdapter>>,
    pub viewport: Box<dyn Viewport>,
    pub store: Box<dyn ProgressStore>,
    pub observers: Vec<Box<dyn ReaderObserver>>,
}

enum Renderer {
    External(Box<dyn SeekAdapter>),
    Text(TextRenderer),
}

/// Everything belonging to one open document.
pub struct ReaderSession {
    id: DocumentId,
    storage_key: String,
    settings: Settings,
    document: Document,
    nav: NavigationController,
    progress: ProgressCoordinator,
    renderer: Renderer,
    viewport: Box<dyn Viewport>,
    store: Box<dyn ProgressStore>,
    observers: Observers,
    bookmarks: Bookmarks,
}

impl ReaderSession {
    /// Fetch, build and open a document.
    ///
    /// Observers hear about a failure through `document_failed` before the
    /// error is returned.
    pub fn open_from_source(
        source: &dyn ContentSource,
        id: DocumentId,
        settings: Settings,
        parts: SessionParts,
        now: Instant,
    ) -> anyhow::Result<Self> {
        let SessionParts {
            adapter,
            viewport,
            store,
            observers,
        } = parts;
        let mut observers = Observers::new(observers);

        let raw = match source.fetch(&id) {
            Ok(raw) => raw,
            Err(e) => {
                let err = ReaderError::corrupt(format!("could not fetch {id}: {e:#}"));
                observers.document_failed(&err);
                return Err(err.into());
            }
        };
        let format = detect_format(id.path(), &raw);
        match build_document_logged(format, raw, &id.file_name(), &settings) {
            Ok(loaded) => {
                let parts = SessionParts {
                    adapter,
                    viewport,
                    store,
                    observers: observers.into_inner(),
                };
                Ok(Self::open(id, loaded, settings, parts, now))
            }
            Err(e) => {
                observers.document_failed(&e);
                Err(e.into())
            }
        }
    }

    /// Open an already built document.
    ///
    /// Restores typography, resumes at the saved chapter, schedules the
    /// saved percentage and records this document as last read.
    pub fn open(
        id: DocumentId,
        loaded: LoadedDocument,
        settings: Settings,
        parts: SessionParts,
        now: Instant,
    ) -> Self {
        let storage_key = id.storage_key();
        let LoadedDocument {
            document,
            text_bodies,
        } = loaded;

        let renderer = match (document.format, parts.adapter) {
            (DocumentFormat::Text, _) => Renderer::Text(TextRenderer::new(&document, text_bodies)),
            (_, Some(adapter)) => Renderer::External(adapter),
            (format, None) => {
                warn!(
                    "No renderer adapter for {} document, seeks settle immediately",
                    format.as_str()
                );
                Renderer::External(Box::new(ImmediateAdapter))
            }
        };

        let mut store = parts.store;
        let mut viewport = parts.viewport;
        let prefs = load_prefs(store.as_ref(), &storage_key, settings.isolate_book_config);
        viewport.apply_typography(&prefs);

        let saved = load_progress(store.as_ref(), &storage_key);
        let initial = saved
            .as_ref()
            .and_then(|p| {
                let idx = index_for_locator(&document, &p.format_locator);
                if idx.is_none() {
                    debug!("Saved locator {:?} does not match any chapter", p.format_locator);
                }
                idx
            })
            .unwrap_or(0);

        let bookmarks: Bookmarks =
            load_json(store.as_ref(), &bookmarks_key(&storage_key)).unwrap_or_default();

        record_last_read(
            store.as_mut(),
            &LastRead {
                path: id.to_string(),
                storage_key: storage_key.clone(),
                opened_at: Utc::now(),
            },
        );

        info!(
            "Opened session for {id}: {} chapters, resuming at {initial}{}",
            document.len(),
            if saved.is_some() { " (saved progress)" } else { "" }
        );

        let mut session = Self {
            id,
            storage_key,
            nav: NavigationController::new(document.len(), initial),
            progress: ProgressCoordinator::new(
                prefs,
                settings.progress_debounce(),
                settings.prefs_debounce(),
                settings.restore_delay(),
            ),
            settings,
            document,
            renderer,
            viewport,
            store,
            observers: Observers::new(parts.observers),
            bookmarks,
        };

        let effects = session.nav.apply(NavCommand::GoTo(initial));
        session.dispatch(effects);
        if let Some(saved) = saved {
            session.progress.restore(&saved, now);
        }
        session.announce_availability();
        session
    }

    /// Re-send current chapter and availability to observers.
    pub fn announce(&mut self) {
        let effects = self.nav.initial_effects();
        self.dispatch(effects);
    }

    fn announce_availability(&mut self) {
        self.observers
            .availability_changed(self.nav.has_prev(), self.nav.has_next());
    }

    fn dispatch(&mut self, effects: Vec<NavEffect>) {
        for effect in effects {
            match effect {
                NavEffect::ChapterChanged(index) => {
                    if let Some(chapter) = self.document.chapter(index) {
                        self.observers.active_chapter_changed(index, chapter);
                    }
                }
                NavEffect::AvailabilityChanged { has_prev, has_next } => {
                    self.observers.availability_changed(has_prev, has_next);
                }
                NavEffect::Seek(index) => self.seek(index),
            }
        }
    }

    fn seek(&mut self, index: usize) {
        let Some(locator) = self.document.chapter(index).map(|c| c.locator.clone()) else {
            return;
        };
        let outcome = match &mut self.renderer {
            Renderer::External(adapter) => adapter.seek(&locator),
            Renderer::Text(text) => {
                let outcome = text.seek(&locator);
                self.viewport.scroll_to(0.0);
                outcome
            }
        };
        if outcome == SeekOutcome::Settled {
            let _ = self.nav.apply(NavCommand::SeekCompleted { synchronous: true });
        }
    }

    /// Jump to a chapter. Returns false when the jump was rejected (out of
    /// range, or another jump is still in flight).
    pub fn go_to(&mut self, index: usize, now: Instant) -> bool {
        self.run_jump(NavCommand::GoTo(index), now)
    }

    pub fn next(&mut self, now: Instant) -> bool {
        self.run_jump(NavCommand::Next, now)
    }

    pub fn prev(&mut self, now: Instant) -> bool {
        self.run_jump(NavCommand::Prev, now)
    }

    fn run_jump(&mut self, cmd: NavCommand, now: Instant) -> bool {
        let effects = self.nav.apply(cmd);
        if effects.is_empty() {
            return false;
        }
        // A jump lands at the start of its chapter, not at a stale anchor.
        self.progress.clear_anchor();
        self.dispatch(effects);
        self.progress.note_position_changed(now);
        true
    }

    pub fn handle(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::Relocated(locator) => {
                let Some(index) = index_for_locator(&self.document, &locator) else {
                    debug!("Relocation to unknown position {locator:?}");
                    return;
                };
                if self.nav.is_locked() {
                    let _ = self.nav.apply(NavCommand::Relocated(index));
                    return;
                }
                let effects = self.nav.apply(NavCommand::Relocated(index));
                self.dispatch(effects);
                self.progress.note_position_changed(now);
            }
            SessionEvent::Scrolled => {
                if !self.nav.is_locked() {
                    self.progress.note_position_changed(now);
                }
            }
            SessionEvent::SeekSettled => {
                let _ = self
                    .nav
                    .apply(NavCommand::SeekCompleted { synchronous: false });
            }
            SessionEvent::Tick => {
                let _ = self.nav.apply(NavCommand::Tick);
                self.poll(now);
            }
            SessionEvent::RenderSettled => {
                let _ = self.progress.on_render_settled(self.viewport.as_mut());
            }
            SessionEvent::PrefsChanged(prefs) => {
                let _ = self
                    .progress
                    .change_typography(prefs, self.viewport.as_mut(), now);
            }
        }
    }

    /// Run due deadlines: deferred scroll restoration and debounced writes.
    pub fn poll(&mut self, now: Instant) {
        let due = self.progress.poll(self.viewport.as_mut(), now);
        if due.progress {
            if self.nav.is_locked() {
                debug!("Progress write due during a jump, postponing");
                self.progress.note_position_changed(now);
            } else {
                let progress = self.capture();
                let ok = save_progress(self.store.as_mut(), &self.storage_key, &progress);
                self.observers.progress_saved(&progress, ok);
            }
        }
        if due.prefs {
            let prefs = *self.progress.prefs();
            save_prefs(
                self.store.as_mut(),
                &self.storage_key,
                self.settings.isolate_book_config,
                &prefs,
            );
        }
    }

    pub fn set_prefs(&mut self, prefs: TypographyPrefs, now: Instant) {
        self.handle(SessionEvent::PrefsChanged(prefs), now);
    }

    /// Current position as it would be saved
    pub fn capture(&self) -> ReadingProgress {
        self.progress
            .capture(self.viewport.as_ref(), self.current_locator(), Utc::now())
    }

    /// Write progress and typography now, dropping scheduled writes.
    /// Returns whether both writes succeeded.
    pub fn save_now(&mut self) -> bool {
        self.progress.cancel_progress_write();
        self.progress.cancel_prefs_write();
        let mut progress = self.capture();
        if self.nav.is_locked() && !self.progress.has_pending_anchor() {
            // Mid-jump the viewport still shows the previous chapter
            progress.percentage = 0.0;
        }
        let progress_ok = save_progress(self.store.as_mut(), &self.storage_key, &progress);
        let prefs = *self.progress.prefs();
        let prefs_ok = save_prefs(
            self.store.as_mut(),
            &self.storage_key,
            self.settings.isolate_book_config,
            &prefs,
        );
        let ok = progress_ok && prefs_ok;
        self.observers.progress_saved(&progress, ok);
        ok
    }

    /// Bookmark the current position; a blank title uses the chapter label.
    pub fn add_bookmark(&mut self, title: &str) -> u64 {
        let chapter = self.current_chapter().clone();
        let id = self.bookmarks.add(NewBookmark {
            title: title.to_string(),
            level: chapter.level as usize,
            locator: chapter.locator,
            chapter_label: chapter.label,
            percentage: self.progress.current_percentage(self.viewport.as_ref()),
            created_at: Utc::now(),
        });
        self.persist_bookmarks();
        id
    }

    pub fn bookmarks(&self) -> Vec<&Bookmark> {
        self.bookmarks.list()
    }

    pub fn remove_bookmark(&mut self, id: u64) -> bool {
        let removed = self.bookmarks.remove(id).is_some();
        if removed {
            self.persist_bookmarks();
        }
        removed
    }

    pub fn clear_bookmarks(&mut self) {
        self.bookmarks.clear();
        self.persist_bookmarks();
    }

    /// Jump to a bookmark's chapter and scroll to its saved percentage once
    /// the chapter has rendered.
    pub fn go_to_bookmark(&mut self, id: u64, now: Instant) -> bool {
        let Some(bookmark) = self.bookmarks.get(id).cloned() else {
            return false;
        };
        let Some(index) = index_for_locator(&self.document, &bookmark.locator) else {
            warn!("Bookmark {id} points outside this document");
            return false;
        };
        if !self.go_to(index, now) {
            return false;
        }
        self.progress.restore(
            &ReadingProgress {
                percentage: bookmark.percentage,
                format_locator: bookmark.locator,
                timestamp: bookmark.created_at,
            },
            now,
        );
        true
    }

    fn persist_bookmarks(&mut self) {
        let key = bookmarks_key(&self.storage_key);
        save_json(self.store.as_mut(), &key, &self.bookmarks);
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn current_index(&self) -> usize {
        self.nav.current_index()
    }

    pub fn current_chapter(&self) -> &Chapter {
        // The controller keeps the index inside the chapter list.
        &self.document.chapters()[self.nav.current_index()]
    }

    pub fn current_locator(&self) -> Locator {
        self.current_chapter().locator.clone()
    }

    pub fn nav_state(&self) -> NavState {
        self.nav.state()
    }

    pub fn has_prev(&self) -> bool {
        self.nav.has_prev()
    }

    pub fn has_next(&self) -> bool {
        self.nav.has_next()
    }

    pub fn prefs(&self) -> &TypographyPrefs {
        self.progress.prefs()
    }

    pub fn viewport(&self) -> &dyn Viewport {
        self.viewport.as_ref()
    }

    pub fn viewport_mut(&mut self) -> &mut dyn Viewport {
        self.viewport.as_mut()
    }

    pub fn store(&self) -> &dyn ProgressStore {
        self.store.as_ref()
    }

    /// Chapter body currently shown, for plain text documents
    pub fn displayed_text(&self) -> Option<&str> {
        match &self.renderer {
            Renderer::Text(text) => text.displayed_body(),
            Renderer::External(_) => None,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn ReaderObserver>) {
        self.observers.push(observer);
    }
}
