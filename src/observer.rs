use crate::error::ReaderError;
use crate::model::Chapter;
use crate::progress::ReadingProgress;

/// Notifications for the surrounding UI. All methods default to no-ops.
pub trait ReaderObserver {
    fn active_chapter_changed(&mut self, _index: usize, _chapter: &Chapter) {}
    fn availability_changed(&mut self, _has_prev: bool, _has_next: bool) {}
    /// `ok` is false when the write failed; reading continues either way.
    fn progress_saved(&mut self, _progress: &ReadingProgress, _ok: bool) {}
    fn document_failed(&mut self, _error: &ReaderError) {}
}

/// Owned snapshot of one notification
#[derive(Clone, Debug, PartialEq)]
pub enum ReaderEvent {
    ActiveChapterChanged { index: usize, label: String },
    AvailabilityChanged { has_prev: bool, has_next: bool },
    ProgressSaved { percentage: f64, ok: bool },
    DocumentFailed(String),
}

/// Observer list owned by a session
#[derive(Default)]
pub struct Observers {
    inner: Vec<Box<dyn ReaderObserver>>,
}

impl Observers {
    pub fn new(observers: Vec<Box<dyn ReaderObserver>>) -> Self {
        Self { inner: observers }
    }

    pub fn into_inner(self) -> Vec<Box<dyn ReaderObserver>> {
        self.inner
    }

    pub fn push(&mut self, observer: Box<dyn ReaderObserver>) {
        self.inner.push(observer);
    }

    pub fn active_chapter_changed(&mut self, index: usize, chapter: &Chapter) {
        for observer in &mut self.inner {
            observer.active_chapter_changed(index, chapter);
        }
    }

    pub fn availability_changed(&mut self, has_prev: bool, has_next: bool) {
        for observer in &mut self.inner {
            observer.availability_changed(has_prev, has_next);
        }
    }

    pub fn progress_saved(&mut self, progress: &ReadingProgress, ok: bool) {
        for observer in &mut self.inner {
            observer.progress_saved(progress, ok);
        }
    }

    pub fn document_failed(&mut self, error: &ReaderError) {
        for observer in &mut self.inner {
            observer.document_failed(error);
        }
    }
}
