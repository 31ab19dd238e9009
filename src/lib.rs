pub mod bookmark;
pub mod builder;
pub mod epub;
pub mod error;
pub mod library;
pub mod model;
pub mod navigation;
pub mod observer;
pub mod panic_handler;
pub mod pdf;
pub mod persistence;
pub mod progress;
pub mod render;
pub mod session;
pub mod settings;
pub mod text;
pub mod typography;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use builder::{LoadedDocument, build_document};
pub use error::{ReaderError, Result};
pub use library::{ContentSource, DirectoryLibrary, DocumentId};
pub use model::{Chapter, Document, DocumentFormat, Locator};
pub use navigation::{NavState, NavigationController};
pub use observer::{ReaderEvent, ReaderObserver};
pub use persistence::{JsonFileStore, MemoryStore, ProgressStore};
pub use progress::ReadingProgress;
pub use render::{SeekAdapter, SeekOutcome, Viewport};
pub use session::{ReaderSession, SessionEvent, SessionParts};
pub use settings::Settings;
pub use typography::TypographyPrefs;
