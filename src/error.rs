use thiserror::Error;

/// Errors raised while opening or navigating a document.
///
/// Only `DocumentCorrupt` and `UnsupportedFormat` ever reach the caller of
/// `build_document`; the other variants are recovered where they occur and
/// are surfaced through logging.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("document could not be opened: {reason}")]
    DocumentCorrupt { reason: String },

    #[error("outline entry '{title}' could not be resolved: {reason}")]
    OutlineResolution { title: String, reason: String },

    #[error("text is not valid {primary} and could not be decoded as {fallback}")]
    EncodingAmbiguity { primary: String, fallback: String },

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::DocumentCorrupt {
            reason: reason.into(),
        }
    }

    pub fn outline(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OutlineResolution {
            title: title.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Whether this error should be shown to the user as "could not be opened".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DocumentCorrupt { .. } | Self::UnsupportedFormat(_) | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
