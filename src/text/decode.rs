//! Byte-to-text decoding for plain-text books.

use encoding_rs::Encoding;
use log::{info, warn};

use crate::error::ReaderError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decoded text plus how it was obtained
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// Name of the encoding that produced `text`
    pub encoding: &'static str,
    /// True when malformed sequences were replaced
    pub lossy: bool,
}

/// Decode `bytes` as strict UTF-8, retrying once with `fallback_label`.
///
/// When the fallback also reports malformed input the replacement-char
/// output is still returned; garbled text is preferred over refusing to open.
pub fn decode_text(bytes: &[u8], fallback_label: &str) -> DecodedText {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(body) {
        return DecodedText {
            text: normalize_line_endings(text),
            encoding: "UTF-8",
            lossy: false,
        };
    }

    info!("UTF-8 decoding failed, trying {fallback_label}");
    let Some(encoding) = Encoding::for_label(fallback_label.as_bytes()) else {
        warn!("Unknown fallback encoding label '{fallback_label}', decoding as lossy UTF-8");
        return DecodedText {
            text: normalize_line_endings(&String::from_utf8_lossy(body)),
            encoding: "UTF-8",
            lossy: true,
        };
    };

    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        let err = ReaderError::EncodingAmbiguity {
            primary: "UTF-8".to_string(),
            fallback: encoding.name().to_string(),
        };
        warn!("{err}; showing best-effort text");
    }

    DecodedText {
        text: normalize_line_endings(&text),
        encoding: encoding.name(),
        lossy: had_errors,
    }
}

/// Convert `\r\n` and lone `\r` into `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
