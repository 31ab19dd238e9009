//! Layout preferences and their normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARA_SPACING_RANGE: (f64, f64) = (0.4, 3.0);
pub const LETTER_SPACING_RANGE: (f64, f64) = (0.0, 3.0);
pub const LINE_HEIGHT_RANGE: (f64, f64) = (1.2, 2.8);
pub const PAGE_WIDTH_RANGE: (f64, f64) = (480.0, 1400.0);
pub const PAGE_PADDING_RANGE: (f64, f64) = (16.0, 120.0);
pub const FONT_SIZE_RANGE: (f64, f64) = (12.0, 32.0);

const MIN_VERTICAL_PADDING: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypographyPrefs {
    pub para_spacing: f64,
    pub letter_spacing: f64,
    pub line_height: f64,
    /// Content column width in pixels
    pub page_width: f64,
    /// Horizontal padding in pixels
    pub page_padding: f64,
    pub progress_bar_enabled: bool,
    pub font_size: f64,
}

impl Default for TypographyPrefs {
    fn default() -> Self {
        Self {
            para_spacing: 1.0,
            letter_spacing: 0.2,
            line_height: 1.8,
            page_width: 800.0,
            page_padding: 40.0,
            progress_bar_enabled: true,
            font_size: 18.0,
        }
    }
}

fn clamp_or(value: f64, (min, max): (f64, f64), default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

fn field(obj: &Value, name: &str) -> Option<f64> {
    match obj.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl TypographyPrefs {
    /// Clamp every field into its documented range; non-finite values fall
    /// back to the default.
    pub fn normalized(self) -> Self {
        let d = Self::default();
        Self {
            para_spacing: clamp_or(self.para_spacing, PARA_SPACING_RANGE, d.para_spacing),
            letter_spacing: clamp_or(self.letter_spacing, LETTER_SPACING_RANGE, d.letter_spacing),
            line_height: clamp_or(self.line_height, LINE_HEIGHT_RANGE, d.line_height),
            page_width: clamp_or(self.page_width, PAGE_WIDTH_RANGE, d.page_width).round(),
            page_padding: clamp_or(self.page_padding, PAGE_PADDING_RANGE, d.page_padding).round(),
            progress_bar_enabled: self.progress_bar_enabled,
            font_size: clamp_or(self.font_size, FONT_SIZE_RANGE, d.font_size),
        }
    }

    /// Read prefs from a stored JSON value field by field, so one bad field
    /// does not discard the rest. Numeric strings are accepted.
    pub fn from_value(value: &Value) -> Self {
        let d = Self::default();
        Self {
            para_spacing: field(value, "para_spacing").unwrap_or(d.para_spacing),
            letter_spacing: field(value, "letter_spacing").unwrap_or(d.letter_spacing),
            line_height: field(value, "line_height").unwrap_or(d.line_height),
            page_width: field(value, "page_width").unwrap_or(d.page_width),
            page_padding: field(value, "page_padding").unwrap_or(d.page_padding),
            progress_bar_enabled: value
                .get("progress_bar_enabled")
                .and_then(Value::as_bool)
                .unwrap_or(d.progress_bar_enabled),
            font_size: field(value, "font_size").unwrap_or(d.font_size),
        }
        .normalized()
    }

    pub fn to_value(self) -> Value {
        serde_json::to_value(self.normalized()).unwrap_or(Value::Null)
    }

    /// Derived top/bottom padding
    pub fn vertical_padding(&self) -> f64 {
        (self.page_padding * 0.75).round().max(MIN_VERTICAL_PADDING)
    }

    /// Whether moving from `self` to `other` changes the scrollable extent.
    pub fn is_layout_change(&self, other: &Self) -> bool {
        let (a, b) = (self.normalized(), other.normalized());
        a.para_spacing != b.para_spacing
            || a.letter_spacing != b.letter_spacing
            || a.line_height != b.line_height
            || a.page_width != b.page_width
            || a.page_padding != b.page_padding
            || a.font_size != b.font_size
    }
}
