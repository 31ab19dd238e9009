//! Renderer capabilities consumed by the session.

use log::{debug, warn};

use crate::model::{Document, Locator};
use crate::typography::TypographyPrefs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Content is displayed at the target already
    Settled,
    /// Display continues asynchronously; completion arrives as an event
    Pending,
}

/// Format-specific "show this position" capability.
///
/// Package renderers display by reference, paged renderers scroll to a page
/// and optional anchor. Both usually answer `Pending`.
pub trait SeekAdapter {
    fn seek(&mut self, locator: &Locator) -> SeekOutcome;
}

/// The scroll container content is shown in.
pub trait Viewport {
    fn scroll_offset(&self) -> f64;
    /// Content height minus visible height
    fn scrollable_extent(&self) -> f64;
    fn scroll_to(&mut self, offset: f64);
    /// Apply new layout values. Extent may change only once the renderer
    /// has reflowed.
    fn apply_typography(&mut self, _prefs: &TypographyPrefs) {}
}

/// Renderer for plain text: the engine writes chapter bodies itself.
#[derive(Clone, Debug)]
pub struct TextRenderer {
    chapters: Vec<(Locator, String)>,
    displayed: Option<usize>,
}

impl TextRenderer {
    /// `bodies` must be parallel to `document.chapters()`.
    pub fn new(document: &Document, bodies: Vec<String>) -> Self {
        let chapters = document
            .chapters()
            .iter()
            .map(|c| c.locator.clone())
            .zip(bodies)
            .collect();
        Self {
            chapters,
            displayed: None,
        }
    }

    pub fn displayed_index(&self) -> Option<usize> {
        self.displayed
    }

    /// The body currently written to the viewport
    pub fn displayed_body(&self) -> Option<&str> {
        self.displayed
            .and_then(|idx| self.chapters.get(idx))
            .map(|(_, body)| body.as_str())
    }
}

impl SeekAdapter for TextRenderer {
    fn seek(&mut self, locator: &Locator) -> SeekOutcome {
        let found = self.chapters.iter().position(|(l, _)| l == locator).or_else(|| {
            let Locator::Line { start_line, .. } = locator else {
                return None;
            };
            self.chapters.iter().rposition(|(l, _)| {
                matches!(l, Locator::Line { start_line: s, .. } if s <= start_line)
            })
        });
        match found {
            Some(idx) => {
                debug!("Displaying text chapter {idx}");
                self.displayed = Some(idx);
            }
            None => warn!("No text chapter for {locator:?}"),
        }
        SeekOutcome::Settled
    }
}

/// Adapter for hosts that display content synchronously and need no seek.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateAdapter;

impl SeekAdapter for ImmediateAdapter {
    fn seek(&mut self, _locator: &Locator) -> SeekOutcome {
        SeekOutcome::Settled
    }
}

/// Index of the page whose top edge is closest to the viewport top.
///
/// `page_tops` are the content offsets of each page, ascending.
pub fn most_visible_page(page_tops: &[f64], viewport_top: f64) -> Option<usize> {
    page_tops
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - viewport_top).abs().total_cmp(&(*b - viewport_top).abs()))
        .map(|(idx, _)| idx)
}
