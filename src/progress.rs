//! Reading progress capture/restore and typography reflow anchoring.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::model::Locator;
use crate::render::Viewport;
use crate::typography::TypographyPrefs;

/// Position saved per document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgress {
    /// Scroll position relative to the scrollable extent, `0..=100`
    pub percentage: f64,
    pub format_locator: Locator,
    pub timestamp: DateTime<Utc>,
}

impl ReadingProgress {
    pub fn normalized(mut self) -> Self {
        self.percentage = clamp_percentage(self.percentage);
        self
    }
}

fn clamp_percentage(pct: f64) -> f64 {
    if pct.is_finite() {
        pct.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// `offset / max(1, extent)` as a percentage, clamped to `0..=100`.
pub fn percentage_of(offset: f64, extent: f64) -> f64 {
    clamp_percentage(offset / extent.max(1.0) * 100.0)
}

/// Inverse of [`percentage_of`] for a given extent.
pub fn offset_for(percentage: f64, extent: f64) -> f64 {
    clamp_percentage(percentage) / 100.0 * extent.max(0.0)
}

/// Trailing-edge debounce driven by caller-supplied instants.
#[derive(Clone, Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Restart the quiet period. Returns true when an earlier request was
    /// coalesced into this one.
    pub fn touch(&mut self, now: Instant) -> bool {
        let coalesced = self.deadline.is_some();
        self.deadline = Some(now + self.delay);
        coalesced
    }

    /// True once per burst, when the quiet period has elapsed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum AnchorReason {
    Restore,
    Reflow,
}

/// A percentage waiting to be applied once the viewport has laid out.
#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingAnchor {
    percentage: f64,
    reason: AnchorReason,
    /// Applied at this instant even without a render-settled signal
    apply_by: Instant,
}

/// What the session should persist after a poll
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DueWrites {
    pub progress: bool,
    pub prefs: bool,
}

/// Owns the current typography and every deferred scroll/persist decision.
#[derive(Clone, Debug)]
pub struct ProgressCoordinator {
    prefs: TypographyPrefs,
    pending: Option<PendingAnchor>,
    progress_writes: Debouncer,
    prefs_writes: Debouncer,
    restore_delay: Duration,
}

impl ProgressCoordinator {
    pub fn new(
        prefs: TypographyPrefs,
        progress_debounce: Duration,
        prefs_debounce: Duration,
        restore_delay: Duration,
    ) -> Self {
        Self {
            prefs: prefs.normalized(),
            pending: None,
            progress_writes: Debouncer::new(progress_debounce),
            prefs_writes: Debouncer::new(prefs_debounce),
            restore_delay,
        }
    }

    pub fn prefs(&self) -> &TypographyPrefs {
        &self.prefs
    }

    /// Percentage the viewport is at, or is about to be moved to.
    ///
    /// While an anchor is pending the viewport offset is stale (pre-layout
    /// or pre-reflow), so the anchor wins.
    pub fn current_percentage(&self, viewport: &dyn Viewport) -> f64 {
        match self.pending {
            Some(anchor) => anchor.percentage,
            None => percentage_of(viewport.scroll_offset(), viewport.scrollable_extent()),
        }
    }

    pub fn has_pending_anchor(&self) -> bool {
        self.pending.is_some()
    }

    pub fn capture(
        &self,
        viewport: &dyn Viewport,
        locator: Locator,
        timestamp: DateTime<Utc>,
    ) -> ReadingProgress {
        ReadingProgress {
            percentage: self.current_percentage(viewport),
            format_locator: locator,
            timestamp,
        }
    }

    /// Schedule the saved percentage for when the viewport stabilizes.
    /// Chapter selection from the locator is the caller's job.
    pub fn restore(&mut self, progress: &ReadingProgress, now: Instant) {
        self.pending = Some(PendingAnchor {
            percentage: clamp_percentage(progress.percentage),
            reason: AnchorReason::Restore,
            apply_by: now + self.restore_delay,
        });
        debug!("Restoring to {:.2}% once rendered", progress.percentage);
    }

    /// Forget any pending anchor, e.g. after an explicit jump.
    pub fn clear_anchor(&mut self) {
        self.pending = None;
    }

    /// Apply new typography.
    ///
    /// For layout-affecting changes the current percentage is captured
    /// before the viewport sees the new values and re-applied on the next
    /// render-settled signal. Returns false if nothing changed.
    pub fn change_typography(
        &mut self,
        prefs: TypographyPrefs,
        viewport: &mut dyn Viewport,
        now: Instant,
    ) -> bool {
        let prefs = prefs.normalized();
        if prefs == self.prefs {
            return false;
        }

        if self.prefs.is_layout_change(&prefs) {
            let percentage = self.current_percentage(viewport);
            let reason = self
                .pending
                .map(|anchor| anchor.reason)
                .unwrap_or(AnchorReason::Reflow);
            self.pending = Some(PendingAnchor {
                percentage,
                reason,
                apply_by: now + self.restore_delay,
            });
            debug!("Reflow: anchoring at {percentage:.2}%");
        }

        viewport.apply_typography(&prefs);
        self.prefs = prefs;
        if self.prefs_writes.touch(now) {
            debug!("Coalesced typography write");
        }
        true
    }

    /// Content has been laid out: move to the pending percentage, if any.
    pub fn on_render_settled(&mut self, viewport: &mut dyn Viewport) -> Option<f64> {
        let anchor = self.pending.take()?;
        let offset = offset_for(anchor.percentage, viewport.scrollable_extent());
        viewport.scroll_to(offset);
        debug!(
            "Applied {:?} anchor {:.2}% -> offset {offset:.1}",
            anchor.reason, anchor.percentage
        );
        Some(offset)
    }

    /// The user (or renderer) moved the reading position.
    pub fn note_position_changed(&mut self, now: Instant) {
        if self.progress_writes.touch(now) {
            debug!("Coalesced progress write");
        }
    }

    /// Run deadlines: overdue anchors are applied, due writes are reported.
    pub fn poll(&mut self, viewport: &mut dyn Viewport, now: Instant) -> DueWrites {
        if self.pending.is_some_and(|anchor| now >= anchor.apply_by) {
            debug!("No render-settled signal before deadline, applying anchor");
            let _ = self.on_render_settled(viewport);
        }
        DueWrites {
            progress: self.progress_writes.fire_if_due(now),
            prefs: self.prefs_writes.fire_if_due(now),
        }
    }

    /// A manual save supersedes any scheduled progress write.
    pub fn cancel_progress_write(&mut self) {
        self.progress_writes.cancel();
    }

    pub fn cancel_prefs_write(&mut self) {
        self.prefs_writes.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        offset: f64,
        extent: f64,
    }

    impl Viewport for Fixed {
        fn scroll_offset(&self) -> f64 {
            self.offset
        }
        fn scrollable_extent(&self) -> f64 {
            self.extent
        }
        fn scroll_to(&mut self, offset: f64) {
            self.offset = offset.clamp(0.0, self.extent.max(0.0));
        }
        fn apply_typography(&mut self, prefs: &TypographyPrefs) {
            self.extent = prefs.page_width * 10.0;
        }
    }

    fn coordinator() -> ProgressCoordinator {
        ProgressCoordinator::new(
            TypographyPrefs::default(),
            Duration::from_millis(800),
            Duration::from_millis(100),
            Duration::from_millis(300),
        )
    }

    #[test]
    fn percentage_math() {
        assert_eq!(percentage_of(250.0, 1000.0), 25.0);
        assert_eq!(percentage_of(5.0, 0.0), 100.0);
        assert_eq!(percentage_of(-3.0, 100.0), 0.0);
        assert_eq!(percentage_of(0.0, 0.0), 0.0);
        assert_eq!(offset_for(25.0, 1000.0), 250.0);
        assert_eq!(offset_for(f64::NAN, 1000.0), 0.0);
    }

    #[test]
    fn debouncer_coalesces_bursts() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(100));
        assert!(!d.touch(t0));
        assert!(d.touch(t0 + Duration::from_millis(50)));
        assert!(!d.fire_if_due(t0 + Duration::from_millis(120)));
        assert!(d.fire_if_due(t0 + Duration::from_millis(150)));
        assert!(!d.fire_if_due(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn capture_uses_pending_anchor() {
        let t0 = Instant::now();
        let mut c = coordinator();
        let view = Fixed {
            offset: 0.0,
            extent: 1000.0,
        };
        let progress = ReadingProgress {
            percentage: 40.0,
            format_locator: Locator::page(2),
            timestamp: Utc::now(),
        };
        c.restore(&progress, t0);
        assert_eq!(c.capture(&view, Locator::page(2), Utc::now()).percentage, 40.0);
    }

    #[test]
    fn restore_waits_for_render_or_deadline() {
        let t0 = Instant::now();
        let mut c = coordinator();
        let mut view = Fixed {
            offset: 0.0,
            extent: 2000.0,
        };
        let progress = ReadingProgress {
            percentage: 50.0,
            format_locator: Locator::page(0),
            timestamp: Utc::now(),
        };
        c.restore(&progress, t0);
        let _ = c.poll(&mut view, t0 + Duration::from_millis(100));
        assert_eq!(view.offset, 0.0);
        let _ = c.poll(&mut view, t0 + Duration::from_millis(300));
        assert_eq!(view.offset, 1000.0);
        assert!(!c.has_pending_anchor());
    }

    #[test]
    fn typography_change_captures_before_applying() {
        let t0 = Instant::now();
        let mut c = coordinator();
        let mut view = Fixed {
            offset: 2000.0,
            extent: 8000.0,
        };
        let wide = TypographyPrefs {
            page_width: 1200.0,
            ..TypographyPrefs::default()
        };
        assert!(c.change_typography(wide, &mut view, t0));
        // Viewport extent changed immediately, offset not yet corrected
        assert_eq!(view.extent, 12000.0);
        assert_eq!(c.on_render_settled(&mut view), Some(3000.0));
        assert_eq!(percentage_of(view.offset, view.extent), 25.0);
    }

    #[test]
    fn unchanged_or_cosmetic_prefs_do_not_anchor() {
        let t0 = Instant::now();
        let mut c = coordinator();
        let mut view = Fixed {
            offset: 10.0,
            extent: 8000.0,
        };
        assert!(!c.change_typography(TypographyPrefs::default(), &mut view, t0));
        let no_bar = TypographyPrefs {
            progress_bar_enabled: false,
            ..TypographyPrefs::default()
        };
        assert!(c.change_typography(no_bar, &mut view, t0));
        assert!(!c.has_pending_anchor());
    }

    #[test]
    fn prefs_writes_are_debounced() {
        let t0 = Instant::now();
        let mut c = coordinator();
        let mut view = Fixed {
            offset: 0.0,
            extent: 8000.0,
        };
        for step in 0..5u64 {
            let prefs = TypographyPrefs {
                font_size: 14.0 + step as f64,
                ..TypographyPrefs::default()
            };
            c.change_typography(prefs, &mut view, t0 + Duration::from_millis(step * 20));
        }
        assert!(!c.poll(&mut view, t0 + Duration::from_millis(150)).prefs);
        assert!(c.poll(&mut view, t0 + Duration::from_millis(200)).prefs);
        assert!(!c.poll(&mut view, t0 + Duration::from_millis(400)).prefs);
    }
}
