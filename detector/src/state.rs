use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use vision_hud_common::config::{secs_to_duration, DetectorConfig};
use vision_hud_common::frame::Frame;

use crate::clock::Clock;
use crate::filter::luma::LumaDiffComparator;
use crate::filter::traits::{CompareError, FrameComparator};
use crate::window::{DiffWindow, WindowStats};

/// Why the baseline was last replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// First frame ever seen (or first after a reset).
    Initial,
    /// A single sample in the window reached the strong threshold.
    StrongChange,
    /// The window average exceeded the sustained threshold.
    SustainedChange,
    /// Silent drift correction while the screen was quiet. Never surfaced
    /// as a [`Verdict::Changed`].
    BaselineRefresh,
    /// The comparator could not score the frame.
    ExceptionRefresh,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::Initial => "initial",
            ChangeReason::StrongChange => "strong_change",
            ChangeReason::SustainedChange => "sustained_change",
            ChangeReason::BaselineRefresh => "baseline_refresh",
            ChangeReason::ExceptionRefresh => "exception_refresh",
        }
    }
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Changed(ChangeReason),
    Unchanged,
}

impl Verdict {
    pub fn is_changed(&self) -> bool {
        matches!(self, Verdict::Changed(_))
    }

    pub fn reason(&self) -> Option<ChangeReason> {
        match self {
            Verdict::Changed(reason) => Some(*reason),
            Verdict::Unchanged => None,
        }
    }
}

/// Detector tuning with durations resolved.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub diff_threshold: f64,
    pub strong_diff_threshold: f64,
    pub change_window: Duration,
    pub min_change_interval: Duration,
    pub min_sample_count: usize,
    pub baseline_refresh: Duration,
}

impl From<&DetectorConfig> for DetectorSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            diff_threshold: config.diff_threshold,
            strong_diff_threshold: config.strong_diff_threshold,
            change_window: secs_to_duration(config.change_window_secs),
            min_change_interval: secs_to_duration(config.min_change_interval_secs),
            min_sample_count: config.min_sample_count,
            baseline_refresh: secs_to_duration(config.baseline_refresh_secs),
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

/// Point-in-time diagnostics for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorStatus {
    pub has_baseline: bool,
    pub sample_count: usize,
    pub window_avg: f64,
    pub window_max: f64,
    pub last_reason: Option<ChangeReason>,
    pub secs_since_change: Option<f64>,
    pub secs_since_refresh: Option<f64>,
}

/// Adaptive screen-change detector.
///
/// Each call to [`observe`](ChangeDetector::observe) runs the whole
/// compare / evict / decide / replace sequence as one unit. Callers sharing
/// a detector across tasks must hold a single lock around each call.
pub struct ChangeDetector {
    settings: DetectorSettings,
    clock: Arc<dyn Clock>,
    comparator: Box<dyn FrameComparator>,
    baseline: Option<Frame>,
    window: DiffWindow,
    last_change: Option<Instant>,
    last_baseline_refresh: Option<Instant>,
    last_reason: Option<ChangeReason>,
}

impl ChangeDetector {
    pub fn new(
        settings: DetectorSettings,
        clock: Arc<dyn Clock>,
        comparator: Box<dyn FrameComparator>,
    ) -> Self {
        let window = DiffWindow::new(settings.change_window);
        Self {
            settings,
            clock,
            comparator,
            baseline: None,
            window,
            last_change: None,
            last_baseline_refresh: None,
            last_reason: None,
        }
    }

    /// Build a detector using the luminance comparator sized from config.
    pub fn from_config(config: &DetectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            DetectorSettings::from(config),
            clock,
            Box::new(LumaDiffComparator::new(config.thumbnail_size)),
        )
    }

    /// Feed one frame and decide whether the screen changed meaningfully.
    pub fn observe(&mut self, frame: Frame) -> Verdict {
        let now = self.clock.now();

        let scored = self
            .baseline
            .as_ref()
            .map(|baseline| self.comparator.score(baseline, &frame));
        let score = match scored {
            None => return self.bootstrap(frame, now),
            Some(Ok(score)) => score,
            Some(Err(e)) => return self.recover_from_compare_error(frame, now, e),
        };

        self.window.push(now, score);
        self.window.evict(now);
        let stats = self.window.stats();

        debug!(
            seq = frame.seq,
            score = format!("{:.3}", score),
            count = stats.count,
            avg = format!("{:.3}", stats.avg),
            max = format!("{:.3}", stats.max),
            "frame compared against baseline"
        );

        if self.rate_gate_open(now, &stats) {
            if let Some(reason) = self.classify(&stats) {
                info!(
                    seq = frame.seq,
                    %reason,
                    count = stats.count,
                    avg = format!("{:.3}", stats.avg),
                    max = format!("{:.3}", stats.max),
                    comparator = self.comparator.name(),
                    "screen changed"
                );
                self.accept(frame, now, reason);
                return Verdict::Changed(reason);
            }
        }

        if score <= self.settings.diff_threshold && self.refresh_due(now) {
            info!(
                seq = frame.seq,
                score = format!("{:.3}", score),
                "quiet screen, refreshing baseline"
            );
            self.baseline = Some(frame);
            self.last_baseline_refresh = Some(now);
            self.last_reason = Some(ChangeReason::BaselineRefresh);
        }

        Verdict::Unchanged
    }

    /// Forget the baseline, samples and timers. The next frame bootstraps.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.window.clear();
        self.last_change = None;
        self.last_baseline_refresh = None;
        self.last_reason = None;
        info!("change detector reset");
    }

    pub fn status(&self) -> DetectorStatus {
        let now = self.clock.now();
        let stats = self.window.stats();
        DetectorStatus {
            has_baseline: self.baseline.is_some(),
            sample_count: stats.count,
            window_avg: stats.avg,
            window_max: stats.max,
            last_reason: self.last_reason,
            secs_since_change: self
                .last_change
                .map(|t| now.saturating_duration_since(t).as_secs_f64()),
            secs_since_refresh: self
                .last_baseline_refresh
                .map(|t| now.saturating_duration_since(t).as_secs_f64()),
        }
    }

    pub fn last_reason(&self) -> Option<ChangeReason> {
        self.last_reason
    }

    pub fn baseline(&self) -> Option<&Frame> {
        self.baseline.as_ref()
    }

    pub fn window_stats(&self) -> WindowStats {
        self.window.stats()
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn bootstrap(&mut self, frame: Frame, now: Instant) -> Verdict {
        info!(seq = frame.seq, "first frame, accepting as baseline");
        self.accept(frame, now, ChangeReason::Initial);
        Verdict::Changed(ChangeReason::Initial)
    }

    /// Replace the baseline with `frame`, stamp both timers and start a
    /// fresh evidence window.
    fn accept(&mut self, frame: Frame, now: Instant, reason: ChangeReason) {
        self.baseline = Some(frame);
        self.last_change = Some(now);
        self.last_baseline_refresh = Some(now);
        self.last_reason = Some(reason);
        self.window.clear();
    }

    /// A frame that cannot be compared replaces the baseline so detection
    /// never stalls on it. The change is reported only if the detector
    /// cooldown allows another verdict.
    fn recover_from_compare_error(
        &mut self,
        frame: Frame,
        now: Instant,
        error: CompareError,
    ) -> Verdict {
        if self.cooldown_elapsed(now) {
            warn!(seq = frame.seq, error = %error, "comparison failed, treating as changed");
            self.accept(frame, now, ChangeReason::ExceptionRefresh);
            return Verdict::Changed(ChangeReason::ExceptionRefresh);
        }

        warn!(
            seq = frame.seq,
            error = %error,
            "comparison failed inside cooldown, replacing baseline silently"
        );
        self.baseline = Some(frame);
        self.last_baseline_refresh = Some(now);
        self.window.clear();
        Verdict::Unchanged
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    fn rate_gate_open(&self, now: Instant, stats: &WindowStats) -> bool {
        stats.count >= self.settings.min_sample_count && self.cooldown_elapsed(now)
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_change.map_or(true, |t| {
            now.saturating_duration_since(t) >= self.settings.min_change_interval
        })
    }

    fn refresh_due(&self, now: Instant) -> bool {
        self.last_baseline_refresh.map_or(true, |t| {
            now.saturating_duration_since(t) >= self.settings.baseline_refresh
        })
    }

    fn classify(&self, stats: &WindowStats) -> Option<ChangeReason> {
        if stats.max >= self.settings.strong_diff_threshold {
            Some(ChangeReason::StrongChange)
        } else if stats.avg > self.settings.diff_threshold {
            Some(ChangeReason::SustainedChange)
        } else {
            None
        }
    }
}
