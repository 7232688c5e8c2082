//! Adaptive screen-change detection.
//!
//! A [`ChangeDetector`] compares every observed frame against a baseline,
//! keeps a short rolling window of dissimilarity scores, and decides whether
//! the screen changed enough to be worth reporting.

pub mod clock;
pub mod filter;
pub mod state;
pub mod window;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use filter::luma::LumaDiffComparator;
pub use filter::traits::{CompareError, FrameComparator};
pub use state::{ChangeDetector, ChangeReason, DetectorSettings, DetectorStatus, Verdict};
pub use window::{DiffSample, DiffWindow, WindowStats};
