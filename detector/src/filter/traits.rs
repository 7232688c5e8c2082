use vision_hud_common::frame::{Frame, FrameError};

/// Computes how different two frames look.
///
/// Implementations return a non-negative dissimilarity score where `0.0`
/// means identical after normalization. Frames that cannot be compared
/// (corrupt or empty) yield an error; the detector decides what to do
/// with it.
pub trait FrameComparator: Send + Sync {
    fn score(&self, baseline: &Frame, current: &Frame) -> Result<f64, CompareError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("frame cannot be compared: {0}")]
    Frame(#[from] FrameError),
}
