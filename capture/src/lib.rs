//! Frame sources: where the pixels the detector looks at come from.

pub mod file;
pub mod http;
#[cfg(feature = "screen")]
pub mod screen;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use vision_hud_common::config::CaptureConfig;
use vision_hud_common::frame::Frame;

static SEQ_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Next process-wide frame sequence number.
pub(crate) fn next_seq() -> u64 {
    SEQ_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Supplies a freshly captured frame on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Frame, CaptureError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("HTTP request failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP body error: {0}")]
    HttpBody(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to read frame file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("screen capture failed: {0}")]
    Screen(String),
    #[error("no display available for capture")]
    NoDisplay,
    #[error("capture task failed: {0}")]
    Join(String),
    #[error("capture mode '{0}' needs the `path` setting")]
    MissingPath(String),
    #[error("capture mode '{0}' is not available in this build")]
    Unsupported(String),
    #[error("unknown capture mode '{0}', expected 'screen', 'http' or 'file'")]
    UnknownMode(String),
}

/// Build the frame source selected by `config.mode`.
pub fn build_source(config: &CaptureConfig) -> Result<Arc<dyn FrameSource>, CaptureError> {
    match config.mode.as_str() {
        "http" => Ok(Arc::new(http::HttpFrameSource::new(&config.url)?)),
        "file" => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| CaptureError::MissingPath(config.mode.clone()))?;
            Ok(Arc::new(file::FileFrameSource::new(path)))
        }
        #[cfg(feature = "screen")]
        "screen" => Ok(Arc::new(screen::ScreenFrameSource::new(
            config.monitor,
            config.region,
        ))),
        #[cfg(not(feature = "screen"))]
        "screen" => Err(CaptureError::Unsupported(config.mode.clone())),
        other => Err(CaptureError::UnknownMode(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_mode_requires_path() {
        let config = CaptureConfig {
            mode: "file".into(),
            ..CaptureConfig::default()
        };
        assert!(matches!(
            build_source(&config),
            Err(CaptureError::MissingPath(_))
        ));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let config = CaptureConfig {
            mode: "webcam".into(),
            ..CaptureConfig::default()
        };
        assert!(matches!(
            build_source(&config),
            Err(CaptureError::UnknownMode(_))
        ));
    }

    #[test]
    fn http_mode_builds() {
        let source = build_source(&CaptureConfig::default()).unwrap();
        assert_eq!(source.name(), "http");
    }

    #[test]
    fn sequence_numbers_increase() {
        let a = next_seq();
        let b = next_seq();
        assert!(b > a);
    }
}
