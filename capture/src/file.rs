use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;
use vision_hud_common::frame::Frame;

use crate::{next_seq, CaptureError, FrameSource};

/// Re-reads an image file on every capture. Pairs with an external tool that
/// keeps overwriting the same screenshot path.
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FrameSource for FileFrameSource {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CaptureError::ReadFile(self.path.display().to_string(), e))?;
        let seq = next_seq();
        debug!(seq, bytes = bytes.len(), path = %self.path.display(), "read frame file");
        Ok(Frame::from_encoded(bytes, Instant::now(), seq))
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    #[tokio::test]
    async fn reads_current_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 4, Rgba([9, 9, 9, 255])))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let source = FileFrameSource::new(path);
        let frame = source.capture().await.unwrap();
        let image = frame.to_image().unwrap();
        assert_eq!((image.width(), image.height()), (6, 4));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = FileFrameSource::new(PathBuf::from("/definitely/not/here.png"));
        assert!(matches!(
            source.capture().await,
            Err(CaptureError::ReadFile(_, _))
        ));
    }
}
