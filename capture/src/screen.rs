use std::time::Instant;

use async_trait::async_trait;
use image::RgbaImage;
use screenshots::Screen;
use tracing::debug;
use vision_hud_common::frame::{Frame, Region};

use crate::{next_seq, CaptureError, FrameSource};

/// Captures a display, or a rectangle of it, directly from the OS.
pub struct ScreenFrameSource {
    monitor: Option<usize>,
    region: Option<Region>,
}

impl ScreenFrameSource {
    pub fn new(monitor: Option<usize>, region: Option<Region>) -> Self {
        Self { monitor, region }
    }
}

#[async_trait]
impl FrameSource for ScreenFrameSource {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let (monitor, region) = (self.monitor, self.region);
        let (raster, (x, y)) = tokio::task::spawn_blocking(move || grab(monitor, region))
            .await
            .map_err(|e| CaptureError::Join(e.to_string()))??;
        let seq = next_seq();
        debug!(
            seq,
            width = raster.width(),
            height = raster.height(),
            origin_x = x,
            origin_y = y,
            "captured screen"
        );
        Ok(Frame::from_raster(raster, Instant::now(), seq).with_origin(x, y))
    }

    fn name(&self) -> &str {
        "screen"
    }
}

/// Returns the raster and the desktop position of its top-left pixel.
fn grab(
    monitor: Option<usize>,
    region: Option<Region>,
) -> Result<(RgbaImage, (i32, i32)), CaptureError> {
    let mut screens = Screen::all().map_err(|e| CaptureError::Screen(e.to_string()))?;
    if screens.is_empty() {
        return Err(CaptureError::NoDisplay);
    }
    let index = match monitor {
        Some(i) if i < screens.len() => i,
        Some(_) => return Err(CaptureError::NoDisplay),
        None => screens
            .iter()
            .position(|s| s.display_info.is_primary)
            .unwrap_or(0),
    };
    let screen = screens.swap_remove(index);
    let origin = frame_origin((screen.display_info.x, screen.display_info.y), region);

    let shot = match region {
        Some(r) => screen.capture_area(r.x, r.y, r.width, r.height),
        None => screen.capture(),
    }
    .map_err(|e| CaptureError::Screen(e.to_string()))?;

    // Rebuild through raw bytes so the raster type is this crate's `image`.
    let (width, height) = (shot.width(), shot.height());
    let raster = RgbaImage::from_raw(width, height, shot.into_raw())
        .ok_or_else(|| CaptureError::Screen("capture buffer size mismatch".into()))?;
    Ok((raster, origin))
}

/// Desktop position of a capture: the display corner shifted by the
/// display-relative region, if any.
fn frame_origin(display: (i32, i32), region: Option<Region>) -> (i32, i32) {
    match region {
        Some(r) => (display.0.saturating_add(r.x), display.1.saturating_add(r.y)),
        None => display,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_combines_display_and_region() {
        assert_eq!(frame_origin((0, 0), None), (0, 0));
        assert_eq!(frame_origin((1920, 0), None), (1920, 0));

        let region = Region {
            x: 100,
            y: 100,
            width: 750,
            height: 480,
        };
        assert_eq!(frame_origin((0, 0), Some(region)), (100, 100));
        assert_eq!(frame_origin((-1280, 200), Some(region)), (-1180, 300));
    }

    #[test]
    fn overlay_at_region_corner_is_masked_at_raster_origin() {
        let region = Region {
            x: 100,
            y: 100,
            width: 40,
            height: 40,
        };
        let (x, y) = frame_origin((0, 0), Some(region));
        let raster = RgbaImage::from_pixel(40, 40, image::Rgba([255, 255, 255, 255]));
        let frame = Frame::from_raster(raster, Instant::now(), 0).with_origin(x, y);
        let overlay = Region {
            x: 100,
            y: 100,
            width: 10,
            height: 10,
        };
        let masked = frame.masked(overlay).unwrap().to_image().unwrap().to_rgba8();
        assert_eq!(masked.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(masked.get_pixel(10, 10).0, [255, 255, 255, 255]);
    }
}
