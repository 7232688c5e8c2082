use std::io::Cursor;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// The pixels carried inside a frame: either an already-decoded raster or
/// encoded image bytes (PNG/JPEG/...) that are decoded on demand.
#[derive(Debug, Clone)]
pub enum FramePayload {
    Raster(RgbaImage),
    Encoded(Vec<u8>),
}

/// One captured snapshot of the watched screen region.
///
/// Frames are immutable once captured; operations that alter pixels
/// (masking, snapshot encoding) produce new values.
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: FramePayload,
    pub captured_at: Instant,
    pub seq: u64,
    /// Desktop position of the top-left pixel. Non-zero when the source
    /// captured a secondary display or a sub-rectangle of one.
    pub origin: (i32, i32),
}

/// Axis-aligned rectangle. Overlay and mask rectangles are in desktop
/// coordinates; capture regions are relative to their display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn from_raster(image: RgbaImage, captured_at: Instant, seq: u64) -> Self {
        Self {
            payload: FramePayload::Raster(image),
            captured_at,
            seq,
            origin: (0, 0),
        }
    }

    pub fn from_encoded(bytes: Vec<u8>, captured_at: Instant, seq: u64) -> Self {
        Self {
            payload: FramePayload::Encoded(bytes),
            captured_at,
            seq,
            origin: (0, 0),
        }
    }

    pub fn with_origin(mut self, x: i32, y: i32) -> Self {
        self.origin = (x, y);
        self
    }

    /// The same frame with its payload decoded to a raster, so later
    /// comparisons and masking skip the image codec.
    pub fn decoded(self) -> Result<Frame, FrameError> {
        if matches!(self.payload, FramePayload::Raster(_)) {
            return Ok(self);
        }
        let raster = self.to_image()?.into_rgba8();
        Ok(Frame {
            payload: FramePayload::Raster(raster),
            ..self
        })
    }

    /// Decode the frame into an image. Fails for corrupt bytes and for
    /// zero-sized rasters, neither of which can be compared.
    pub fn to_image(&self) -> Result<DynamicImage, FrameError> {
        let image = match &self.payload {
            FramePayload::Raster(raster) => DynamicImage::ImageRgba8(raster.clone()),
            FramePayload::Encoded(bytes) => {
                if bytes.is_empty() {
                    return Err(FrameError::Empty);
                }
                image::load_from_memory(bytes).map_err(FrameError::Decode)?
            }
        };
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::Empty);
        }
        Ok(image)
    }

    /// Returns a copy of this frame with `region` (desktop coordinates)
    /// painted black, clipped to the frame bounds. Used to hide the overlay
    /// window from its own view.
    pub fn masked(&self, region: Region) -> Result<Frame, FrameError> {
        let mut raster = self.to_image()?.to_rgba8();
        let left = region.x as i64 - self.origin.0 as i64;
        let top = region.y as i64 - self.origin.1 as i64;
        paint_black(&mut raster, left, top, region.width, region.height);
        Ok(Frame {
            payload: FramePayload::Raster(raster),
            captured_at: self.captured_at,
            seq: self.seq,
            origin: self.origin,
        })
    }

    /// Encode a JPEG snapshot that fits within `max_dimension` on both axes,
    /// preserving aspect ratio. Smaller frames are never upscaled.
    pub fn encode_snapshot(&self, max_dimension: u32, quality: u8) -> Result<Vec<u8>, FrameError> {
        let mut image = self.to_image()?;
        if image.width() > max_dimension || image.height() > max_dimension {
            image = image.thumbnail(max_dimension, max_dimension);
        }
        // JPEG has no alpha channel.
        let rgb = image.to_rgb8();
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&rgb)
            .map_err(FrameError::Encode)?;
        Ok(buf.into_inner())
    }
}

fn paint_black(raster: &mut RgbaImage, left: i64, top: i64, width: u32, height: u32) {
    let (w, h) = (raster.width() as i64, raster.height() as i64);
    let x0 = left.clamp(0, w);
    let y0 = top.clamp(0, h);
    let x1 = (left + width as i64).clamp(0, w);
    let y1 = (top + height as i64).clamp(0, h);
    for y in y0..y1 {
        for x in x0..x1 {
            raster.put_pixel(x as u32, y as u32, Rgba([0, 0, 0, 255]));
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame has no pixels")]
    Empty,
    #[error("failed to decode frame: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode snapshot: {0}")]
    Encode(image::ImageError),
}
