use image::imageops::FilterType;
use image::GrayImage;
use vision_hud_common::frame::Frame;

use super::traits::{CompareError, FrameComparator};

/// Mean absolute luminance difference on a small thumbnail.
///
/// Both frames are downsampled to `size x size` grayscale before comparing,
/// which suppresses capture noise and makes the score measure how much of
/// the visible area changed rather than exact edits. Frames of different
/// resolutions or encodings compare fine. Scores range over 0..=255.
pub struct LumaDiffComparator {
    size: u32,
}

impl LumaDiffComparator {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    fn thumbnail(&self, frame: &Frame) -> Result<GrayImage, CompareError> {
        let image = frame.to_image()?;
        Ok(image
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_luma8())
    }
}

impl Default for LumaDiffComparator {
    fn default() -> Self {
        Self::new(32)
    }
}

impl FrameComparator for LumaDiffComparator {
    fn score(&self, baseline: &Frame, current: &Frame) -> Result<f64, CompareError> {
        let a = self.thumbnail(baseline)?;
        let b = self.thumbnail(current)?;

        let total: u64 = a
            .pixels()
            .zip(b.pixels())
            .map(|(p, q)| p.0[0].abs_diff(q.0[0]) as u64)
            .sum();
        let pixels = (self.size as u64) * (self.size as u64);
        Ok(total as f64 / pixels as f64)
    }

    fn name(&self) -> &str {
        "luma-diff"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::time::Instant;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_raster(
            RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255])),
            Instant::now(),
            0,
        )
    }

    #[test]
    fn identical_frames_score_zero() {
        let cmp = LumaDiffComparator::default();
        let score = cmp.score(&solid(320, 200, 77), &solid(320, 200, 77)).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn black_versus_white_scores_maximum() {
        let cmp = LumaDiffComparator::default();
        let score = cmp.score(&solid(64, 64, 0), &solid(64, 64, 255)).unwrap();
        assert!((score - 255.0).abs() < 1.0, "score was {score}");
    }

    #[test]
    fn different_resolutions_and_encodings_compare() {
        let raster = RgbaImage::from_pixel(100, 60, Rgba([40, 40, 40, 255]));
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(raster)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();
        let encoded = Frame::from_encoded(png.into_inner(), Instant::now(), 1);

        let cmp = LumaDiffComparator::default();
        let score = cmp.score(&solid(1920, 1080, 40), &encoded).unwrap();
        assert!(score < 1.0, "score was {score}");
    }

    #[test]
    fn score_tracks_changed_area() {
        // Left half of the current frame turns white.
        let mut half = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        for y in 0..64 {
            for x in 0..32 {
                half.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let current = Frame::from_raster(half, Instant::now(), 1);

        let cmp = LumaDiffComparator::default();
        let score = cmp.score(&solid(64, 64, 0), &current).unwrap();
        assert!((score - 127.5).abs() < 8.0, "score was {score}");
    }

    #[test]
    fn corrupt_frame_is_an_error() {
        let cmp = LumaDiffComparator::default();
        let corrupt = Frame::from_encoded(b"not an image".to_vec(), Instant::now(), 1);
        assert!(cmp.score(&solid(8, 8, 0), &corrupt).is_err());
    }
}
