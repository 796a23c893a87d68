//! Per-pair image diagnostics for the analyze subcommand.
//!
//! Everything here is narration for operators debugging poor scores; none of
//! it feeds back into the verification decision.

use std::path::Path;

use image::GenericImageView;

/// Basic properties of one input image.
pub struct ImageStats {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Mean luma over the whole image, in [0, 255].
    pub brightness: f32,
}

pub fn image_stats(path: &Path) -> Result<ImageStats, image::ImageError> {
    let img = image::open(path)?;
    let (width, height) = img.dimensions();
    let channels = img.color().channel_count();

    let luma = img.to_luma8();
    let sum: u64 = luma.pixels().map(|p| u64::from(p[0])).sum();
    let brightness = sum as f32 / (u64::from(width) * u64::from(height)) as f32;

    Ok(ImageStats {
        width,
        height,
        channels,
        brightness,
    })
}

/// Diagnostic narration for a similarity score. The bands match the analysis
/// tooling this replaces; the decision contract only ever uses the threshold.
pub fn score_band(score: f32) -> &'static str {
    if score < 0.5 {
        "very low similarity - likely different people"
    } else if score < 0.7 {
        "moderate similarity - might be same person with variations"
    } else {
        "high similarity - likely same person"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Write;

    fn write_png(img: RgbImage) -> tempfile::NamedTempFile {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&buf).unwrap();
        file
    }

    #[test]
    fn test_image_stats_dimensions_and_channels() {
        let file = write_png(RgbImage::from_pixel(10, 5, Rgb([0, 0, 0])));
        let stats = image_stats(file.path()).unwrap();
        assert_eq!((stats.width, stats.height), (10, 5));
        assert_eq!(stats.channels, 3);
    }

    #[test]
    fn test_image_stats_brightness_extremes() {
        let white = write_png(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let black = write_png(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
        assert!((image_stats(white.path()).unwrap().brightness - 255.0).abs() < 1.0);
        assert!(image_stats(black.path()).unwrap().brightness < 1.0);
    }

    #[test]
    fn test_image_stats_unreadable() {
        assert!(image_stats(Path::new("/nonexistent/selfie.png")).is_err());
    }

    #[test]
    fn test_score_bands() {
        assert!(score_band(0.12).contains("likely different"));
        assert!(score_band(0.49).contains("likely different"));
        assert!(score_band(0.5).contains("might be same"));
        assert!(score_band(0.69).contains("might be same"));
        assert!(score_band(0.7).contains("likely same"));
        assert!(score_band(0.98).contains("likely same"));
    }
}
