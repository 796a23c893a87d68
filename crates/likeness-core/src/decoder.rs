//! Image decoding and normalization.
//!
//! Turns a path, raw byte buffer, or base64 data URI into the fixed-size RGB
//! tensor the embedding model expects. All three forms funnel through the
//! same byte-decoding routine, so the same logical image produces numerically
//! identical tensors regardless of how it arrived.

use std::path::PathBuf;

use base64::Engine;
use image::imageops::FilterType;
use ndarray::Array3;
use thiserror::Error;

use crate::types::{ImageSource, PixelBuffer};

// --- Named constants ---
/// Default spatial size of the model input (299x299 for the Inception-family
/// backbone behind the default embedding graph).
pub const DEFAULT_INPUT_SIZE: u32 = 299;
/// Symmetric pixel normalization: (x - 127.5) / 127.5 maps [0, 255] to [-1, 1].
const INPUT_MEAN: f32 = 127.5;
const INPUT_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not read image file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not decode image data: {0}")]
    Malformed(#[from] image::ImageError),
    #[error("data URI has no comma separator")]
    MalformedDataUri,
    #[error("data URI payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Decode one image reference into a normalized `target_size` x `target_size`
/// RGB tensor.
///
/// Pure function of its input: no caching, no side effects. Fails fast on
/// anything that cannot be decoded; never returns a tensor of the wrong
/// shape.
pub fn decode(source: &ImageSource, target_size: u32) -> Result<PixelBuffer, DecodeError> {
    match source {
        ImageSource::Path(path) => {
            let bytes = std::fs::read(path).map_err(|source| DecodeError::Unreadable {
                path: path.clone(),
                source,
            })?;
            decode_bytes(&bytes, target_size)
        }
        ImageSource::Bytes(bytes) => decode_bytes(bytes, target_size),
        ImageSource::DataUri(uri) => {
            // "data:image/png;base64,AAAA..." -> payload after the first comma.
            let (_, payload) = uri.split_once(',').ok_or(DecodeError::MalformedDataUri)?;
            let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
            decode_bytes(&bytes, target_size)
        }
    }
}

/// Decode encoded image bytes, convert to RGB, resize, and scale.
///
/// RGB conversion happens before the resize (alpha is dropped, luma expanded)
/// and the resample filter is fixed to bilinear: both images of a pair must
/// go through the identical transform for their scores to be comparable.
fn decode_bytes(bytes: &[u8], target_size: u32) -> Result<PixelBuffer, DecodeError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    let resized = image::imageops::resize(&rgb, target_size, target_size, FilterType::Triangle);

    let size = target_size as usize;
    let mut pixels = Array3::<f32>::zeros((size, size, 3));
    for y in 0..target_size {
        for x in 0..target_size {
            let pixel = resized.get_pixel(x, y);
            for c in 0..3usize {
                pixels[[y as usize, x as usize, c]] = (pixel[c] as f32 - INPUT_MEAN) / INPUT_STD;
            }
        }
    }

    tracing::trace!(size = target_size, "image decoded and normalized");
    Ok(pixels)
}
