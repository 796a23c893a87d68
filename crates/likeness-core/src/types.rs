use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fixed success message reported on completed verifications.
pub const COMPLETED_MESSAGE: &str = "Face verification completed successfully";

/// Normalized image tensor in HWC layout: shape (size, size, 3), RGB channel
/// order, values already scaled into the embedding model's input range.
pub type PixelBuffer = ndarray::Array3<f32>;

/// A reference to one input image. The decoder matches exhaustively on the
/// three forms; anything else is rejected at construction time, not at decode
/// time.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Image file on disk.
    Path(PathBuf),
    /// Encoded image bytes (JPEG, PNG, ...).
    Bytes(Vec<u8>),
    /// `data:image/...;base64,<payload>` string as received from a web layer.
    DataUri(String),
}

impl ImageSource {
    /// Classify a user-supplied string: strings carrying a `data:image`
    /// scheme are data URIs, everything else is treated as a filesystem path.
    pub fn from_user_input(input: &str) -> Self {
        if input.starts_with("data:image") {
            ImageSource::DataUri(input.to_string())
        } else {
            ImageSource::Path(PathBuf::from(input))
        }
    }

    /// Short description for log lines; never includes image payload bytes.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(p) => p.display().to_string(),
            ImageSource::Bytes(b) => format!("<{} bytes>", b.len()),
            ImageSource::DataUri(_) => "<data uri>".to_string(),
        }
    }
}

/// Face embedding vector (128-dimensional for the default model).
///
/// Carries no unit-norm guarantee: a degenerate input image (blank frame,
/// heavy occlusion) can produce an all-zero or non-finite vector, and the
/// scorer is the one responsible for handling that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "irv2_gap128").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome record for one gov-ID/selfie pair. Serializes to the flat JSON
/// object consumed by callers: `error` is present exactly when `success` is
/// false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub success: bool,
    pub match_score: f32,
    pub is_verified: bool,
    pub threshold: f32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationOutcome {
    /// Successful run: the pair was scored, verified iff the score reaches
    /// the threshold (boundary inclusive).
    pub fn completed(match_score: f32, threshold: f32) -> Self {
        Self {
            success: true,
            match_score,
            is_verified: match_score >= threshold,
            threshold,
            message: COMPLETED_MESSAGE.to_string(),
            error: None,
        }
    }

    /// Failed run: any stage error collapses to this shape, score pinned to
    /// 0.0 and the verdict to false.
    pub fn failed(error: String, threshold: f32) -> Self {
        Self {
            success: false,
            match_score: 0.0,
            is_verified: false,
            threshold,
            message: format!("Face verification failed: {error}"),
            error: Some(error),
        }
    }
}
