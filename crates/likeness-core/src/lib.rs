//! likeness-core — ID-photo / selfie verification pipeline.
//!
//! Decodes a government-ID photo and a selfie into normalized tensors,
//! embeds both through a shared pre-trained model running via ONNX Runtime,
//! scores the pair with a degenerate-input-tolerant cosine similarity, and
//! applies a fixed threshold to produce one outcome record per pair.

pub mod decoder;
pub mod extractor;
pub mod similarity;
pub mod types;
pub mod verify;

pub use types::{Embedding, ImageSource, PixelBuffer, VerificationOutcome};
pub use verify::{Verifier, VerifyConfig, DEFAULT_THRESHOLD};

/// Default directory for ONNX model files, following the XDG base directory
/// convention.
pub fn default_model_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("likeness/models")
}
