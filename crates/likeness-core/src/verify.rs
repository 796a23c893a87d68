//! Verification pipeline: decode both images, embed both, score, decide.
//!
//! `Verifier::verify` is a total function. Every stage error collapses into a
//! failure outcome; one bad image pair never takes down the host process.

use std::sync::Arc;

use thiserror::Error;

use crate::decoder::{self, DecodeError};
use crate::extractor::{ExtractError, FeatureExtractor};
use crate::similarity::{self, ScoreError};
use crate::types::{ImageSource, VerificationOutcome};

/// Default similarity threshold for a positive verification.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("image decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("embedding extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("similarity scoring failed: {0}")]
    Score(#[from] ScoreError),
}

/// Pipeline configuration.
///
/// The threshold changes verification strictness only, never the similarity
/// computation; it is reported back in every outcome, success or failure.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub threshold: f32,
    /// Spatial size images are normalized to before embedding.
    pub input_size: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            input_size: decoder::DEFAULT_INPUT_SIZE,
        }
    }
}

impl VerifyConfig {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

/// One-pair verifier. Holds a handle to the shared extractor; construction is
/// cheap, so callers may build one per request or keep one around.
pub struct Verifier {
    extractor: Arc<dyn FeatureExtractor>,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, config: VerifyConfig) -> Self {
        Self { extractor, config }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Verify that a government-ID photo and a selfie show the same person.
    ///
    /// Always returns an outcome record: scored pairs come back as a success
    /// shape (verified iff score >= threshold), any stage failure comes back
    /// as the failure shape with the error description.
    pub fn verify(&self, gov_id: &ImageSource, selfie: &ImageSource) -> VerificationOutcome {
        match self.run_pipeline(gov_id, selfie) {
            Ok(score) => {
                tracing::debug!(score, threshold = self.config.threshold, "pair scored");
                VerificationOutcome::completed(score, self.config.threshold)
            }
            Err(err) => {
                tracing::warn!(
                    gov_id = %gov_id.describe(),
                    selfie = %selfie.describe(),
                    error = %err,
                    "verification failed"
                );
                VerificationOutcome::failed(err.to_string(), self.config.threshold)
            }
        }
    }

    /// The fallible pipeline body: decode, embed, score, in stage order.
    /// A failure on either image aborts the whole pair.
    fn run_pipeline(&self, gov_id: &ImageSource, selfie: &ImageSource) -> Result<f32, VerifyError> {
        let gov_id_pixels = decoder::decode(gov_id, self.config.input_size)?;
        let selfie_pixels = decoder::decode(selfie, self.config.input_size)?;

        let gov_id_embedding = self.extractor.embed(&gov_id_pixels)?;
        let selfie_embedding = self.extractor.embed(&selfie_pixels)?;

        let score = similarity::score(&gov_id_embedding, &selfie_embedding)?;
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Embedding, PixelBuffer};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Always returns the same vector, whatever the input pixels.
    struct FixedExtractor {
        output: Vec<f32>,
    }

    impl FeatureExtractor for FixedExtractor {
        fn embed(&self, _pixels: &PixelBuffer) -> Result<Embedding, ExtractError> {
            Ok(Embedding {
                values: self.output.clone(),
                model_version: None,
            })
        }

        fn embedding_dim(&self) -> usize {
            self.output.len()
        }
    }

    /// Returns scripted vectors in order, one per embed call.
    struct ScriptedExtractor {
        script: Mutex<VecDeque<Vec<f32>>>,
    }

    impl ScriptedExtractor {
        fn new(outputs: &[&[f32]]) -> Self {
            Self {
                script: Mutex::new(outputs.iter().map(|v| v.to_vec()).collect()),
            }
        }
    }

    impl FeatureExtractor for ScriptedExtractor {
        fn embed(&self, _pixels: &PixelBuffer) -> Result<Embedding, ExtractError> {
            let values = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            Ok(Embedding {
                values,
                model_version: None,
            })
        }

        fn embedding_dim(&self) -> usize {
            2
        }
    }

    struct FailingExtractor;

    impl FeatureExtractor for FailingExtractor {
        fn embed(&self, _pixels: &PixelBuffer) -> Result<Embedding, ExtractError> {
            Err(ExtractError::Inference("incompatible input shape".into()))
        }

        fn embedding_dim(&self) -> usize {
            0
        }
    }

    fn png_source(value: u8) -> ImageSource {
        let img = RgbImage::from_pixel(4, 4, Rgb([value, value, value]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        ImageSource::Bytes(buf)
    }

    fn config() -> VerifyConfig {
        VerifyConfig {
            threshold: DEFAULT_THRESHOLD,
            input_size: 8,
        }
    }

    #[test]
    fn test_verify_identical_embeddings() {
        let verifier = Verifier::new(
            Arc::new(FixedExtractor {
                output: vec![0.6, 0.8, 0.0],
            }),
            config(),
        );
        let outcome = verifier.verify(&png_source(100), &png_source(100));

        assert!(outcome.success);
        assert!((outcome.match_score - 1.0).abs() < 1e-6);
        assert!(outcome.is_verified);
        assert_eq!(outcome.threshold, DEFAULT_THRESHOLD);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_verify_orthogonal_embeddings() {
        let verifier = Verifier::new(
            Arc::new(ScriptedExtractor::new(&[&[1.0, 0.0], &[0.0, 1.0]])),
            config(),
        );
        let outcome = verifier.verify(&png_source(100), &png_source(200));

        assert!(outcome.success);
        assert_eq!(outcome.match_score, 0.0);
        assert!(!outcome.is_verified);
    }

    #[test]
    fn test_verify_threshold_override() {
        let verifier = Verifier::new(
            Arc::new(FixedExtractor {
                output: vec![1.0, 0.0],
            }),
            VerifyConfig {
                threshold: 0.99,
                input_size: 8,
            },
        );
        let outcome = verifier.verify(&png_source(10), &png_source(10));

        // Identical stub output scores 1.0, which clears even a strict threshold.
        assert!(outcome.is_verified);
        assert_eq!(outcome.threshold, 0.99);
    }

    #[test]
    fn test_verify_nan_embedding_is_no_match_not_error() {
        let verifier = Verifier::new(
            Arc::new(ScriptedExtractor::new(&[&[f32::NAN, 1.0], &[1.0, 0.0]])),
            config(),
        );
        let outcome = verifier.verify(&png_source(100), &png_source(200));

        // Degenerate embedding degrades to score 0.0; the run itself succeeds.
        assert!(outcome.success);
        assert_eq!(outcome.match_score, 0.0);
        assert!(!outcome.is_verified);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_verify_zero_embedding_is_no_match() {
        let verifier = Verifier::new(
            Arc::new(ScriptedExtractor::new(&[&[0.0, 0.0], &[1.0, 0.0]])),
            config(),
        );
        let outcome = verifier.verify(&png_source(100), &png_source(200));

        assert!(outcome.success);
        assert_eq!(outcome.match_score, 0.0);
    }

    #[test]
    fn test_verify_missing_files() {
        let verifier = Verifier::new(
            Arc::new(FixedExtractor {
                output: vec![1.0, 0.0],
            }),
            config(),
        );
        let outcome = verifier.verify(
            &ImageSource::Path(PathBuf::from("/no/such/gov-id.jpg")),
            &ImageSource::Path(PathBuf::from("/no/such/selfie.jpg")),
        );

        assert!(!outcome.success);
        assert_eq!(outcome.match_score, 0.0);
        assert!(!outcome.is_verified);
        let error = outcome.error.as_deref().unwrap();
        assert!(!error.is_empty());
        assert!(outcome.message.starts_with("Face verification failed:"));
    }

    #[test]
    fn test_verify_first_image_failure_aborts_pair() {
        // The second (valid) image must never reach the extractor when the
        // first one fails to decode.
        let verifier = Verifier::new(Arc::new(ScriptedExtractor::new(&[])), config());
        let outcome = verifier.verify(
            &ImageSource::Bytes(vec![0xde, 0xad]),
            &png_source(100),
        );

        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_verify_extractor_failure() {
        let verifier = Verifier::new(Arc::new(FailingExtractor), config());
        let outcome = verifier.verify(&png_source(100), &png_source(200));

        assert!(!outcome.success);
        let error = outcome.error.as_deref().unwrap();
        assert!(error.contains("embedding extraction failed"), "error: {error}");
    }

    #[test]
    fn test_verify_mismatched_embedding_lengths() {
        let verifier = Verifier::new(
            Arc::new(ScriptedExtractor::new(&[&[1.0, 0.0, 0.0], &[1.0, 0.0]])),
            config(),
        );
        let outcome = verifier.verify(&png_source(100), &png_source(200));

        assert!(!outcome.success);
        let error = outcome.error.as_deref().unwrap();
        assert!(error.contains("length mismatch"), "error: {error}");
    }

    #[test]
    fn test_verify_same_bytes_twice_is_deterministic() {
        let verifier = Verifier::new(
            Arc::new(FixedExtractor {
                output: vec![0.3, 0.4, 0.5],
            }),
            config(),
        );
        let first = verifier.verify(&png_source(77), &png_source(77));
        let second = verifier.verify(&png_source(77), &png_source(77));

        assert_eq!(first.match_score, second.match_score);
        assert_eq!(first.is_verified, second.is_verified);
    }
}
