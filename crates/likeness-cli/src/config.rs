use std::path::PathBuf;

use likeness_core::decoder::DEFAULT_INPUT_SIZE;
use likeness_core::extractor::DEFAULT_MODEL_FILE;
use likeness_core::verify::DEFAULT_THRESHOLD;
use likeness_core::VerifyConfig;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Path to the ONNX embedding model file.
    pub model_path: PathBuf,
    /// Cosine similarity threshold for a positive verification.
    pub threshold: f32,
    /// Spatial size images are normalized to before embedding.
    pub input_size: u32,
}

impl Config {
    /// Load configuration from `LIKENESS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_path = std::env::var("LIKENESS_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| likeness_core::default_model_dir().join(DEFAULT_MODEL_FILE));

        Self {
            model_path,
            threshold: env_f32("LIKENESS_THRESHOLD", DEFAULT_THRESHOLD),
            input_size: env_u32("LIKENESS_INPUT_SIZE", DEFAULT_INPUT_SIZE),
        }
    }

    /// Pipeline configuration derived from this CLI configuration.
    pub fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            threshold: self.threshold,
            input_size: self.input_size,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
