//! Face embedding extraction via ONNX Runtime.
//!
//! The embedding model is an opaque pre-trained graph (Inception-ResNet-v2
//! backbone, global average pooling, 128-unit projection) exported to ONNX.
//! It is expensive to construct and cheap to invoke, so one process-wide
//! instance is built lazily and shared by every verification call: two calls
//! that went through independently constructed sessions could disagree on the
//! same image, and sharing one instance removes that class of drift.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::types::{Embedding, PixelBuffer};

// --- Named constants ---
/// Output dimension of the default embedding graph.
pub const EMBEDDING_DIM: usize = 128;
/// Version tag stamped on embeddings produced by the default graph.
pub const MODEL_VERSION: &str = "irv2_gap128";
/// File name of the default embedding graph inside the model directory.
pub const DEFAULT_MODEL_FILE: &str = "irv2_gap128.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("model file not found: {0} (set LIKENESS_MODEL_PATH or place the exported graph in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Opaque embedding capability: normalized pixel tensor in, fixed-length
/// vector out. Implementations must be shareable across threads; pipeline
/// tests inject deterministic stubs through this seam.
pub trait FeatureExtractor: Send + Sync {
    fn embed(&self, pixels: &PixelBuffer) -> Result<Embedding, ExtractError>;

    /// Length of the vectors this extractor produces.
    fn embedding_dim(&self) -> usize;
}

/// ONNX-backed extractor. Inference calls are serialized through a mutex
/// because the session needs exclusive access to run; callers on any thread
/// may still share one instance freely.
#[derive(Debug)]
pub struct OnnxExtractor {
    session: Mutex<Session>,
}

impl OnnxExtractor {
    /// Load the embedding graph from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ExtractError> {
        if !model_path.exists() {
            return Err(ExtractError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn embed(&self, pixels: &PixelBuffer) -> Result<Embedding, ExtractError> {
        let input = to_nchw(pixels);

        let mut session = self
            .session
            .lock()
            .map_err(|_| ExtractError::Inference("embedding session mutex poisoned".into()))?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::Inference(format!("embedding extraction: {e}")))?;

        let values: Vec<f32> = raw.to_vec();
        if values.len() != EMBEDDING_DIM {
            return Err(ExtractError::Inference(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                values.len()
            )));
        }

        // Raw model output, returned as-is: no unit-norm guarantee and no NaN
        // scrubbing here. Degenerate-vector policy belongs to the scorer.
        Ok(Embedding {
            values,
            model_version: Some(MODEL_VERSION.to_string()),
        })
    }

    fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Repack an HWC pixel tensor into the NCHW layout the graph expects.
fn to_nchw(pixels: &PixelBuffer) -> Array4<f32> {
    let (height, width, channels) = pixels.dim();
    let mut tensor = Array4::<f32>::zeros((1, channels, height, width));

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                tensor[[0, c, y, x]] = pixels[[y, x, c]];
            }
        }
    }

    tensor
}

/// Shared handle to the process-wide extractor.
pub type SharedExtractor = Arc<dyn FeatureExtractor>;

static SHARED: Mutex<Option<SharedExtractor>> = Mutex::new(None);

fn shared_slot() -> std::sync::MutexGuard<'static, Option<SharedExtractor>> {
    // Poison only records a past panic in a holder; the slot is still coherent.
    SHARED.lock().unwrap_or_else(|e| e.into_inner())
}

/// Initialize the process-wide extractor from an ONNX model file.
///
/// Constructs at most once per process: the slot lock is held across model
/// loading, so concurrent first calls build exactly one session and every
/// caller receives the same instance for the process lifetime.
pub fn initialize(model_path: &Path) -> Result<SharedExtractor, ExtractError> {
    let mut slot = shared_slot();
    if let Some(existing) = slot.as_ref() {
        return Ok(Arc::clone(existing));
    }

    let extractor: SharedExtractor = Arc::new(OnnxExtractor::load(model_path)?);
    *slot = Some(Arc::clone(&extractor));
    tracing::info!(path = %model_path.display(), "shared extractor initialized");
    Ok(extractor)
}

/// Install a pre-built extractor as the process-wide instance. First install
/// wins; later calls receive the instance already in place.
pub fn install(extractor: SharedExtractor) -> SharedExtractor {
    let mut slot = shared_slot();
    if let Some(existing) = slot.as_ref() {
        return Arc::clone(existing);
    }
    *slot = Some(Arc::clone(&extractor));
    extractor
}

/// The process-wide extractor, if one has been initialized.
pub fn shared() -> Option<SharedExtractor> {
    shared_slot().as_ref().map(Arc::clone)
}

/// Drop the process-wide instance. Intended for tests and orderly teardown;
/// in-flight holders of the `Arc` keep working until they finish.
pub fn shutdown() {
    *shared_slot() = None;
}
