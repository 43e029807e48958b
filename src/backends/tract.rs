//! Tract backend running an ONNX export of the segmentation network
//!
//! The model is read from `LearnedConfig::weights_path`, pinned to a
//! `1x3xNxN` input of the configured size and optimized once. The first
//! model output is taken as the fused probability map.

use super::read_weights;
use crate::config::LearnedConfig;
use crate::error::{GarmentError, Result};
use crate::inference::{InferenceBackend, WeightsStatus};
use ndarray::Array4;
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;
use tracing::{debug, info};

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for ONNX segmentation models using pure Rust inference
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    input_size: usize,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and optimize the ONNX model
    fn load_model(&mut self, config: &LearnedConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let path = config.weights_path.as_ref().ok_or_else(|| {
            GarmentError::model_unavailable("Tract backend needs an ONNX model path")
        })?;
        let model_data = read_weights(path, config.weights_sha256.as_deref())?;
        let size = config.input_size as usize;

        info!(
            path = %path.display(),
            size_mb = model_data.len() as f64 / (1024.0 * 1024.0),
            input_size = size,
            "Initializing Tract backend"
        );

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| GarmentError::model_unavailable(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| GarmentError::model_unavailable(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| GarmentError::model_unavailable(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                GarmentError::model_unavailable(format!("Failed to create runnable model: {e}"))
            })?;

        self.model = Some(model);
        self.input_size = size;

        let model_load_time = model_load_start.elapsed();
        info!(elapsed_ms = model_load_time.as_millis(), "Tract backend initialized");
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &LearnedConfig) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None); // No model loading time for already initialized backend
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| GarmentError::inference("Tract model not initialized"))?;

        debug!(shape = ?input.shape(), "Running Tract inference");
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| GarmentError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| GarmentError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            GarmentError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let output_array = output_data
            .to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| {
                GarmentError::inference(format!(
                    "Expected 4D output tensor, got shape {:?}: {e}",
                    output_data.shape()
                ))
            })?;

        debug!(
            elapsed_ms = inference_start.elapsed().as_millis(),
            shape = ?output_array.shape(),
            "Tract inference completed"
        );
        Ok(output_array)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.input_size, self.input_size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, self.input_size, self.input_size)
    }

    fn weights_status(&self) -> WeightsStatus {
        WeightsStatus::Trained
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}
