//! Test utilities and mock backends for testing inference functionality
//!
//! [`MockBackend`] implements `InferenceBackend` without any model so the
//! learned path and its fallbacks can be exercised deterministically.

use crate::{
    config::LearnedConfig,
    error::{GarmentError, Result},
    inference::{InferenceBackend, WeightsStatus},
};
use ndarray::Array4;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock writes into its probability map
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockOutput {
    /// Probability 1 inside the centered square covering `fraction` of each side
    CenteredSquare(f32),
    /// The same value everywhere
    Constant(f32),
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    size: usize,
    output: MockOutput,
    status: WeightsStatus,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    /// Trained mock producing a centered square covering half of each side
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            initialized: false,
            size,
            output: MockOutput::CenteredSquare(0.5),
            status: WeightsStatus::Trained,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn untrained(mut self) -> Self {
        self.status = WeightsStatus::Untrained;
        self
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init(size: usize) -> Self {
        let mut backend = Self::new(size);
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference(size: usize) -> Self {
        let mut backend = Self::new(size);
        backend.should_fail_inference = true;
        backend
    }

    /// Shared handle on the call history, usable after the backend is boxed
    #[must_use]
    pub fn history_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_mock_output(&self) -> Array4<f32> {
        let n = self.size;
        match self.output {
            MockOutput::Constant(value) => Array4::from_elem((1, 1, n, n), value),
            MockOutput::CenteredSquare(fraction) => {
                let side = (n as f32 * fraction).round() as usize;
                let lo = (n - side.min(n)) / 2;
                let hi = lo + side;
                Array4::from_shape_fn((1, 1, n, n), |(_, _, y, x)| {
                    if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                        1.0
                    } else {
                        0.0
                    }
                })
            },
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &LearnedConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(GarmentError::model_unavailable(
                "Mock backend initialization failed",
            ));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(GarmentError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(GarmentError::inference("Mock backend inference failed"));
        }
        if input.dim() != self.input_shape() {
            return Err(GarmentError::inference(format!(
                "Mock backend expected {:?}, got {:?}",
                self.input_shape(),
                input.dim()
            )));
        }
        Ok(self.generate_mock_output())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.size, self.size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, self.size, self.size)
    }

    fn weights_status(&self) -> WeightsStatus {
        self.status
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_records_calls() {
        let mut backend = MockBackend::new(16);
        backend.initialize(&LearnedConfig::default()).unwrap();
        backend.infer(&Array4::zeros((1, 3, 16, 16))).unwrap();
        assert_eq!(backend.get_call_history(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_centered_square_output() {
        let mut backend = MockBackend::new(16);
        backend.initialize(&LearnedConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 16, 16))).unwrap();
        assert_eq!(output.iter().filter(|&&p| p > 0.5).count(), 64);
        assert_eq!(output[[0, 0, 4, 4]], 1.0);
        assert_eq!(output[[0, 0, 3, 4]], 0.0);
    }

    #[test]
    fn test_failing_variants() {
        let mut failing_init = MockBackend::new_failing_init(16);
        assert!(failing_init.initialize(&LearnedConfig::default()).is_err());

        let mut failing_inference = MockBackend::new_failing_inference(16);
        failing_inference.initialize(&LearnedConfig::default()).unwrap();
        assert!(failing_inference.infer(&Array4::zeros((1, 3, 16, 16))).is_err());
    }
}
