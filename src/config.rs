//! Configuration types for garment segmentation and color analysis

use crate::error::{GarmentError, Result};
use crate::inference::PreprocessingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Built-in encoder-decoder evaluated with ndarray
    #[default]
    Native,
    /// ONNX export evaluated with Tract (requires the `tract` feature)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = GarmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(GarmentError::invalid_config(format!(
                "Unknown backend '{other}' (expected 'native' or 'tract')"
            ))),
        }
    }
}

/// What to do with learned-segmenter output when no trained weights were loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntrainedPolicy {
    /// Skip the learned path and use the heuristic segmenter
    #[default]
    Discard,
    /// Run the randomly initialised network anyway (demo quality)
    Accept,
}

/// Parameters of the classical segmentation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Canny hysteresis thresholds
    pub canny_low: f32,
    pub canny_high: f32,
    /// Seed rectangle margin as a fraction of `min(width, height)`
    pub rect_margin_ratio: f32,
    /// Graph-cut refinement iterations
    pub grabcut_iterations: u32,
    /// Summed absolute RGB distance below which a pixel matches a corner color
    pub corner_threshold: u32,
    /// Square kernel for the speckle opening/closing
    pub cleanup_kernel: u32,
    /// Square kernel for the final hole-filling closing
    pub fill_kernel: u32,
    /// Bounding box padding in pixels
    pub padding: u32,
    /// Seed for the k-means initialisation of the color models
    pub seed: u64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            rect_margin_ratio: 0.1,
            grabcut_iterations: 5,
            corner_threshold: 30,
            cleanup_kernel: 5,
            fill_kernel: 10,
            padding: 20,
            seed: 0,
        }
    }
}

/// Parameters of the neural segmentation path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfig {
    /// Try the learned segmenter before the heuristic one
    pub enabled: bool,
    pub backend: BackendType,
    /// Raw f32 weight blob (native) or ONNX file (tract)
    pub weights_path: Option<PathBuf>,
    /// Expected lowercase hex SHA-256 of the weights file
    pub weights_sha256: Option<String>,
    /// Square network input resolution
    pub input_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    /// Probability cut-off for foreground
    pub threshold: f32,
    pub cleanup_kernel: u32,
    pub padding: u32,
    /// Seed for random weight initialisation
    pub seed: u64,
    pub untrained_policy: UntrainedPolicy,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendType::Native,
            weights_path: None,
            weights_sha256: None,
            input_size: 320,
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
            threshold: 0.5,
            cleanup_kernel: 3,
            padding: 10,
            seed: 42,
            untrained_policy: UntrainedPolicy::Discard,
        }
    }
}

impl LearnedConfig {
    /// Preprocessing parameters handed to the backend
    #[must_use]
    pub fn preprocessing(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [self.input_size, self.input_size],
            normalization_mean: self.normalization_mean,
            normalization_std: self.normalization_std,
        }
    }
}

/// Parameters of the palette extraction stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Sample every n-th pixel; 1 is the most precise setting
    pub quality: u32,
    /// Maximum number of palette entries
    pub palette_size: usize,
    /// Write the transparent masked image next to the other artifacts
    pub save_masked_image: bool,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            quality: 1,
            palette_size: 5,
            save_masked_image: true,
        }
    }
}

/// Output artifact file names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub mask_file: String,
    pub crop_file: String,
    pub mask_crop_file: String,
    pub masked_file: String,
    /// JPEG quality for the crop (1-100)
    pub jpeg_quality: u8,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            mask_file: "garment_mask.png".to_string(),
            crop_file: "garment_crop.jpg".to_string(),
            mask_crop_file: "mask_crop.png".to_string(),
            masked_file: "masked_transparent.png".to_string(),
            jpeg_quality: 95,
        }
    }
}

/// Top-level configuration for [`crate::GarmentProcessor`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GarmentConfig {
    pub heuristic: HeuristicConfig,
    pub learned: LearnedConfig,
    pub color: ColorConfig,
    pub artifacts: ArtifactConfig,
}

impl GarmentConfig {
    #[must_use]
    pub fn builder() -> GarmentConfigBuilder {
        GarmentConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; absent fields keep their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GarmentError::file_io_error("read config", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            GarmentError::invalid_config(format!("Malformed config '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        let h = &self.heuristic;
        if !(h.canny_low >= 1.0 && h.canny_low <= h.canny_high) {
            return Err(GarmentError::config_value_error(
                "canny thresholds",
                format!("{}/{}", h.canny_low, h.canny_high),
                "1.0 <= low <= high",
                None,
            ));
        }
        if !(0.0..0.5).contains(&h.rect_margin_ratio) {
            return Err(GarmentError::config_value_error(
                "rectangle margin ratio",
                h.rect_margin_ratio,
                "0.0-0.5 (exclusive)",
                Some(0.1),
            ));
        }
        if h.grabcut_iterations == 0 {
            return Err(GarmentError::config_value_error(
                "graph-cut iterations",
                h.grabcut_iterations,
                ">= 1",
                Some(5),
            ));
        }
        for (name, k) in [
            ("heuristic cleanup kernel", h.cleanup_kernel),
            ("heuristic fill kernel", h.fill_kernel),
            ("learned cleanup kernel", self.learned.cleanup_kernel),
        ] {
            if k == 0 {
                return Err(GarmentError::config_value_error(name, k, ">= 1", None));
            }
        }

        let l = &self.learned;
        if l.input_size < 16 || l.input_size % 8 != 0 {
            return Err(GarmentError::config_value_error(
                "learned input size",
                l.input_size,
                "multiple of 8, >= 16",
                Some(320),
            ));
        }
        if !(l.threshold > 0.0 && l.threshold < 1.0) {
            return Err(GarmentError::config_value_error(
                "probability threshold",
                l.threshold,
                "0.0-1.0 (exclusive)",
                Some(0.5),
            ));
        }
        if l.normalization_std.iter().any(|s| *s <= 0.0) {
            return Err(GarmentError::invalid_config(
                "Normalization std values must be positive",
            ));
        }
        if let Some(digest) = &l.weights_sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(GarmentError::invalid_config(format!(
                    "Weights SHA-256 must be 64 hex characters, got '{digest}'"
                )));
            }
        }

        if self.color.quality == 0 {
            return Err(GarmentError::config_value_error(
                "color quality",
                self.color.quality,
                ">= 1",
                Some(1),
            ));
        }
        if self.color.palette_size == 0 || self.color.palette_size > 32 {
            return Err(GarmentError::config_value_error(
                "palette size",
                self.color.palette_size,
                "1-32",
                Some(5),
            ));
        }
        if !(1..=100).contains(&self.artifacts.jpeg_quality) {
            return Err(GarmentError::config_value_error(
                "JPEG quality",
                self.artifacts.jpeg_quality,
                "1-100",
                Some(95),
            ));
        }
        Ok(())
    }
}

/// Builder for `GarmentConfig`
#[derive(Debug, Default)]
pub struct GarmentConfigBuilder {
    config: GarmentConfig,
}

impl GarmentConfigBuilder {
    #[must_use]
    pub fn heuristic(mut self, heuristic: HeuristicConfig) -> Self {
        self.config.heuristic = heuristic;
        self
    }

    #[must_use]
    pub fn learned(mut self, learned: LearnedConfig) -> Self {
        self.config.learned = learned;
        self
    }

    #[must_use]
    pub fn color(mut self, color: ColorConfig) -> Self {
        self.config.color = color;
        self
    }

    #[must_use]
    pub fn artifacts(mut self, artifacts: ArtifactConfig) -> Self {
        self.config.artifacts = artifacts;
        self
    }

    #[must_use]
    pub fn enable_learned(mut self, enabled: bool) -> Self {
        self.config.learned.enabled = enabled;
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.learned.backend = backend;
        self
    }

    #[must_use]
    pub fn weights_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.learned.weights_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn weights_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.config.learned.weights_sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    #[must_use]
    pub fn untrained_policy(mut self, policy: UntrainedPolicy) -> Self {
        self.config.learned.untrained_policy = policy;
        self
    }

    #[must_use]
    pub fn input_size(mut self, size: u32) -> Self {
        self.config.learned.input_size = size;
        self
    }

    #[must_use]
    pub fn color_quality(mut self, quality: u32) -> Self {
        self.config.color.quality = quality;
        self
    }

    #[must_use]
    pub fn palette_size(mut self, size: usize) -> Self {
        self.config.color.palette_size = size;
        self
    }

    #[must_use]
    pub fn save_masked_image(mut self, save: bool) -> Self {
        self.config.color.save_masked_image = save;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Propagates [`GarmentConfig::validate`] failures.
    pub fn build(self) -> Result<GarmentConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
