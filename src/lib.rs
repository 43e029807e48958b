#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Garment Segmentation Library
//!
//! Extracts a garment's silhouette from a photograph and derives a color
//! palette from the masked region. Each invocation yields a binary mask, a
//! padded crop and a structured color report.
//!
//! ## Features
//!
//! - **Two segmenters**: a learned U²-Net-lite behind a pluggable
//!   [`InferenceBackend`] and a deterministic GrabCut pipeline used whenever
//!   the learned path is disabled, unavailable or fails
//! - **Color analysis**: modified median-cut palette, dominant color and
//!   lighter/darker/complementary recommendations
//! - **Backends**: built-in ndarray network (always) and Tract for ONNX
//!   exports (`tract` feature)
//! - **CLI Integration**: `garment-seg` binary printing one JSON document
//!   (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use garment_seg::{segment_garment, GarmentConfig};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = GarmentConfig::builder().palette_size(6).build()?;
//! let result = segment_garment("shirt.jpg", Some(Path::new("out")), &config)?;
//! println!("{}", result.to_json(true)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Reusing a processor
//!
//! ```rust,no_run
//! use garment_seg::{GarmentConfig, GarmentProcessor};
//!
//! # fn example(paths: &[&str]) -> anyhow::Result<()> {
//! let mut processor = GarmentProcessor::new(GarmentConfig::default())?;
//! for path in paths {
//!     let result = processor.process_file(path, None);
//!     if let Some(error) = result.error() {
//!         eprintln!("{path}: {error}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): ONNX backend on the pure Rust Tract runtime
//! - `cli` (default): command-line interface and stderr tracing subscriber
//! - `tracing-json`: JSON formatted diagnostics for the CLI
//! - `webp-support`: WebP input decoding

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod config;
pub mod error;
pub mod inference;
pub mod processor;
pub mod segmentation;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::path::Path;

// Public API exports
pub use backends::{NativeBackend, U2NetLite};
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use color::ColorAnalyzer;
pub use config::{
    ArtifactConfig, BackendType, ColorConfig, GarmentConfig, GarmentConfigBuilder,
    HeuristicConfig, LearnedConfig, UntrainedPolicy,
};
pub use error::{GarmentError, Result};
pub use inference::{InferenceBackend, PreprocessingConfig, WeightsStatus};
pub use processor::{BackendFactory, DefaultBackendFactory, GarmentProcessor};
pub use segmentation::{HeuristicSegmenter, LearnedSegmenter, Segmentation};
pub use services::ImageIOService;
pub use types::{
    ArtifactPaths, BoundingBox, Color, ColorAnalysis, CropSize, GarmentSegmentation,
    RecommendedColors, SegmentationFailure, SegmentationMask, SegmentationMethod,
    SegmentationResult,
};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Segment the garment in an image file
///
/// Builds a one-shot [`GarmentProcessor`]. Artifacts are written to
/// `output_dir` when it is given.
///
/// # Returns
///
/// `Ok` with either a success or a failure document. Unreadable input and
/// images without a detectable garment are failures, not errors.
///
/// # Errors
///
/// Returns `InvalidConfig` when `config` fails validation.
pub fn segment_garment<P: AsRef<Path>>(
    input_path: P,
    output_dir: Option<&Path>,
    config: &GarmentConfig,
) -> Result<SegmentationResult> {
    let mut processor = GarmentProcessor::new(config.clone())?;
    Ok(processor.process_file(input_path, output_dir))
}

/// Segment the garment in an encoded image held in memory
///
/// ```rust,no_run
/// use garment_seg::{segment_garment_from_bytes, GarmentConfig};
///
/// # fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let config = GarmentConfig::builder().enable_learned(false).build()?;
/// let result = segment_garment_from_bytes(&upload, None, &config)?;
/// if let Some(garment) = result.as_success() {
///     println!("{} foreground pixels", garment.mask_area);
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns `InvalidConfig` when `config` fails validation.
pub fn segment_garment_from_bytes(
    image_bytes: &[u8],
    output_dir: Option<&Path>,
    config: &GarmentConfig,
) -> Result<SegmentationResult> {
    let mut processor = GarmentProcessor::new(config.clone())?;
    Ok(processor.process_bytes(image_bytes, output_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_functions_report_failures() {
        let config = GarmentConfig::builder().enable_learned(false).build().unwrap();

        let result = segment_garment("/missing/input.png", None, &config).unwrap();
        assert!(!result.is_success());

        let result = segment_garment_from_bytes(&[0, 1, 2, 3], None, &config).unwrap();
        assert!(result.error().unwrap().starts_with("Could not read image"));
    }

    #[test]
    fn test_free_functions_validate_config() {
        let mut config = GarmentConfig::default();
        config.color.quality = 0;
        assert!(matches!(
            segment_garment("x.png", None, &config),
            Err(GarmentError::InvalidConfig(_))
        ));
    }
}
