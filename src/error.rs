//! Error types for garment segmentation and color analysis

use thiserror::Error;

/// Result type alias for garment segmentation operations
pub type Result<T> = std::result::Result<T, GarmentError>;

/// Error taxonomy for the segmentation pipeline
///
/// Only [`GarmentError::ImageRead`] and [`GarmentError::NoRegionDetected`] end an
/// invocation with `success: false`. The remaining kinds are recovered inside the
/// stage that raised them and only surface on the diagnostic channel.
#[derive(Error, Debug)]
pub enum GarmentError {
    /// Source image missing, unreadable or corrupt
    #[error("Could not read image: {0}")]
    ImageRead(String),

    /// Post-processing left an empty foreground set
    #[error("No garment detected in image")]
    NoRegionDetected,

    /// Learned segmenter weights or runtime missing
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Masked image construction or quantization failed
    #[error("Color analysis failed: {0}")]
    ColorAnalysis(String),

    /// Palette extraction failed independently of the dominant color
    #[error("Palette extraction failed: {0}")]
    PaletteExtraction(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal processing failure (graph cut, tensor shapes, ...)
    #[error("Processing error: {0}")]
    Processing(String),

    /// Input/output errors (artifact writes, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl GarmentError {
    pub fn image_read<S: Into<String>>(msg: S) -> Self {
        Self::ImageRead(msg.into())
    }

    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn color_analysis<S: Into<String>>(msg: S) -> Self {
        Self::ColorAnalysis(msg.into())
    }

    pub fn palette_extraction<S: Into<String>>(msg: S) -> Self {
        Self::PaletteExtraction(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error ends the whole invocation rather than a single stage
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ImageRead(_) | Self::NoRegionDetected | Self::Io(_) | Self::Image(_)
        )
    }
}
