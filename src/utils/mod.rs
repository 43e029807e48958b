//! Utility modules shared by the segmenters

pub mod preprocessing;

pub use preprocessing::ImagePreprocessor;
