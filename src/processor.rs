//! Unified garment segmentation processor
//!
//! `GarmentProcessor` owns both segmenters and the color analyzer and makes
//! the learned-or-heuristic decision for every invocation. The CLI and the
//! free functions in the crate root all go through it.

use crate::{
    backends::NativeBackend,
    color::ColorAnalyzer,
    config::{BackendType, GarmentConfig, LearnedConfig},
    error::{GarmentError, Result},
    inference::InferenceBackend,
    segmentation::{HeuristicSegmenter, LearnedSegmenter, Segmentation},
    services::ImageIOService,
    tracing_config::{events, spans},
    types::{ArtifactPaths, GarmentSegmentation, SegmentationMethod, SegmentationResult},
};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance for the configured backend type
    ///
    /// # Errors
    ///
    /// Returns `ModelUnavailable` for backend types not compiled into this build.
    fn create_backend(&self, config: &LearnedConfig) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Default backend factory: native always, tract with the `tract` feature
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, config: &LearnedConfig) -> Result<Box<dyn InferenceBackend>> {
        match config.backend {
            BackendType::Native => Ok(Box::new(NativeBackend::new())),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            #[cfg(not(feature = "tract"))]
            BackendType::Tract => Err(GarmentError::model_unavailable(
                "Tract backend not compiled in (enable the `tract` feature)",
            )),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        [
            Some(BackendType::Native),
            cfg!(feature = "tract").then_some(BackendType::Tract),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// State of the learned path for the lifetime of a processor
#[derive(Debug)]
enum LearnedPath {
    Disabled,
    /// The backend could not be created; every invocation falls back
    Unavailable(String),
    Ready(Box<LearnedSegmenter>),
}

/// Garment segmentation processor
#[derive(Debug)]
pub struct GarmentProcessor {
    config: GarmentConfig,
    learned: LearnedPath,
    heuristic: HeuristicSegmenter,
    color: ColorAnalyzer,
}

impl GarmentProcessor {
    /// Create a new processor with the default backend factory
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the configuration fails validation.
    pub fn new(config: GarmentConfig) -> Result<Self> {
        Self::with_factory(config, &DefaultBackendFactory)
    }

    /// Create a new processor with a custom backend factory
    ///
    /// A factory error does not fail construction; the learned path is then
    /// reported unavailable on every invocation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the configuration fails validation.
    pub fn with_factory(config: GarmentConfig, factory: &dyn BackendFactory) -> Result<Self> {
        config.validate()?;
        let learned = if config.learned.enabled {
            match factory.create_backend(&config.learned) {
                Ok(backend) => LearnedPath::Ready(Box::new(LearnedSegmenter::new(
                    config.learned.clone(),
                    backend,
                ))),
                Err(e) => {
                    debug!(error = %e, "Learned backend could not be created");
                    LearnedPath::Unavailable(e.to_string())
                },
            }
        } else {
            LearnedPath::Disabled
        };
        Ok(Self::assemble(config, learned))
    }

    /// Create a processor around an already constructed backend
    ///
    /// The backend is used even when `config.learned.enabled` is false.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the configuration fails validation.
    pub fn with_backend(config: GarmentConfig, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        config.validate()?;
        let segmenter = LearnedSegmenter::new(config.learned.clone(), backend);
        Ok(Self::assemble(config, LearnedPath::Ready(Box::new(segmenter))))
    }

    fn assemble(config: GarmentConfig, learned: LearnedPath) -> Self {
        Self {
            heuristic: HeuristicSegmenter::new(config.heuristic.clone()),
            color: ColorAnalyzer::new(config.color.clone(), &config.artifacts),
            learned,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GarmentConfig {
        &self.config
    }

    /// Name of the learned backend, if one was created
    #[must_use]
    pub fn learned_backend(&self) -> Option<&'static str> {
        match &self.learned {
            LearnedPath::Ready(segmenter) => Some(segmenter.backend_name()),
            LearnedPath::Disabled | LearnedPath::Unavailable(_) => None,
        }
    }

    /// Segment an image file and analyze its colors
    ///
    /// Never fails: unreadable input and empty masks become
    /// [`SegmentationResult::Failure`].
    pub fn process_file<P: AsRef<Path>>(
        &mut self,
        input_path: P,
        output_dir: Option<&Path>,
    ) -> SegmentationResult {
        let input_path = input_path.as_ref();
        let span = spans::file_processing(&input_path.display().to_string());
        let _enter = span.enter();

        match ImageIOService::load_image(input_path) {
            Ok(image) => self.process_image(&image, output_dir),
            Err(e) => {
                info!(error = %e, "Input could not be loaded");
                SegmentationResult::failure(e.to_string())
            },
        }
    }

    /// Segment an encoded image held in memory
    pub fn process_bytes(&mut self, bytes: &[u8], output_dir: Option<&Path>) -> SegmentationResult {
        let span = spans::file_processing("<memory>");
        let _enter = span.enter();

        match ImageIOService::load_from_memory(bytes) {
            Ok(image) => self.process_image(&image, output_dir),
            Err(e) => {
                info!(error = %e, "Input could not be decoded");
                SegmentationResult::failure(e.to_string())
            },
        }
    }

    /// Segment a decoded image
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn process_image(&mut self, image: &RgbImage, output_dir: Option<&Path>) -> SegmentationResult {
        let start = Instant::now();

        let (segmentation, method, fallback_reason) = match self.segment_learned(image) {
            Some(Ok(segmentation)) => (segmentation, SegmentationMethod::Learned, None),
            attempt => {
                let reason = attempt.and_then(|r| r.err()).map(|e| e.to_string());
                if let Some(reason) = &reason {
                    events::fallback(reason);
                }
                let span = spans::segmentation("heuristic", image.dimensions());
                let _enter = span.enter();
                match self.heuristic.segment(image) {
                    Ok(segmentation) => (segmentation, SegmentationMethod::Heuristic, reason),
                    Err(e) => {
                        info!(error = %e, "Heuristic segmentation failed");
                        return SegmentationResult::failure(e.to_string());
                    },
                }
            },
        };
        events::performance_metric("segmentation", start.elapsed().as_millis());

        let artifacts = match output_dir {
            Some(dir) => match self.write_artifacts(&segmentation, dir) {
                Ok(paths) => paths,
                Err(e) => return SegmentationResult::failure(e.to_string()),
            },
            None => ArtifactPaths::default(),
        };

        let color_analysis = {
            let span = spans::color_analysis(segmentation.area());
            let _enter = span.enter();
            match self.color.analyze(image, &segmentation.mask, output_dir) {
                Ok(analysis) => Some(analysis),
                Err(e) => {
                    events::degraded("color analysis", &e);
                    None
                },
            }
        };

        info!(
            method = %method,
            mask_area = segmentation.area(),
            elapsed_ms = start.elapsed().as_millis(),
            "Garment segmented"
        );

        let Segmentation { mask, bbox, crop } = segmentation;
        SegmentationResult::Success(GarmentSegmentation {
            method,
            bbox,
            mask_area: mask.area(),
            crop_size: bbox.crop_size(),
            artifacts,
            color_analysis,
            mask,
            crop,
            fallback_reason,
        })
    }

    /// `None` when the learned path is disabled
    fn segment_learned(&mut self, image: &RgbImage) -> Option<Result<Segmentation>> {
        match &mut self.learned {
            LearnedPath::Disabled => None,
            LearnedPath::Unavailable(reason) => {
                Some(Err(GarmentError::model_unavailable(reason.clone())))
            },
            LearnedPath::Ready(segmenter) => {
                let span = spans::segmentation("learned", image.dimensions());
                let _enter = span.enter();
                Some(segmenter.segment(image))
            },
        }
    }

    /// Write mask, crop and mask crop into `dir`
    ///
    /// All or nothing: when one write fails, every file this call started
    /// writing is removed before the error is returned.
    fn write_artifacts(&self, segmentation: &Segmentation, dir: &Path) -> Result<ArtifactPaths> {
        let span = spans::postprocessing("write_artifacts");
        let _enter = span.enter();

        ImageIOService::ensure_dir(dir)?;

        let mut written = Vec::with_capacity(3);
        let result = self.write_each_artifact(segmentation, dir, &mut written);
        if result.is_err() {
            remove_partial_artifacts(&written);
        }
        result
    }

    fn write_each_artifact(
        &self,
        segmentation: &Segmentation,
        dir: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<ArtifactPaths> {
        let names = &self.config.artifacts;

        let mask_path = dir.join(&names.mask_file);
        written.push(mask_path.clone());
        ImageIOService::save_mask(&segmentation.mask, &mask_path)?;
        events::artifact_written("mask", &mask_path);

        let crop_path = dir.join(&names.crop_file);
        written.push(crop_path.clone());
        ImageIOService::save_jpeg(&segmentation.crop, &crop_path, names.jpeg_quality)?;
        events::artifact_written("crop", &crop_path);

        let mask_crop_path = dir.join(&names.mask_crop_file);
        written.push(mask_crop_path.clone());
        ImageIOService::save_mask(&segmentation.mask.crop(&segmentation.bbox), &mask_crop_path)?;
        events::artifact_written("mask_crop", &mask_crop_path);

        Ok(ArtifactPaths {
            mask_path: Some(mask_path),
            crop_path: Some(crop_path),
            mask_crop_path: Some(mask_crop_path),
        })
    }
}

fn remove_partial_artifacts(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed partial artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial artifact"),
        }
    }
}
