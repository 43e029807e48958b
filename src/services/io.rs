//! Image I/O operations service
//!
//! Keeps file access out of the segmentation code so the pipeline can be
//! driven from memory in tests.

use crate::{
    error::{GarmentError, Result},
    types::SegmentationMask,
};
use image::{codecs::jpeg::JpegEncoder, GrayImage, RgbImage, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path as 8-bit RGB
    ///
    /// Falls back to content-based format detection when the extension is
    /// missing or wrong.
    ///
    /// # Errors
    /// Returns `ImageRead` if the file is missing or cannot be decoded.
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
        let path_ref = path.as_ref();

        if !path_ref.is_file() {
            return Err(GarmentError::image_read(format!(
                "'{}' does not exist or is not a file",
                path_ref.display()
            )));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img.to_rgb8()),
            Err(e) => {
                debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref).map_err(|io_err| {
                    GarmentError::image_read(format!("'{}': {io_err}", path_ref.display()))
                })?;
                image::load_from_memory(&data)
                    .map(|img| img.to_rgb8())
                    .map_err(|content_err| {
                        GarmentError::image_read(format!(
                            "'{}' ({} bytes): {content_err}",
                            path_ref.display(),
                            data.len()
                        ))
                    })
            },
        }
    }

    /// Decode an in-memory image as 8-bit RGB
    ///
    /// # Errors
    /// Returns `ImageRead` if the bytes are not a supported image.
    pub fn load_from_memory(bytes: &[u8]) -> Result<RgbImage> {
        image::load_from_memory(bytes)
            .map(|img| img.to_rgb8())
            .map_err(|e| {
                GarmentError::image_read(format!("{} byte buffer: {e}", bytes.len()))
            })
    }

    /// Create `dir` and its parents if missing
    ///
    /// # Errors
    /// Returns `Io` with the directory in the message.
    pub fn ensure_dir(dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| GarmentError::file_io_error("create output directory", dir, &e))
    }

    /// Save a binary mask as a 0/255 grayscale PNG
    ///
    /// # Errors
    /// Returns `Io`/`Image` errors from writing.
    pub fn save_mask(mask: &SegmentationMask, path: &Path) -> Result<()> {
        Self::save_gray_png(&mask.to_image(), path)
    }

    pub fn save_gray_png(image: &GrayImage, path: &Path) -> Result<()> {
        Self::prepare_parent(path)?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    pub fn save_rgba_png(image: &RgbaImage, path: &Path) -> Result<()> {
        Self::prepare_parent(path)?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Save an RGB image as JPEG with the given quality (1-100)
    ///
    /// # Errors
    /// Returns `Io`/`Image` errors from writing.
    pub fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
        Self::prepare_parent(path)?;
        let file = File::create(path)
            .map_err(|e| GarmentError::file_io_error("create image file", path, &e))?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100));
        encoder.encode_image(image)?;
        Ok(())
    }

    fn prepare_parent(path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Self::ensure_dir(parent),
            _ => Ok(()),
        }
    }
}
