//! Result and value types shared across the segmentation pipeline

use crate::color;
use crate::error::{GarmentError, Result};
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// An sRGB color carried together with its `#rrggbb` representation
///
/// Serialized as `{"rgb": [r, g, b], "hex": "#rrggbb"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "ColorDocument", try_from = "ColorDocument")]
pub struct Color {
    pub rgb: [u8; 3],
}

impl Color {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { rgb: [r, g, b] }
    }

    /// Parse a `#rrggbb` (or `rrggbb`) string
    ///
    /// # Errors
    /// Returns `ColorAnalysis` for malformed strings.
    pub fn from_hex(hex: &str) -> Result<Self> {
        color::hex_to_rgb(hex).map(|rgb| Self { rgb })
    }

    #[must_use]
    pub fn hex(&self) -> String {
        color::rgb_to_hex(self.rgb)
    }
}

impl From<[u8; 3]> for Color {
    fn from(rgb: [u8; 3]) -> Self {
        Self { rgb }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [r, g, b] = self.rgb;
        write!(f, "RGB({r}, {g}, {b}) {}", self.hex())
    }
}

#[derive(Serialize, Deserialize)]
struct ColorDocument {
    rgb: [u8; 3],
    hex: String,
}

impl From<Color> for ColorDocument {
    fn from(color: Color) -> Self {
        Self {
            rgb: color.rgb,
            hex: color.hex(),
        }
    }
}

impl TryFrom<ColorDocument> for Color {
    type Error = String;

    fn try_from(doc: ColorDocument) -> std::result::Result<Self, Self::Error> {
        let color = Self { rgb: doc.rgb };
        if color.hex() == doc.hex.to_ascii_lowercase() {
            Ok(color)
        } else {
            Err(format!(
                "hex '{}' does not match rgb {:?}",
                doc.hex, doc.rgb
            ))
        }
    }
}

/// Derived recommendation colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedColors {
    pub lighter_shade: Color,
    pub darker_shade: Color,
    pub complementary: Color,
    pub neutral_black: Color,
    pub neutral_white: Color,
}

/// Color report for the masked garment region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAnalysis {
    pub dominant_color: Color,
    /// Most to least prevalent, no duplicates
    pub palette: Vec<Color>,
    pub recommended_colors: RecommendedColors,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub masked_image_path: Option<PathBuf>,
}

/// Axis-aligned garment bounds in pixel coordinates
///
/// `x_max`/`y_max` are exclusive, so `width = x_max - x_min` and the crop is
/// `[x_min, x_max) x [y_min, y_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Build from exclusive bounds; `None` if the box would be empty
    #[must_use]
    pub fn from_bounds(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Option<Self> {
        (x_min < x_max && y_min < y_max).then(|| Self {
            x_min,
            y_min,
            x_max,
            y_max,
            width: x_max - x_min,
            height: y_max - y_min,
        })
    }

    /// Box around the foreground extents `min..=max`, padded and clipped
    ///
    /// The padded maximum is used as the exclusive end, so with zero padding
    /// the last foreground row and column fall outside the box. The box is
    /// widened to one pixel when padding and clipping would leave it empty.
    #[must_use]
    pub fn around_extents(
        min: (u32, u32),
        max: (u32, u32),
        padding: u32,
        width: u32,
        height: u32,
    ) -> Self {
        let x_min = min.0.saturating_sub(padding);
        let y_min = min.1.saturating_sub(padding);
        let x_max = max.0.saturating_add(padding).min(width).max(x_min + 1);
        let y_max = max.1.saturating_add(padding).min(height).max(y_min + 1);
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
            width: x_max - x_min,
            height: y_max - y_min,
        }
    }

    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.x_min <= other.x_min
            && self.y_min <= other.y_min
            && self.x_max >= other.x_max
            && self.y_max >= other.y_max
    }

    #[must_use]
    pub fn crop_size(&self) -> CropSize {
        CropSize {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSize {
    pub width: u32,
    pub height: u32,
}

/// Binary foreground mask (values 0 and 1), same extent as its source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    pub data: Vec<u8>,
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Build from a grayscale raster; any nonzero value is foreground
    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            data: gray.as_raw().iter().map(|&v| u8::from(v != 0)).collect(),
            dimensions: gray.dimensions(),
        }
    }

    /// Build from raw 0/1 data
    ///
    /// # Errors
    /// Returns `Processing` if the buffer length does not match the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(GarmentError::processing(format!(
                "Mask buffer has {} values, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data: data.into_iter().map(|v| u8::from(v != 0)).collect(),
            dimensions: (width, height),
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width() || y >= self.height() {
            return false;
        }
        self.data
            .get(y as usize * self.width() as usize + x as usize)
            .is_some_and(|&v| v != 0)
    }

    /// Number of foreground pixels
    #[must_use]
    pub fn area(&self) -> u64 {
        self.data.iter().filter(|&&v| v != 0).count() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Foreground bounds, padded and clipped
    ///
    /// # Errors
    /// Returns `NoRegionDetected` when the mask has no foreground.
    pub fn bounding_box(&self, padding: u32) -> Result<BoundingBox> {
        let (width, height) = self.dimensions;
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (i, _) in self.data.iter().enumerate().filter(|(_, &v)| v != 0) {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        let (x0, y0, x1, y1) = bounds.ok_or(GarmentError::NoRegionDetected)?;
        Ok(BoundingBox::around_extents((x0, y0), (x1, y1), padding, width, height))
    }

    /// 0/255 grayscale image suitable for saving
    #[must_use]
    pub fn to_image(&self) -> GrayImage {
        let (width, height) = self.dimensions;
        GrayImage::from_fn(width, height, |x, y| Luma([if self.get(x, y) { 255 } else { 0 }]))
    }

    /// Sub-mask covered by `bbox`
    #[must_use]
    pub fn crop(&self, bbox: &BoundingBox) -> Self {
        let mut data = Vec::with_capacity(bbox.width as usize * bbox.height as usize);
        for y in bbox.y_min..bbox.y_max {
            for x in bbox.x_min..bbox.x_max {
                data.push(u8::from(self.get(x, y)));
            }
        }
        Self {
            data,
            dimensions: (bbox.width, bbox.height),
        }
    }
}

/// Which segmenter produced the mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationMethod {
    Learned,
    Heuristic,
}

impl std::fmt::Display for SegmentationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Learned => write!(f, "learned"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Paths of the artifacts written for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_crop_path: Option<PathBuf>,
}

/// Successful segmentation of one image
#[derive(Debug, Clone, Serialize)]
pub struct GarmentSegmentation {
    pub method: SegmentationMethod,
    pub bbox: BoundingBox,
    pub mask_area: u64,
    pub crop_size: CropSize,
    #[serde(flatten)]
    pub artifacts: ArtifactPaths,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_analysis: Option<ColorAnalysis>,
    #[serde(skip)]
    pub mask: SegmentationMask,
    #[serde(skip)]
    pub crop: RgbImage,
    /// Why the learned path was not used, if it was attempted
    #[serde(skip)]
    pub fallback_reason: Option<String>,
}

/// Fatal outcome of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationFailure {
    pub error: String,
}

/// Outcome of one pipeline invocation
///
/// Serializes to a flat document: `{"success": true, ...fields}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum SegmentationResult {
    Success(GarmentSegmentation),
    Failure(SegmentationFailure),
}

impl SegmentationResult {
    #[must_use]
    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self::Failure(SegmentationFailure {
            error: error.into(),
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn as_success(&self) -> Option<&GarmentSegmentation> {
        match self {
            Self::Success(segmentation) => Some(segmentation),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(&failure.error),
        }
    }

    /// Render the flat JSON document
    ///
    /// # Errors
    /// Returns `Processing` if serialization fails.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        rendered.map_err(|e| GarmentError::processing(format!("Failed to serialize result: {e}")))
    }
}

impl Serialize for SegmentationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct SuccessDocument<'a> {
            success: bool,
            #[serde(flatten)]
            body: &'a GarmentSegmentation,
        }

        #[derive(Serialize)]
        struct FailureDocument<'a> {
            success: bool,
            error: &'a str,
        }

        match self {
            Self::Success(body) => SuccessDocument {
                success: true,
                body,
            }
            .serialize(serializer),
            Self::Failure(failure) => FailureDocument {
                success: false,
                error: &failure.error,
            }
            .serialize(serializer),
        }
    }
}
