//! Shared helpers for the integration tests: synthetic garment images and a
//! scripted inference backend

#![allow(dead_code)]

use garment_seg::{GarmentError, InferenceBackend, LearnedConfig, Result, WeightsStatus};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Solid `garment` square `[lo, hi)` on a solid `background`
pub fn framed_garment(size: u32, lo: u32, hi: u32, background: [u8; 3], garment: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgb(garment)
        } else {
            Rgb(background)
        }
    })
}

/// Two-tone garment: the top half of the square is `upper`, the bottom half `lower`
pub fn two_tone_garment(size: u32, lo: u32, hi: u32, upper: [u8; 3], lower: [u8; 3]) -> RgbImage {
    let middle = (lo + hi) / 2;
    RgbImage::from_fn(size, size, |x, y| {
        if !((lo..hi).contains(&x) && (lo..hi).contains(&y)) {
            Rgb([0, 0, 0])
        } else if y < middle {
            Rgb(upper)
        } else {
            Rgb(lower)
        }
    })
}

/// Save `image` as PNG under `dir` and return its path
pub fn save_png(dir: &Path, name: &str, image: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    image
        .save_with_format(&path, image::ImageFormat::Png)
        .expect("failed to write test image");
    path
}

/// Encode `image` as PNG bytes
pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("failed to encode test image");
    bytes
}

/// What the scripted backend does on `infer`
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Probability 1 on the centered half of each side, 0 elsewhere
    CenteredSquare,
    /// Constant probability everywhere
    Constant(f32),
    /// `infer` returns an inference error
    Fail,
    /// `infer` returns a map with the wrong number of channels
    WrongShape,
}

/// Inference backend driven by a [`Script`], recording every call
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    size: usize,
    script: Script,
    status: WeightsStatus,
    initialized: bool,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl ScriptedBackend {
    pub fn new(size: usize, script: Script) -> Self {
        Self {
            size,
            script,
            status: WeightsStatus::Trained,
            initialized: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn untrained(mut self) -> Self {
        self.status = WeightsStatus::Untrained;
        self
    }

    pub fn infer_count(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| **c == "infer").count())
            .unwrap_or(0)
    }

    fn record(&self, call: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl InferenceBackend for ScriptedBackend {
    fn initialize(&mut self, _config: &LearnedConfig) -> Result<Option<Duration>> {
        self.record("initialize");
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::ZERO))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record("infer");
        assert_eq!(input.dim(), self.input_shape(), "preprocessed tensor shape");

        let n = self.size;
        match self.script {
            Script::CenteredSquare => Ok(Array4::from_shape_fn((1, 1, n, n), |(_, _, y, x)| {
                let inside = |v: usize| (n / 4..n - n / 4).contains(&v);
                if inside(x) && inside(y) {
                    1.0
                } else {
                    0.0
                }
            })),
            Script::Constant(p) => Ok(Array4::from_elem((1, 1, n, n), p)),
            Script::Fail => Err(GarmentError::inference("scripted failure")),
            Script::WrongShape => Ok(Array4::zeros((1, 2, n, n))),
        }
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
        "scripted"
    }
}
