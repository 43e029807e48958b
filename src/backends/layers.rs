//! Tensor primitives for the native network
//!
//! Feature maps are `Array3<f32>` in `(channels, height, width)` order.

use crate::error::{GarmentError, Result};
use ndarray::{concatenate, linalg::general_mat_mul, s, Array1, Array2, Array3, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Shape of one convolution layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub dilation: usize,
}

impl ConvSpec {
    #[must_use]
    pub const fn new(in_channels: usize, out_channels: usize, kernel: usize, dilation: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            dilation,
        }
    }

    #[must_use]
    pub fn fan_in(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    /// Weights plus biases
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.out_channels * self.fan_in() + self.out_channels
    }
}

/// Where layer parameters come from while a network is built
#[derive(Debug)]
pub enum ParamSource<'a> {
    /// Uniform in `±1/sqrt(fan_in)`
    Random(StdRng),
    /// Consecutive values of a flat parameter blob
    Blob { data: &'a [f32], offset: usize },
}

impl<'a> ParamSource<'a> {
    #[must_use]
    pub fn random(seed: u64) -> Self {
        Self::Random(StdRng::seed_from_u64(seed))
    }

    #[must_use]
    pub fn blob(data: &'a [f32]) -> Self {
        Self::Blob { data, offset: 0 }
    }

    fn take(&mut self, n: usize, fan_in: usize) -> Result<Vec<f32>> {
        match self {
            Self::Random(rng) => {
                let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
                Ok((0..n).map(|_| rng.random_range(-bound..bound)).collect())
            },
            Self::Blob { data, offset } => {
                let values = data.get(*offset..*offset + n).ok_or_else(|| {
                    GarmentError::model_unavailable(format!(
                        "Weight blob ended at value {} while {n} more were needed",
                        data.len()
                    ))
                })?;
                *offset += n;
                Ok(values.to_vec())
            },
        }
    }

    /// Values left unread in a blob source
    #[must_use]
    pub fn remaining(&self) -> usize {
        match self {
            Self::Random(_) => 0,
            Self::Blob { data, offset } => data.len().saturating_sub(*offset),
        }
    }
}

/// Same-padded 2-D convolution
#[derive(Debug, Clone)]
pub struct Conv2d {
    spec: ConvSpec,
    /// `[out, in, kernel * kernel]`
    weight: Array3<f32>,
    bias: Array1<f32>,
}

impl Conv2d {
    /// Read the weight `[out, in, kh, kw]` then the bias `[out]` from `params`
    ///
    /// # Errors
    /// Returns `ModelUnavailable` when a blob runs out of values.
    pub fn new(spec: ConvSpec, params: &mut ParamSource<'_>) -> Result<Self> {
        let taps = spec.kernel * spec.kernel;
        let weights = params.take(spec.out_channels * spec.fan_in(), spec.fan_in())?;
        let bias = params.take(spec.out_channels, spec.fan_in())?;
        let weight = Array3::from_shape_vec((spec.out_channels, spec.in_channels, taps), weights)
            .map_err(|e| GarmentError::processing(format!("Conv weight shape: {e}")))?;
        Ok(Self {
            spec,
            weight,
            bias: Array1::from_vec(bias),
        })
    }

    #[must_use]
    pub fn spec(&self) -> &ConvSpec {
        &self.spec
    }

    /// Convolve with zero padding `dilation * (kernel / 2)`, keeping the spatial size
    ///
    /// Each kernel tap becomes one matrix product of the `(out, in)` tap
    /// weights with a shifted copy of the input.
    ///
    /// # Errors
    /// Returns `Inference` on a channel mismatch.
    pub fn forward(&self, input: &Array3<f32>) -> Result<Array3<f32>> {
        let (c_in, h, w) = input.dim();
        if c_in != self.spec.in_channels {
            return Err(GarmentError::inference(format!(
                "Convolution expects {} channels, got {c_in}",
                self.spec.in_channels
            )));
        }
        let k = self.spec.kernel;
        let half = (k / 2) as isize;
        let dilation = self.spec.dilation as isize;
        let (hi, wi) = (h as isize, w as isize);

        let mut out = Array2::<f32>::zeros((self.spec.out_channels, h * w));
        let mut shifted = Array3::<f32>::zeros((c_in, h, w));
        for ky in 0..k {
            for kx in 0..k {
                let dy = (ky as isize - half) * dilation;
                let dx = (kx as isize - half) * dilation;
                // output rows/cols whose source pixel lies inside the input
                let (y0, y1) = ((-dy).max(0), (hi - dy).min(hi));
                let (x0, x1) = ((-dx).max(0), (wi - dx).min(wi));
                if y0 >= y1 || x0 >= x1 {
                    continue;
                }

                shifted.fill(0.0);
                shifted
                    .slice_mut(s![.., y0..y1, x0..x1])
                    .assign(&input.slice(s![.., y0 + dy..y1 + dy, x0 + dx..x1 + dx]));
                let columns = shifted
                    .view()
                    .into_shape_with_order((c_in, h * w))
                    .map_err(|e| GarmentError::inference(format!("Conv reshape: {e}")))?;
                let tap = self.weight.slice(s![.., .., ky * k + kx]);
                general_mat_mul(1.0, &tap, &columns, 1.0, &mut out);
            }
        }

        out += &self.bias.view().insert_axis(Axis(1));
        out.into_shape_with_order((self.spec.out_channels, h, w))
            .map_err(|e| GarmentError::inference(format!("Conv output reshape: {e}")))
    }
}

pub fn relu(mut x: Array3<f32>) -> Array3<f32> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

pub fn sigmoid(mut x: Array3<f32>) -> Array3<f32> {
    x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
    x
}

/// 2x2 max pooling with stride 2, rounding the output size up
#[must_use]
pub fn max_pool2(x: &Array3<f32>) -> Array3<f32> {
    let (c, h, w) = x.dim();
    let (oh, ow) = (h.div_ceil(2), w.div_ceil(2));
    Array3::from_shape_fn((c, oh, ow), |(ch, oy, ox)| {
        let ys = 2 * oy..(2 * oy + 2).min(h);
        let xs = 2 * ox..(2 * ox + 2).min(w);
        x.slice(s![ch, ys, xs])
            .iter()
            .fold(f32::NEG_INFINITY, |m, &v| m.max(v))
    })
}

/// Bilinear resize of every channel with half-pixel centres
///
/// Source coordinates are `(dst + 0.5) * in / out - 0.5`, clamped at zero.
#[must_use]
pub fn resize_bilinear(x: &Array3<f32>, out_h: usize, out_w: usize) -> Array3<f32> {
    let (c, h, w) = x.dim();
    if (h, w) == (out_h, out_w) {
        return x.clone();
    }
    let axis = |out_len: usize, in_len: usize| -> Vec<(usize, usize, f32)> {
        let scale = in_len as f32 / out_len as f32;
        (0..out_len)
            .map(|d| {
                let src = ((d as f32 + 0.5) * scale - 0.5).max(0.0);
                let i0 = (src.floor() as usize).min(in_len - 1);
                let i1 = (i0 + 1).min(in_len - 1);
                (i0, i1, src - i0 as f32)
            })
            .collect()
    };
    let rows = axis(out_h, h);
    let cols = axis(out_w, w);

    Array3::from_shape_fn((c, out_h, out_w), |(ch, oy, ox)| {
        let (y0, y1, ly) = rows[oy];
        let (x0, x1, lx) = cols[ox];
        let top = x[[ch, y0, x0]] * (1.0 - lx) + x[[ch, y0, x1]] * lx;
        let bottom = x[[ch, y1, x0]] * (1.0 - lx) + x[[ch, y1, x1]] * lx;
        top * (1.0 - ly) + bottom * ly
    })
}

/// Channel-wise concatenation
///
/// # Errors
/// Returns `Inference` when spatial sizes differ.
pub fn concat(a: &Array3<f32>, b: &Array3<f32>) -> Result<Array3<f32>> {
    concatenate(Axis(0), &[a.view(), b.view()])
        .map_err(|e| GarmentError::inference(format!("Cannot concatenate feature maps: {e}")))
}
