//! Built-in U²-Net-lite evaluated with ndarray
//!
//! The topology is fixed: four residual U-block (RSU) encoder stages, four
//! decoder stages each fed by the upsampled deeper output concatenated with
//! an encoder skip, four side heads and a fused sigmoid output. Parameters come either from a raw little-endian f32 blob
//! laid out in construction order or from a seeded random initialisation.

use super::layers::{self, Conv2d, ConvSpec, ParamSource};
use super::read_weights;
use crate::{
    config::LearnedConfig,
    error::{GarmentError, Result},
    inference::{InferenceBackend, WeightsStatus},
};
use ndarray::{Array3, Array4, Axis};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// `(in, mid, out)` channels of the encoder stages
const ENCODER: [(usize, usize, usize); 4] = [(3, 32, 64), (64, 32, 128), (128, 64, 256), (256, 128, 512)];
/// `(in, mid, out)` channels of the decoder stages, deepest first
const DECODER: [(usize, usize, usize); 4] = [(768, 128, 256), (384, 64, 128), (192, 32, 64), (128, 16, 64)];
/// Encoder stage whose output is the skip of each decoder stage, deepest first
///
/// The two shallowest decoder stages both run at full resolution and share
/// the first encoder output.
const DECODER_SKIPS: [usize; 4] = [2, 1, 0, 0];
/// Input channels of the side heads, shallowest first
const SIDES: [usize; 4] = [64, 64, 128, 256];

/// Residual U-block with three resolution levels and a dilated bottom
#[derive(Debug, Clone)]
struct Rsu {
    conv_in: Conv2d,
    enc1: Conv2d,
    enc2: Conv2d,
    enc3: Conv2d,
    bottom: Conv2d,
    dec3: Conv2d,
    dec2: Conv2d,
    dec1: Conv2d,
}

impl Rsu {
    fn layout(in_ch: usize, mid: usize, out: usize) -> [ConvSpec; 8] {
        [
            ConvSpec::new(in_ch, out, 3, 1),
            ConvSpec::new(out, mid, 3, 1),
            ConvSpec::new(mid, mid, 3, 1),
            ConvSpec::new(mid, mid, 3, 1),
            ConvSpec::new(mid, mid, 3, 2),
            ConvSpec::new(2 * mid, mid, 3, 1),
            ConvSpec::new(2 * mid, mid, 3, 1),
            ConvSpec::new(2 * mid, out, 3, 1),
        ]
    }

    fn build((in_ch, mid, out): (usize, usize, usize), params: &mut ParamSource<'_>) -> Result<Self> {
        let [a, b, c, d, e, f, g, h] = Self::layout(in_ch, mid, out);
        Ok(Self {
            conv_in: Conv2d::new(a, params)?,
            enc1: Conv2d::new(b, params)?,
            enc2: Conv2d::new(c, params)?,
            enc3: Conv2d::new(d, params)?,
            bottom: Conv2d::new(e, params)?,
            dec3: Conv2d::new(f, params)?,
            dec2: Conv2d::new(g, params)?,
            dec1: Conv2d::new(h, params)?,
        })
    }

    fn forward(&self, x: &Array3<f32>) -> Result<Array3<f32>> {
        let block = |conv: &Conv2d, input: &Array3<f32>| conv.forward(input).map(layers::relu);
        let up_to = |src: &Array3<f32>, like: &Array3<f32>| {
            let (_, h, w) = like.dim();
            layers::resize_bilinear(src, h, w)
        };

        let hx_in = block(&self.conv_in, x)?;
        let hx1 = block(&self.enc1, &hx_in)?;
        let hx2 = block(&self.enc2, &layers::max_pool2(&hx1))?;
        let hx3 = block(&self.enc3, &layers::max_pool2(&hx2))?;
        let hx4 = block(&self.bottom, &hx3)?;

        let hx3d = block(&self.dec3, &layers::concat(&hx4, &hx3)?)?;
        let hx2d = block(&self.dec2, &layers::concat(&up_to(&hx3d, &hx2), &hx2)?)?;
        let hx1d = block(&self.dec1, &layers::concat(&up_to(&hx2d, &hx1), &hx1)?)?;
        Ok(hx1d + &hx_in)
    }
}

/// Fixed encoder-decoder segmentation network
#[derive(Debug, Clone)]
pub struct U2NetLite {
    encoder: Vec<Rsu>,
    decoder: Vec<Rsu>,
    sides: Vec<Conv2d>,
    fuse: Conv2d,
}

impl U2NetLite {
    /// Every convolution in parameter order
    #[must_use]
    pub fn layout() -> Vec<ConvSpec> {
        ENCODER
            .iter()
            .chain(DECODER.iter())
            .flat_map(|&(i, m, o)| Rsu::layout(i, m, o))
            .chain(SIDES.iter().map(|&c| ConvSpec::new(c, 1, 3, 1)))
            .chain(std::iter::once(ConvSpec::new(SIDES.len(), 1, 1, 1)))
            .collect()
    }

    /// Number of f32 values a weight blob must hold
    #[must_use]
    pub fn parameter_count() -> usize {
        Self::layout().iter().map(ConvSpec::param_count).sum()
    }

    /// Build the network, drawing every parameter from `params`
    ///
    /// # Errors
    /// Returns `ModelUnavailable` if a blob is too short or too long.
    pub fn build(params: &mut ParamSource<'_>) -> Result<Self> {
        let encoder = ENCODER
            .iter()
            .map(|&stage| Rsu::build(stage, params))
            .collect::<Result<Vec<_>>>()?;
        let decoder = DECODER
            .iter()
            .map(|&stage| Rsu::build(stage, params))
            .collect::<Result<Vec<_>>>()?;
        let sides = SIDES
            .iter()
            .map(|&c| Conv2d::new(ConvSpec::new(c, 1, 3, 1), params))
            .collect::<Result<Vec<_>>>()?;
        let fuse = Conv2d::new(ConvSpec::new(SIDES.len(), 1, 1, 1), params)?;

        if params.remaining() > 0 {
            return Err(GarmentError::model_unavailable(format!(
                "Weight blob has {} values more than the network uses",
                params.remaining()
            )));
        }
        Ok(Self {
            encoder,
            decoder,
            sides,
            fuse,
        })
    }

    /// Foreground probabilities `(1, H, W)` for a normalized `(3, H, W)` input
    ///
    /// # Errors
    /// Returns `Inference` on malformed input.
    pub fn forward(&self, x: &Array3<f32>) -> Result<Array3<f32>> {
        let (_, h, w) = x.dim();

        // encoder: full, 1/2, 1/4, 1/8 resolution
        let mut skips: Vec<Array3<f32>> = Vec::with_capacity(self.encoder.len());
        let mut current = x.clone();
        for (i, stage) in self.encoder.iter().enumerate() {
            if i > 0 {
                current = layers::max_pool2(&current);
            }
            current = stage.forward(&current)?;
            skips.push(current.clone());
        }

        // decoder: deepest first, starting from the bottleneck
        let mut deeper = current;
        let mut decoded: Vec<Array3<f32>> = Vec::with_capacity(self.decoder.len());
        for (stage, &skip_index) in self.decoder.iter().zip(DECODER_SKIPS.iter()) {
            let skip = skips
                .get(skip_index)
                .ok_or_else(|| GarmentError::inference("Decoder skip has no encoder stage"))?;
            let (_, sh, sw) = skip.dim();
            let input = layers::concat(&layers::resize_bilinear(&deeper, sh, sw), skip)?;
            deeper = stage.forward(&input)?;
            decoded.push(deeper.clone());
        }

        // side heads on the shallowest-first decoder outputs
        let mut fused: Option<Array3<f32>> = None;
        for (head, features) in self.sides.iter().zip(decoded.iter().rev()) {
            let side = layers::resize_bilinear(&head.forward(features)?, h, w);
            fused = Some(match fused {
                None => side,
                Some(acc) => layers::concat(&acc, &side)?,
            });
        }
        let fused = fused.ok_or_else(|| GarmentError::inference("Network has no side outputs"))?;
        Ok(layers::sigmoid(self.fuse.forward(&fused)?))
    }
}

/// Decode a raw little-endian f32 blob
///
/// # Errors
/// Returns `ModelUnavailable` when the byte length is not a multiple of four.
pub fn decode_blob(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(GarmentError::model_unavailable(format!(
            "Weight blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Native backend running [`U2NetLite`] on the CPU
#[derive(Debug, Default)]
pub struct NativeBackend {
    network: Option<U2NetLite>,
    input_size: usize,
    status: Option<WeightsStatus>,
}

impl NativeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend around an already built network
    #[must_use]
    pub fn with_network(network: U2NetLite, input_size: usize, status: WeightsStatus) -> Self {
        Self {
            network: Some(network),
            input_size,
            status: Some(status),
        }
    }
}

impl InferenceBackend for NativeBackend {
    fn initialize(&mut self, config: &LearnedConfig) -> Result<Option<Duration>> {
        if self.network.is_some() {
            return Ok(None);
        }
        let start = Instant::now();

        let (network, status) = match &config.weights_path {
            Some(path) => {
                let bytes = read_weights(path, config.weights_sha256.as_deref())?;
                let values = decode_blob(&bytes)?;
                let expected = U2NetLite::parameter_count();
                if values.len() != expected {
                    return Err(GarmentError::model_unavailable(format!(
                        "Weight blob '{}' holds {} values, the network needs {expected}",
                        path.display(),
                        values.len()
                    )));
                }
                let network = U2NetLite::build(&mut ParamSource::blob(&values))?;
                info!(path = %path.display(), parameters = expected, "Loaded trained weights");
                (network, WeightsStatus::Trained)
            },
            None => {
                warn!(
                    seed = config.seed,
                    "No trained weights supplied, using a randomly initialised network; output is demo quality only"
                );
                (U2NetLite::build(&mut ParamSource::random(config.seed))?, WeightsStatus::Untrained)
            },
        };

        self.network = Some(network);
        self.input_size = config.input_size as usize;
        self.status = Some(status);

        let elapsed = start.elapsed();
        debug!(elapsed_ms = elapsed.as_millis(), "Native backend initialized");
        Ok(Some(elapsed))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| GarmentError::inference("Native backend not initialized"))?;

        let expected = self.input_shape();
        if input.dim() != expected {
            return Err(GarmentError::inference(format!(
                "Expected input tensor {expected:?}, got {:?}",
                input.dim()
            )));
        }

        let start = Instant::now();
        let image = input.index_axis(Axis(0), 0).to_owned();
        let output = network.forward(&image)?.insert_axis(Axis(0));
        debug!(
            elapsed_ms = start.elapsed().as_millis(),
            shape = ?output.shape(),
            "Native inference completed"
        );
        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.input_size, self.input_size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, self.input_size, self.input_size)
    }

    fn weights_status(&self) -> WeightsStatus {
        self.status.unwrap_or(WeightsStatus::Untrained)
    }

    fn is_initialized(&self) -> bool {
        self.network.is_some()
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> LearnedConfig {
        LearnedConfig {
            input_size: 32,
            ..LearnedConfig::default()
        }
    }

    #[test]
    fn test_parameter_count() {
        assert_eq!(U2NetLite::layout().len(), 8 * 8 + 5);
        assert_eq!(U2NetLite::parameter_count(), 10_313_449);
    }

    #[test]
    fn test_decoder_stages_take_encoder_skips() {
        let layout = U2NetLite::layout();
        // first conv of each decoder RSU: deeper output plus encoder skip channels
        let decoder_inputs: Vec<usize> = (4..8).map(|stage| layout[stage * 8].in_channels).collect();
        assert_eq!(decoder_inputs, vec![512 + 256, 256 + 128, 128 + 64, 64 + 64]);
    }

    #[test]
    fn test_random_network_output() {
        let mut backend = NativeBackend::new();
        assert!(backend.initialize(&small_config()).unwrap().is_some());
        assert_eq!(backend.weights_status(), WeightsStatus::Untrained);
        assert_eq!(backend.input_shape(), (1, 3, 32, 32));

        let input = Array4::from_shape_fn((1, 3, 32, 32), |(_, c, y, x)| {
            ((c + y * 7 + x * 3) % 11) as f32 / 11.0 - 0.5
        });
        let output = backend.infer(&input).unwrap();
        assert_eq!(output.dim(), (1, 1, 32, 32));
        assert!(output.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p)));

        let mut again = NativeBackend::new();
        again.initialize(&small_config()).unwrap();
        assert_eq!(again.infer(&input).unwrap(), output);
    }

    #[test]
    fn test_zero_blob_gives_half_probability() {
        let zeros = vec![0.0f32; U2NetLite::parameter_count()];
        let network = U2NetLite::build(&mut ParamSource::blob(&zeros)).unwrap();
        let output = network.forward(&Array3::from_elem((3, 16, 16), 1.0)).unwrap();
        assert_eq!(output.dim(), (1, 16, 16));
        assert!(output.iter().all(|&p| (p - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_blob_length_must_match() {
        let too_long = vec![0.0f32; U2NetLite::parameter_count() + 1];
        assert!(matches!(
            U2NetLite::build(&mut ParamSource::blob(&too_long)),
            Err(GarmentError::ModelUnavailable(_))
        ));
        assert!(decode_blob(&[0, 0, 0]).is_err());
    }

    #[test]
    fn test_weight_file_errors_are_model_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.bin");
        std::fs::write(&path, 1.5f32.to_le_bytes()).unwrap();

        let mut config = small_config();
        config.weights_path = Some(path);
        let err = NativeBackend::new().initialize(&config).unwrap_err();
        assert!(matches!(err, GarmentError::ModelUnavailable(_)));
        assert!(err.to_string().contains("holds 1 values"));

        config.weights_path = Some(dir.path().join("missing.bin"));
        assert!(matches!(
            NativeBackend::new().initialize(&config),
            Err(GarmentError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_wrong_input_shape_is_rejected() {
        let mut backend = NativeBackend::new();
        backend.initialize(&small_config()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 16, 16))).is_err());
        assert!(NativeBackend::new().infer(&Array4::zeros((1, 3, 32, 32))).is_err());
    }
}
