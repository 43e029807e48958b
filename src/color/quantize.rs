//! Palette quantization by k-means clustering in sRGB
//!
//! The cluster count is capped at the number of distinct sampled colors, so
//! k-means++ seeding puts every cluster on its own color and a uniform input
//! quantizes to itself. Entries are cluster means ranked by member count.

use crate::error::{GarmentError, Result};
use kmeans_colors::get_kmeans;
use palette::Srgb;
use std::collections::HashSet;

const MAX_ITERATIONS: usize = 20;
const CONVERGENCE: f32 = 1e-5;
const SEED: u64 = 0;
/// Cluster labels are stored as `u8`
const MAX_CLUSTERS: usize = u8::MAX as usize;

/// A palette entry and the number of sampled pixels it represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedColor {
    pub rgb: [u8; 3],
    pub population: u64,
}

fn to_channel(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Number of distinct colors in `pixels`, counting no further than `limit`
fn distinct_colors(pixels: &[[u8; 3]], limit: usize) -> usize {
    let mut seen = HashSet::new();
    for pixel in pixels {
        seen.insert(*pixel);
        if seen.len() >= limit {
            break;
        }
    }
    seen.len()
}

/// Quantize `pixels` into at most `max_colors` distinct colors, most populous first
///
/// # Errors
/// Returns `PaletteExtraction` if there are no pixels or `max_colors` is zero.
pub fn quantize<I: IntoIterator<Item = [u8; 3]>>(
    pixels: I,
    max_colors: usize,
) -> Result<Vec<QuantizedColor>> {
    if max_colors == 0 {
        return Err(GarmentError::palette_extraction(
            "Requested an empty palette",
        ));
    }
    let pixels: Vec<[u8; 3]> = pixels.into_iter().collect();
    if pixels.is_empty() {
        return Err(GarmentError::palette_extraction("No pixels to quantize"));
    }

    let k = distinct_colors(&pixels, max_colors.min(MAX_CLUSTERS));
    let buffer: Vec<Srgb> = pixels
        .iter()
        .map(|&[r, g, b]| Srgb::<u8>::new(r, g, b).into_format())
        .collect();
    let clusters = get_kmeans(k, MAX_ITERATIONS, CONVERGENCE, false, &buffer, SEED);

    let mut population = vec![0u64; clusters.centroids.len()];
    for &label in &clusters.indices {
        if let Some(count) = population.get_mut(usize::from(label)) {
            *count += 1;
        }
    }

    let mut colors: Vec<QuantizedColor> = Vec::with_capacity(k);
    for (centroid, count) in clusters.centroids.iter().zip(population) {
        if count == 0 {
            continue;
        }
        let rgb = [
            to_channel(centroid.red),
            to_channel(centroid.green),
            to_channel(centroid.blue),
        ];
        match colors.iter_mut().find(|c| c.rgb == rgb) {
            Some(existing) => existing.population += count,
            None => colors.push(QuantizedColor {
                rgb,
                population: count,
            }),
        }
    }
    colors.sort_by(|a, b| b.population.cmp(&a.population));
    Ok(colors)
}
