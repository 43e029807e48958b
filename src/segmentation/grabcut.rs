//! Rectangle-seeded GrabCut
//!
//! Foreground and background are each modelled by a five-component
//! full-covariance Gaussian mixture in RGB space. Every iteration reassigns
//! pixels to mixture components, refits both mixtures and solves a min cut
//! whose terminal weights are the mixture negative log-likelihoods and whose
//! neighbour weights follow local contrast.

use super::maxflow::FlowGraph;
use image::{GrayImage, Luma, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::SQRT_2;
use tracing::{debug, instrument};

/// Definite background
pub const BGD: u8 = 0;
/// Definite foreground
pub const FGD: u8 = 1;
/// Probable background
pub const PR_BGD: u8 = 2;
/// Probable foreground
pub const PR_FGD: u8 = 3;

const COMPONENTS: usize = 5;
const KMEANS_ITERATIONS: usize = 10;
const GAMMA: f64 = 50.0;
const LAMBDA: f64 = 8.0 * GAMMA + 1.0;
const MIN_LIKELIHOOD: f64 = 1e-300;

type Rgb = [f64; 3];
type Mat3 = [[f64; 3]; 3];

fn is_foreground(label: u8) -> bool {
    label == FGD || label == PR_FGD
}

fn sq_dist(a: &Rgb, b: &Rgb) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Seed rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Central rectangle leaving `floor(ratio * min(width, height))` on every side
    #[must_use]
    pub fn with_margin(width: u32, height: u32, ratio: f32) -> Self {
        let margin = (f64::from(width.min(height)) * f64::from(ratio)).floor() as u32;
        Self {
            x: margin,
            y: margin,
            width: width.saturating_sub(2 * margin),
            height: height.saturating_sub(2 * margin),
        }
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: f64,
    sum: Rgb,
    prod: Mat3,
}

impl Moments {
    fn add(&mut self, c: &Rgb) {
        self.count += 1.0;
        for ((sum, row), &ci) in self.sum.iter_mut().zip(&mut self.prod).zip(c) {
            *sum += ci;
            for (p, &cj) in row.iter_mut().zip(c) {
                *p += ci * cj;
            }
        }
    }
}

fn det3(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse3(m: &Mat3, det: f64) -> Mat3 {
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
        ],
    ]
}

#[derive(Debug, Clone, Copy, Default)]
struct Gaussian {
    weight: f64,
    mean: Rgb,
    inverse: Mat3,
    /// `1 / sqrt(det(cov))`
    norm: f64,
}

impl Gaussian {
    fn fit(moments: &Moments, total: f64) -> Self {
        if moments.count <= 0.0 {
            return Self::default();
        }
        let n = moments.count;
        let mean = moments.sum.map(|s| s / n);
        let mut cov = moments.prod;
        for (row, &mi) in cov.iter_mut().zip(&mean) {
            for (v, &mj) in row.iter_mut().zip(&mean) {
                *v = *v / n - mi * mj;
            }
        }
        let mut det = det3(&cov);
        if det <= f64::EPSILON {
            // singular: regularise the diagonal
            for (i, row) in cov.iter_mut().enumerate() {
                if let Some(v) = row.get_mut(i) {
                    *v += 0.01;
                }
            }
            det = det3(&cov);
        }
        Self {
            weight: n / total,
            mean,
            inverse: inverse3(&cov, det),
            norm: 1.0 / det.sqrt(),
        }
    }

    fn density(&self, c: &Rgb) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [c[0] - self.mean[0], c[1] - self.mean[1], c[2] - self.mean[2]];
        let mahalanobis: f64 = self
            .inverse
            .iter()
            .zip(&d)
            .map(|(row, &di)| di * row.iter().zip(&d).map(|(&v, &dj)| v * dj).sum::<f64>())
            .sum();
        self.norm * (-0.5 * mahalanobis).exp()
    }
}

#[derive(Debug, Clone)]
struct Gmm {
    components: [Gaussian; COMPONENTS],
}

impl Gmm {
    fn learn<I: IntoIterator<Item = (usize, Rgb)>>(samples: I) -> Self {
        let mut moments = [Moments::default(); COMPONENTS];
        let mut total = 0.0;
        for (k, c) in samples {
            if let Some(m) = moments.get_mut(k) {
                m.add(&c);
                total += 1.0;
            }
        }
        Self {
            components: moments.map(|m| Gaussian::fit(&m, total)),
        }
    }

    fn likelihood(&self, c: &Rgb) -> f64 {
        self.components
            .iter()
            .map(|g| g.weight * g.density(c))
            .sum()
    }

    fn best_component(&self, c: &Rgb) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for (k, g) in self.components.iter().enumerate() {
            let d = g.density(c);
            if d > best_density {
                best = k;
                best_density = d;
            }
        }
        best
    }
}

/// k-means++ seeding followed by Lloyd iterations; returns a cluster per sample
fn kmeans(samples: &[Rgb], k: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = samples.len();
    if n <= k {
        return (0..n).collect();
    }

    let Some(&first) = samples.get(rng.random_range(0..n)) else {
        return vec![0; n];
    };
    let mut centers = vec![first];
    let mut nearest: Vec<f64> = samples.iter().map(|s| sq_dist(s, &first)).collect();
    while centers.len() < k {
        let total: f64 = nearest.iter().sum();
        if total <= 0.0 {
            break;
        }
        let target = rng.random::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = n - 1;
        for (i, d) in nearest.iter().enumerate() {
            acc += d;
            if acc > target {
                chosen = i;
                break;
            }
        }
        let Some(&center) = samples.get(chosen) else {
            break;
        };
        for (d, s) in nearest.iter_mut().zip(samples) {
            *d = d.min(sq_dist(s, &center));
        }
        centers.push(center);
    }

    let mut labels = vec![0usize; n];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (label, s) in labels.iter_mut().zip(samples) {
            let closest = centers
                .iter()
                .enumerate()
                .map(|(i, c)| (i, sq_dist(s, c)))
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
                .0;
            if *label != closest {
                *label = closest;
                changed = true;
            }
        }

        let mut sums = vec![([0.0; 3], 0.0); centers.len()];
        for (&label, s) in labels.iter().zip(samples) {
            if let Some((sum, count)) = sums.get_mut(label) {
                for (acc, v) in sum.iter_mut().zip(s) {
                    *acc += v;
                }
                *count += 1.0;
            }
        }
        for (center, (sum, count)) in centers.iter_mut().zip(sums) {
            if count > 0.0 {
                *center = sum.map(|v| v / count);
            }
        }

        if !changed {
            break;
        }
    }
    labels
}

/// Indices of the left, up-left, up and up-right neighbours of `(x, y)`
fn neighbours(x: usize, y: usize, width: usize) -> [Option<usize>; 4] {
    let idx = y * width + x;
    [
        (x > 0).then(|| idx - 1),
        (x > 0 && y > 0).then(|| idx - width - 1),
        (y > 0).then(|| idx - width),
        (x + 1 < width && y > 0).then(|| idx - width + 1),
    ]
}

/// Colors of the pixel at `idx`'s [`neighbours`]
fn neighbour_colors(colors: &[Rgb], idx: usize, width: usize) -> [Option<&Rgb>; 4] {
    neighbours(idx % width, idx / width, width).map(|n| n.and_then(|n| colors.get(n)))
}

/// Contrast-sensitive weights for each pixel's [`neighbours`]
fn neighbour_weights(colors: &[Rgb], width: usize) -> Vec<[f64; 4]> {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (idx, c) in colors.iter().enumerate() {
        for n in neighbour_colors(colors, idx, width).into_iter().flatten() {
            total += sq_dist(c, n);
            pairs += 1;
        }
    }
    let beta = if pairs == 0 || total <= f64::EPSILON {
        0.0
    } else {
        1.0 / (2.0 * total / pairs as f64)
    };
    debug!(beta, "Neighbour contrast");

    let scale = [GAMMA, GAMMA / SQRT_2, GAMMA, GAMMA / SQRT_2];
    colors
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let mut weights = [0.0; 4];
            let around = neighbour_colors(colors, idx, width);
            for ((weight, n), s) in weights.iter_mut().zip(around).zip(scale) {
                if let Some(n) = n {
                    *weight = s * (-beta * sq_dist(c, n)).exp();
                }
            }
            weights
        })
        .collect()
}

/// `(component, color)` pairs of every pixel in the requested class
fn class_samples<'a>(
    labels: &'a [u8],
    components: &'a [usize],
    colors: &'a [Rgb],
    foreground: bool,
) -> impl Iterator<Item = (usize, Rgb)> + 'a {
    labels
        .iter()
        .zip(components)
        .zip(colors)
        .filter(move |((&l, _), _)| is_foreground(l) == foreground)
        .map(|((_, &k), &c)| (k, c))
}

/// GrabCut driver
#[derive(Debug, Clone)]
pub struct GrabCut {
    iterations: u32,
    seed: u64,
}

impl GrabCut {
    #[must_use]
    pub fn new(iterations: u32, seed: u64) -> Self {
        Self { iterations, seed }
    }

    /// Label every pixel of `image` as one of [`BGD`], [`FGD`], [`PR_BGD`], [`PR_FGD`]
    ///
    /// Pixels outside `rect` are definite background, pixels inside start as
    /// probable foreground. Without background seeds (a rectangle covering
    /// the whole image) the seed labels are returned unchanged. Iteration
    /// stops early once the foreground has been cut away completely.
    #[must_use]
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn run(&self, image: &RgbImage, rect: Rect) -> Vec<u8> {
        let (w, h) = image.dimensions();
        let width = w as usize;
        let colors: Vec<Rgb> = image
            .pixels()
            .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
            .collect();
        let mut labels: Vec<u8> = (0..h)
            .flat_map(|y| (0..w).map(move |x| if rect.contains(x, y) { PR_FGD } else { BGD }))
            .collect();

        let (fg_seed, bg_seed): (Vec<usize>, Vec<usize>) =
            (0..labels.len()).partition(|&i| labels.get(i).is_some_and(|&l| is_foreground(l)));
        if fg_seed.is_empty() || bg_seed.is_empty() {
            debug!(
                foreground = fg_seed.len(),
                background = bg_seed.len(),
                "Seed rectangle leaves one class empty, skipping graph cut"
            );
            return labels;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let seed_model = |indices: &[usize], rng: &mut StdRng| {
            let samples: Vec<Rgb> = indices.iter().filter_map(|&i| colors.get(i).copied()).collect();
            let clusters = kmeans(&samples, COMPONENTS, rng);
            Gmm::learn(clusters.into_iter().zip(samples))
        };
        let mut bgd = seed_model(&bg_seed, &mut rng);
        let mut fgd = seed_model(&fg_seed, &mut rng);
        let n_links = neighbour_weights(&colors, width);

        for iteration in 0..self.iterations {
            if !labels.iter().any(|&l| is_foreground(l)) {
                debug!(iteration, "Foreground vanished, stopping early");
                break;
            }
            let components: Vec<usize> = colors
                .iter()
                .zip(&labels)
                .map(|(c, &l)| {
                    if is_foreground(l) {
                        fgd.best_component(c)
                    } else {
                        bgd.best_component(c)
                    }
                })
                .collect();

            bgd = Gmm::learn(class_samples(&labels, &components, &colors, false));
            fgd = Gmm::learn(class_samples(&labels, &components, &colors, true));

            let mut graph = FlowGraph::with_capacity(labels.len(), labels.len() * 5);
            for (idx, ((&label, c), links)) in labels.iter().zip(&colors).zip(&n_links).enumerate() {
                let (from_source, to_sink) = match label {
                    BGD => (0.0, LAMBDA),
                    FGD => (LAMBDA, 0.0),
                    _ => (
                        -bgd.likelihood(c).max(MIN_LIKELIHOOD).ln(),
                        -fgd.likelihood(c).max(MIN_LIKELIHOOD).ln(),
                    ),
                };
                graph.add_terminal_weights(idx, from_source, to_sink);

                for (n, &weight) in neighbours(idx % width, idx / width, width).iter().zip(links) {
                    if let Some(n) = *n {
                        graph.add_edge(idx, n, weight, weight);
                    }
                }
            }

            let flow = graph.max_flow();
            let side = graph.source_side();
            for (label, &fg) in labels.iter_mut().zip(&side) {
                if *label == PR_BGD || *label == PR_FGD {
                    *label = if fg { PR_FGD } else { PR_BGD };
                }
            }
            debug!(
                iteration,
                flow,
                foreground = labels.iter().filter(|&&l| is_foreground(l)).count(),
                "Graph-cut iteration"
            );
        }
        labels
    }
}

/// Binary mask (0/1) of definite and probable foreground labels
#[must_use]
pub fn foreground_mask(labels: &[u8], width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let label = labels
            .get(y as usize * width as usize + x as usize)
            .copied()
            .unwrap_or(BGD);
        Luma([u8::from(is_foreground(label))])
    })
}
