//! Random basis sampling.

use std::f64::consts::TAU;

use gc_types::{Basis, ModuleBasis};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Standard deviation of the module scale around 1.
const SCALE_STDDEV: f64 = 0.2;

/// Scales at or below this are redrawn; the tail beyond it is ~5 sigma.
const MIN_SCALE: f64 = 1e-3;

const STREAM_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Draws random multi-module bases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasisSampler {
    orthogonal: bool,
    normalize_scales: bool,
}

impl BasisSampler {
    pub fn new(orthogonal: bool, normalize_scales: bool) -> Self {
        Self {
            orthogonal,
            normalize_scales,
        }
    }

    /// Sample `modules` module bases with `columns` columns each.
    ///
    /// With `columns == 1` there is no orthogonal projection onto the plane
    /// worth drawing, so the oblique construction is used either way.
    pub fn sample<R: Rng>(&self, modules: usize, columns: usize, rng: &mut R) -> Basis {
        let scales = sample_scales(modules, self.normalize_scales, rng);
        let bases = scales
            .iter()
            .map(|&scale| {
                if self.orthogonal && columns > 1 {
                    orthogonal_module(columns, scale, rng)
                } else {
                    oblique_module(columns, scale, rng)
                }
            })
            .collect();
        Basis::new(bases, scales)
    }
}

/// One scale per module drawn from 1 + N(0, 0.2), optionally divided by
/// their mean.
pub fn sample_scales<R: Rng>(modules: usize, normalize: bool, rng: &mut R) -> Vec<f64> {
    let mut scales: Vec<f64> = (0..modules)
        .map(|_| loop {
            let z: f64 = rng.sample(StandardNormal);
            let scale = 1.0 + SCALE_STDDEV * z;
            if scale > MIN_SCALE {
                break scale;
            }
        })
        .collect();

    if normalize && !scales.is_empty() {
        let mean = scales.iter().sum::<f64>() / scales.len() as f64;
        scales.iter_mut().for_each(|s| *s /= mean);
    }
    scales
}

/// Columns with uniformly random directions. Lengths are uniform, rescaled
/// to mean 1 and then divided by the module scale.
fn oblique_module<R: Rng>(columns: usize, scale: f64, rng: &mut R) -> ModuleBasis {
    let lengths: Vec<f64> = (0..columns).map(|_| rng.gen::<f64>()).collect();
    let mean = lengths.iter().sum::<f64>() / columns.max(1) as f64;

    let cols: Vec<(f64, f64)> = lengths
        .iter()
        .map(|&len| {
            let len = (if mean > 0.0 { len / mean } else { 1.0 }) / scale;
            let angle = rng.gen_range(0.0..TAU);
            (len * angle.cos(), len * angle.sin())
        })
        .collect();
    ModuleBasis::from_columns(&cols)
}

/// First two rows of a Haar-random orthogonal matrix, divided by the scale.
fn orthogonal_module<R: Rng>(columns: usize, scale: f64, rng: &mut R) -> ModuleBasis {
    let q = haar_orthogonal(columns, rng);
    let row = |i: usize| q.row(i).iter().map(|v| v / scale).collect::<Vec<f64>>();
    ModuleBasis::from_rows(row(0), row(1))
}

/// A `n x n` orthogonal matrix distributed by Haar measure.
///
/// QR of a standard Gaussian matrix, with the columns of Q flipped so that R
/// has a positive diagonal.
pub fn haar_orthogonal<R: Rng>(n: usize, rng: &mut R) -> DMatrix<f64> {
    let gaussian = DMatrix::<f64>::from_fn(n, n, |_, _| rng.sample(StandardNormal));
    let qr = gaussian.qr();
    let mut q = qr.q();
    let r = qr.r();
    for j in 0..n {
        if r[(j, j)] < 0.0 {
            q.column_mut(j).scale_mut(-1.0);
        }
    }
    q
}

/// Generator for one lane of one batch.
///
/// A seeded run gives every (batch, lane) pair its own reproducible stream;
/// an unseeded run draws from OS entropy.
pub fn lane_rng(seed: Option<u64>, batch: u64, lane: u64) -> ChaCha8Rng {
    match seed {
        Some(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed ^ batch.wrapping_mul(STREAM_MIX));
            rng.set_stream(lane);
            rng
        }
        None => ChaCha8Rng::from_entropy(),
    }
}
