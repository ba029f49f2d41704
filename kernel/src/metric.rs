//! Structural Similarity — image comparison metrics
//!
//! Mean SSIM over a Gaussian window (11×11, σ = 1.5):
//! SSIM = (2·μ1μ2 + C1)(2·σ12 + C2) / ((μ1² + μ2² + C1)(σ1² + σ2² + C2))
//! Local statistics come from a separable blur with reflect-101 borders.
//! This is the OpenCV tutorial MSSIM and is the default.
//!
//! `UniformSsim` follows scikit-image's `structural_similarity` defaults
//! instead: 7×7 uniform window, sample covariance, border-cropped mean.

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimilarityError};

/// Grayscale image, intensities on the 0..=255 scale.
pub type Image = Array2<f32>;

/// A similarity function over two equal-shaped images.
///
/// Higher is more similar; identical images score 1.
pub trait SimilarityMetric: Send + Sync {
    fn similarity(&self, a: &Image, b: &Image) -> Result<f64>;
}

fn check_comparable(a: &Image, b: &Image) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(SimilarityError::ShapeMismatch { left: a.dim(), right: b.dim() });
    }
    if a.is_empty() {
        return Err(SimilarityError::EmptyImage);
    }
    Ok(())
}

// ============================================================================
// GAUSSIAN SSIM
// ============================================================================

/// Gaussian-window SSIM parameters.
#[derive(Debug, Clone, Copy)]
pub struct GaussianSsim {
    pub window: usize,
    pub sigma: f64,
    pub data_range: f64,
}

impl Default for GaussianSsim {
    fn default() -> Self {
        Self { window: 11, sigma: 1.5, data_range: 255.0 }
    }
}

/// Mean SSIM plus the per-pixel map it was averaged from.
#[derive(Debug, Clone)]
pub struct SsimResult {
    pub mssim: f64,
    pub map: Array2<f64>,
}

impl GaussianSsim {
    fn c1(&self) -> f64 {
        (0.01 * self.data_range).powi(2)
    }

    fn c2(&self) -> f64 {
        (0.03 * self.data_range).powi(2)
    }

    /// SSIM with the full similarity map.
    pub fn structural_similarity_full(&self, a: &Image, b: &Image) -> Result<SsimResult> {
        check_comparable(a, b)?;
        if self.window == 0 || self.window % 2 == 0 {
            return Err(SimilarityError::Config(format!(
                "SSIM window must be odd and positive, got {}",
                self.window
            )));
        }

        let kernel = gaussian_kernel(self.window, self.sigma);
        let i1 = a.mapv(f64::from);
        let i2 = b.mapv(f64::from);

        let mu1 = blur(&i1, &kernel);
        let mu2 = blur(&i2, &kernel);
        let i1_sq = blur(&(&i1 * &i1), &kernel);
        let i2_sq = blur(&(&i2 * &i2), &kernel);
        let i1_i2 = blur(&(&i1 * &i2), &kernel);

        let (c1, c2) = (self.c1(), self.c2());
        let mut map = Array2::<f64>::zeros(i1.dim());
        Zip::from(&mut map)
            .and(&mu1)
            .and(&mu2)
            .and(&i1_sq)
            .and(&i2_sq)
            .and(&i1_i2)
            .for_each(|out, &m1, &m2, &s11, &s22, &s12| {
                let m1_m2 = m1 * m2;
                let m1_sq = m1 * m1;
                let m2_sq = m2 * m2;
                let sigma1_sq = s11 - m1_sq;
                let sigma2_sq = s22 - m2_sq;
                let sigma12 = s12 - m1_m2;
                let num = (2.0 * m1_m2 + c1) * (2.0 * sigma12 + c2);
                let den = (m1_sq + m2_sq + c1) * (sigma1_sq + sigma2_sq + c2);
                *out = num / den;
            });

        let mssim = map.mean().unwrap_or(0.0);
        Ok(SsimResult { mssim, map })
    }
}

impl SimilarityMetric for GaussianSsim {
    fn similarity(&self, a: &Image, b: &Image) -> Result<f64> {
        Ok(self.structural_similarity_full(a, b)?.mssim)
    }
}

/// Normalised 1-D Gaussian taps.
fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let center = (size / 2) as f64;
    let denom = 2.0 * sigma * sigma;
    let taps: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - center;
            (-(x * x) / denom).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

/// Reflect-101 border index: `dcb|abcd|cba`.
fn reflect101(mut p: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let last = n as isize - 1;
    loop {
        if p < 0 {
            p = -p;
        } else if p > last {
            p = 2 * last - p;
        } else {
            return p as usize;
        }
    }
}

/// Separable blur: rows first, then columns.
fn blur(src: &Array2<f64>, kernel: &[f64]) -> Array2<f64> {
    let (rows, cols) = src.dim();
    let radius = (kernel.len() / 2) as isize;

    let mut horizontal = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let cc = reflect101(c as isize + k as isize - radius, cols);
                acc += w * src[[r, cc]];
            }
            horizontal[[r, c]] = acc;
        }
    }

    let mut out = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let rr = reflect101(r as isize + k as isize - radius, rows);
                acc += w * horizontal[[rr, c]];
            }
            out[[r, c]] = acc;
        }
    }
    out
}

// ============================================================================
// UNIFORM SSIM (scikit-image defaults)
// ============================================================================

/// Uniform-window SSIM. Only pixels whose window lies fully inside the
/// image contribute, so both sides must be at least `window` long.
#[derive(Debug, Clone, Copy)]
pub struct UniformSsim {
    pub window: usize,
    pub data_range: f64,
}

impl Default for UniformSsim {
    fn default() -> Self {
        Self { window: 7, data_range: 255.0 }
    }
}

impl UniformSsim {
    /// SSIM with the map over the cropped (valid) region.
    pub fn structural_similarity_full(&self, a: &Image, b: &Image) -> Result<SsimResult> {
        check_comparable(a, b)?;
        let w = self.window;
        if w < 3 || w % 2 == 0 {
            return Err(SimilarityError::Config(format!(
                "SSIM window must be odd and at least 3, got {w}"
            )));
        }
        let (rows, cols) = a.dim();
        if rows < w || cols < w {
            return Err(SimilarityError::ImageTooSmall { min: w, shape: (rows, cols) });
        }

        let x = a.mapv(f64::from);
        let y = b.mapv(f64::from);
        let np = (w * w) as f64;
        let cov_norm = np / (np - 1.0);
        let c1 = (0.01 * self.data_range).powi(2);
        let c2 = (0.03 * self.data_range).powi(2);

        let map = Array2::from_shape_fn((rows - w + 1, cols - w + 1), |(r, c)| {
            let wx = x.slice(s![r..r + w, c..c + w]);
            let wy = y.slice(s![r..r + w, c..c + w]);
            let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
            Zip::from(&wx).and(&wy).for_each(|&p, &q| {
                sx += p;
                sy += q;
                sxx += p * p;
                syy += q * q;
                sxy += p * q;
            });
            let (ux, uy) = (sx / np, sy / np);
            let vx = cov_norm * (sxx / np - ux * ux);
            let vy = cov_norm * (syy / np - uy * uy);
            let vxy = cov_norm * (sxy / np - ux * uy);
            ((2.0 * ux * uy + c1) * (2.0 * vxy + c2))
                / ((ux * ux + uy * uy + c1) * (vx + vy + c2))
        });

        let mssim = map.mean().unwrap_or(0.0);
        Ok(SsimResult { mssim, map })
    }
}

impl SimilarityMetric for UniformSsim {
    fn similarity(&self, a: &Image, b: &Image) -> Result<f64> {
        Ok(self.structural_similarity_full(a, b)?.mssim)
    }
}

// ============================================================================
// MEAN ABSOLUTE DIFFERENCE
// ============================================================================

/// `1 - mean(|a - b|) / 255`, so the stored dissimilarity is the mean
/// normalised absolute difference.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAbsDiff;

impl SimilarityMetric for MeanAbsDiff {
    fn similarity(&self, a: &Image, b: &Image) -> Result<f64> {
        check_comparable(a, b)?;
        let total: f64 = Zip::from(a)
            .and(b)
            .fold(0.0, |acc, &x, &y| acc + (f64::from(x) - f64::from(y)).abs() / 255.0);
        Ok(1.0 - total / a.len() as f64)
    }
}

// ============================================================================
// SELECTION
// ============================================================================

/// Metric choice carried by config and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    #[default]
    Ssim,
    SsimUniform,
    MeanAbsDiff,
}

impl SimilarityMetric for Metric {
    fn similarity(&self, a: &Image, b: &Image) -> Result<f64> {
        match self {
            Metric::Ssim => GaussianSsim::default().similarity(a, b),
            Metric::SsimUniform => UniformSsim::default().similarity(a, b),
            Metric::MeanAbsDiff => MeanAbsDiff.similarity(a, b),
        }
    }
}

impl FromStr for Metric {
    type Err = SimilarityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ssim" => Ok(Metric::Ssim),
            "ssim-uniform" | "skimage" => Ok(Metric::SsimUniform),
            "mean-abs-diff" | "mad" => Ok(Metric::MeanAbsDiff),
            _ => Err(SimilarityError::Config(format!(
                "Invalid metric '{s}'. Expected: ssim, ssim-uniform, mean-abs-diff"
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Ssim => f.write_str("ssim"),
            Metric::SsimUniform => f.write_str("ssim-uniform"),
            Metric::MeanAbsDiff => f.write_str("mean-abs-diff"),
        }
    }
}
