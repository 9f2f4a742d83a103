//! Centered kernel alignment between two representations of the same samples.
//!
//! Linear CKA is computed in feature space,
//! `||Yc^T Xc||_F^2 / (||Xc^T Xc||_F ||Yc^T Yc||_F)` with column-centred
//! `Xc`, `Yc`, which avoids the N×N Gram matrices. The RBF variant builds the
//! Gram matrices, double-centres them and takes the normalised HSIC; with no
//! explicit bandwidth, sigma is the median non-zero pairwise distance.

use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CkaKernel {
    #[default]
    Linear,
    Rbf {
        #[serde(default)]
        sigma: Option<f64>,
    },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Cka {
    kernel: CkaKernel,
}

fn check_shapes(x: &[Vec<f64>], y: &[Vec<f64>]) -> Result<()> {
    if x.len() != y.len() {
        return Err(Error::DimensionMismatch {
            context: "cka sample count".to_string(),
            expected: x.len(),
            got: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(Error::EmptyCollection(format!(
            "cka needs at least 2 samples, got {}",
            x.len()
        )));
    }
    for rows in [x, y] {
        let width = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(Error::DimensionMismatch {
                context: "cka embedding width".to_string(),
                expected: width,
                got: bad.len(),
            });
        }
    }
    Ok(())
}

/// Subtracts the column mean from every row.
pub fn center_columns(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len() as f64;
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let mean: Vec<f64> = (0..width)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
        .collect();
    rows.par_iter()
        .map(|r| r.iter().zip(&mean).map(|(v, m)| v - m).collect())
        .collect()
}

/// Squared Frobenius norm of `a^T b` for row-major `a` (N×P), `b` (N×Q).
fn cross_frobenius_sq(a: &[Vec<f64>], b: &[Vec<f64>]) -> f64 {
    let p = a[0].len();
    let q = b[0].len();
    (0..p)
        .into_par_iter()
        .map(|i| {
            (0..q)
                .map(|j| {
                    let c: f64 = a.iter().zip(b).map(|(ra, rb)| ra[i] * rb[j]).sum();
                    c * c
                })
                .sum::<f64>()
        })
        .collect::<Vec<f64>>()
        .iter()
        .sum()
}

/// Linear CKA in feature space.
pub fn linear_cka(x: &[Vec<f64>], y: &[Vec<f64>]) -> Result<f64> {
    check_shapes(x, y)?;
    let xc = center_columns(x);
    let yc = center_columns(y);

    let hsic_xy = cross_frobenius_sq(&yc, &xc);
    let norm_x = cross_frobenius_sq(&xc, &xc).sqrt();
    let norm_y = cross_frobenius_sq(&yc, &yc).sqrt();
    if norm_x <= 0.0 || norm_y <= 0.0 {
        return Err(Error::DegenerateKernel(
            "constant representation has no variance".to_string(),
        ));
    }
    trace!(
        "linear cka: hsic={:.6e}, |x|={:.6e}, |y|={:.6e}",
        hsic_xy,
        norm_x,
        norm_y
    );
    Ok(hsic_xy / (norm_x * norm_y))
}

fn squared_distances(rows: &[Vec<f64>]) -> Vec<f64> {
    let n = rows.len();
    (0..n * n)
        .into_par_iter()
        .map(|idx| {
            let (i, j) = (idx / n, idx % n);
            rows[i]
                .iter()
                .zip(&rows[j])
                .map(|(a, b)| (a - b).powi(2))
                .sum()
        })
        .collect()
}

fn median_nonzero(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|d| *d > 0.0).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 1 {
        v[mid]
    } else {
        0.5 * (v[mid - 1] + v[mid])
    })
}

/// Double-centred RBF Gram matrix `H K H`.
fn centered_rbf_gram(rows: &[Vec<f64>], sigma: Option<f64>) -> Result<DenseMatrix<f64>> {
    let n = rows.len();
    let d2 = squared_distances(rows);
    let sigma = match sigma {
        Some(s) if s.is_finite() && s > 0.0 => s,
        Some(s) => return Err(Error::InvalidConfig(format!("rbf sigma must be > 0, got {s}"))),
        None => median_nonzero(&d2)
            .map(f64::sqrt)
            .ok_or_else(|| Error::DegenerateKernel("all samples coincide".to_string()))?,
    };
    debug!("rbf cka: n={}, sigma={:.6}", n, sigma);

    let scale = -0.5 / (sigma * sigma);
    let k: Vec<f64> = d2.iter().map(|d| (d * scale).exp()).collect();

    let row_mean: Vec<f64> = (0..n)
        .map(|i| k[i * n..(i + 1) * n].iter().sum::<f64>() / n as f64)
        .collect();
    let total_mean = row_mean.iter().sum::<f64>() / n as f64;

    let centered = (0..n * n).map(|idx| {
        let (i, j) = (idx / n, idx % n);
        k[idx] - row_mean[i] - row_mean[j] + total_mean
    });
    Ok(DenseMatrix::from_iterator(centered, n, n, 0))
}

fn hsic(a: &DenseMatrix<f64>, b: &DenseMatrix<f64>) -> f64 {
    let (n, _) = a.shape();
    (0..n)
        .into_par_iter()
        .map(|i| (0..n).map(|j| a.get((i, j)) * b.get((i, j))).sum::<f64>())
        .collect::<Vec<f64>>()
        .iter()
        .sum()
}

/// RBF-kernel CKA; `sigma = None` uses the median heuristic per input.
pub fn rbf_cka(x: &[Vec<f64>], y: &[Vec<f64>], sigma: Option<f64>) -> Result<f64> {
    check_shapes(x, y)?;
    let kx = centered_rbf_gram(x, sigma)?;
    let ky = centered_rbf_gram(y, sigma)?;
    let denom = (hsic(&kx, &kx) * hsic(&ky, &ky)).sqrt();
    if denom <= 0.0 {
        return Err(Error::DegenerateKernel(
            "centred gram matrix is zero".to_string(),
        ));
    }
    Ok(hsic(&kx, &ky) / denom)
}

impl Cka {
    pub fn new(kernel: CkaKernel) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> CkaKernel {
        self.kernel
    }

    /// Similarity of two representations, rows aligned by sample.
    pub fn score(&self, x: &[Vec<f64>], y: &[Vec<f64>]) -> Result<f64> {
        match self.kernel {
            CkaKernel::Linear => linear_cka(x, y),
            CkaKernel::Rbf { sigma } => rbf_cka(x, y, sigma),
        }
    }
}
