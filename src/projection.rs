//! Principal-component projection of normalized features to two dimensions
//!
//! A Jacobi eigen-solver on the small covariance matrix is used instead of
//! `linfa_reduction::Pca`, whose truncated SVD fails on two-row or
//! rank-deficient input.

use ndarray::{Array1, Array2, Axis};

/// Number of retained components
pub const N_COMPONENTS: usize = 2;

const MAX_SWEEPS: usize = 100;
const OFF_DIAGONAL_EPS: f64 = 1e-20;

/// 2D coordinates for visualization, row-aligned with the input matrix
#[derive(Debug, Clone)]
pub struct Projection {
    /// `(n_customers, 2)` coordinates
    pub coordinates: Array2<f64>,
    /// Principal axes as columns, `(n_features, 2)`
    pub components: Array2<f64>,
    /// Share of total variance carried by each retained component
    pub explained_variance_ratio: [f64; N_COMPONENTS],
}

impl Projection {
    pub fn pca1(&self) -> Vec<f64> {
        self.coordinates.column(0).to_vec()
    }

    pub fn pca2(&self) -> Vec<f64> {
        self.coordinates.column(1).to_vec()
    }
}

/// Project rows of `x` onto its two leading principal components.
///
/// Deterministic for identical input. The sign of each axis is whatever the
/// eigen-solver produces and carries no meaning.
pub fn project(x: &Array2<f64>) -> Projection {
    let (n_samples, n_features) = x.dim();

    let mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_features));
    let centered = x - &mean;

    let covariance = if n_samples > 1 {
        centered.t().dot(&centered) / (n_samples - 1) as f64
    } else {
        Array2::zeros((n_features, n_features))
    };

    let (eigenvalues, eigenvectors) = symmetric_eigen(covariance);

    let mut order: Vec<usize> = (0..n_features).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let mut components: Array2<f64> = Array2::zeros((n_features, N_COMPONENTS));
    let mut explained_variance_ratio = [0.0; N_COMPONENTS];
    let total_variance: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();

    for (k, &idx) in order.iter().take(N_COMPONENTS).enumerate() {
        components
            .column_mut(k)
            .assign(&eigenvectors.column(idx));
        if total_variance > 0.0 {
            explained_variance_ratio[k] = eigenvalues[idx].max(0.0) / total_variance;
        }
    }

    let coordinates = centered.dot(&components);

    Projection {
        coordinates,
        components,
        explained_variance_ratio,
    }
}

/// Eigen-decomposition of a symmetric matrix with cyclic Jacobi rotations.
///
/// Returns eigenvalues and the matching eigenvectors as columns.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v: Array2<f64> = Array2::eye(n);

    for _ in 0..MAX_SWEEPS {
        let off_diagonal: f64 = (0..n)
            .flat_map(|p| (0..n).filter(move |&q| q != p).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]].powi(2))
            .sum();
        if off_diagonal < OFF_DIAGONAL_EPS {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}
