//! K-Means segmentation of customers

use std::collections::{BTreeSet, HashSet};

use linfa::prelude::*;
use linfa_clustering::{KMeans, KMeansError};
use linfa_nn::distance::L2Dist;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{PipelineConfig, SmallPopulationPolicy};
use crate::error::Error;
use crate::features::NormalizedFeatures;

/// Customer-to-segment labels
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentAssignment {
    /// Customer ids, row-aligned with `labels`
    pub customer_ids: Vec<String>,
    /// Segment label per customer, each in `0..n_segments`
    pub labels: Vec<usize>,
    /// Configured number of segments (K)
    pub n_segments: usize,
}

impl SegmentAssignment {
    /// Customers assigned to `segment`
    pub fn members(&self, segment: usize) -> Vec<&str> {
        self.customer_ids
            .iter()
            .zip(self.labels.iter())
            .filter(|(_, &label)| label == segment)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Occupied segment ids in ascending order
    pub fn segment_ids(&self) -> Vec<usize> {
        self.labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Customers per segment for every label in `0..n_segments`, empty ones included
    pub fn segment_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_segments];
        for &label in &self.labels {
            if label < self.n_segments {
                sizes[label] += 1;
            }
        }
        sizes
    }

    pub fn label_of(&self, customer_id: &str) -> Option<usize> {
        self.customer_ids
            .iter()
            .position(|id| id == customer_id)
            .map(|i| self.labels[i])
    }
}

/// Fitted segmentation with diagnostics
#[derive(Debug, Clone)]
pub struct SegmentModel {
    pub assignment: SegmentAssignment,
    /// Centroids in normalized space, one row per segment that was actually fitted
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl SegmentModel {
    pub fn n_segments(&self) -> usize {
        self.assignment.n_segments
    }

    pub fn labels(&self) -> &[usize] {
        &self.assignment.labels
    }

    pub fn segment_sizes(&self) -> Vec<usize> {
        self.assignment.segment_sizes()
    }

    /// Nearest centroid for an already normalized feature vector
    pub fn predict(&self, features: ArrayView1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(Error::InvalidConfig(format!(
                "feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            )));
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_segment = 0;

        for (segment, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(&features, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_segment = segment;
            }
        }

        Ok(closest_segment)
    }

    /// Mean silhouette coefficient over the first `sample_size` customers
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let labels = self.labels();
        let n_samples = features.nrows().min(sample_size).min(labels.len());
        if n_samples < 2 {
            return 0.0;
        }

        let n_segments = self.n_segments();
        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let segment = labels[i];

            let mut same_segment = Vec::new();
            let mut other_segments: Vec<Vec<f64>> = vec![Vec::new(); n_segments];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }

                let distance = squared_distance(&point, &features.row(j)).sqrt();
                let other = labels[j];

                if other == segment {
                    same_segment.push(distance);
                } else if other < n_segments {
                    other_segments[other].push(distance);
                }
            }

            let a_i = if same_segment.is_empty() {
                0.0
            } else {
                same_segment.iter().sum::<f64>() / same_segment.len() as f64
            };

            let b_i = other_segments
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
                .fold(f64::INFINITY, f64::min);

            let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };

            silhouette_sum += silhouette_i;
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit K-Means on normalized customer features.
///
/// Initialisation is seeded from `config.seed`, so identical input, seed and
/// segment count always produce identical labels. Hitting the iteration cap is
/// not an error; the best assignment found so far is returned.
pub fn fit_segments(
    normalized: &NormalizedFeatures,
    config: &PipelineConfig,
) -> crate::Result<SegmentModel> {
    config.validate()?;

    let features = &normalized.matrix;
    let requested = config.n_segments;
    let distinct = distinct_row_indices(features).len();

    let n_fitted = if distinct < requested {
        match config.small_population {
            SmallPopulationPolicy::Reject => {
                return Err(Error::TooFewCustomers {
                    distinct,
                    requested,
                })
            }
            SmallPopulationPolicy::Degrade => {
                warn!(
                    "Only {} distinct customer profiles for {} segments, {} segments will stay empty",
                    distinct,
                    requested,
                    requested - distinct
                );
                distinct
            }
        }
    } else {
        requested
    };

    let (labels, centroids) = match fit_kmeans(features, n_fitted, config) {
        Ok(fitted) => fitted,
        Err(e) => {
            warn!("K-Means did not produce a model ({}), keeping the assignment at the iteration cap", e);
            lloyd_at_cap(features, n_fitted, config)
        }
    };
    let inertia = compute_inertia(features, &labels, &centroids);
    debug!(
        "Fitted {} of {} segments, inertia {:.4}",
        n_fitted, requested, inertia
    );

    Ok(SegmentModel {
        assignment: SegmentAssignment {
            customer_ids: normalized.customer_ids.clone(),
            labels: labels.to_vec(),
            n_segments: requested,
        },
        centroids,
        inertia,
    })
}

fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &PipelineConfig,
) -> Result<(Array1<usize>, Array2<f64>), KMeansError> {
    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(config.seed);

    let model: KMeans<f64, L2Dist> = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(config.n_runs)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(&dataset);
    Ok((labels, model.centroids().clone()))
}

/// Seeded Lloyd iterations that return whatever assignment exists when the
/// iteration cap is reached. Empty clusters keep their previous centroid.
fn lloyd_at_cap(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &PipelineConfig,
) -> (Array1<usize>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut starts = distinct_row_indices(features);
    starts.shuffle(&mut rng);
    starts.truncate(n_clusters);

    let mut centroids = features.select(Axis(0), &starts);
    let mut labels = assign_nearest(features, &centroids);

    for _ in 0..config.max_iterations {
        let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
        let mut counts = vec![0usize; n_clusters];
        for (row, &segment) in features.outer_iter().zip(labels.iter()) {
            let mut sum = sums.row_mut(segment);
            sum += &row;
            counts[segment] += 1;
        }

        let mut shift = 0.0f64;
        for (segment, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let updated = sums.row(segment).mapv(|v| v / count as f64);
            shift = shift.max(squared_distance(&updated.view(), &centroids.row(segment)).sqrt());
            centroids.row_mut(segment).assign(&updated);
        }

        labels = assign_nearest(features, &centroids);
        if shift < config.tolerance {
            break;
        }
    }

    (labels, centroids)
}

fn assign_nearest(features: &Array2<f64>, centroids: &Array2<f64>) -> Array1<usize> {
    features
        .outer_iter()
        .map(|row| {
            centroids
                .outer_iter()
                .enumerate()
                .map(|(segment, centroid)| (segment, squared_distance(&row, &centroid)))
                .fold((0, f64::INFINITY), |best, candidate| {
                    if candidate.1 < best.1 {
                        candidate
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

/// First row index of every distinct feature vector; duplicates cannot seed
/// separate centroids
fn distinct_row_indices(features: &Array2<f64>) -> Vec<usize> {
    let mut seen = HashSet::new();
    features
        .outer_iter()
        .enumerate()
        // adding 0.0 folds -0.0 into 0.0
        .filter(|(_, row)| seen.insert(row.iter().map(|v| (v + 0.0).to_bits()).collect::<Vec<u64>>()))
        .map(|(i, _)| i)
        .collect()
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &segment)| segment < centroids.nrows())
        .map(|(i, &segment)| squared_distance(&features.row(i), &centroids.row(segment)))
        .sum()
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum()
}
