//! Seeded k-means clustering of table rows.
//!
//! Centers start from k-means++ draws and Lloyd iterations run until the
//! assignment stops changing. Several seeded restarts are made and the one
//! with the lowest inertia is kept.

use crate::error::{Error, Result};
use crate::stats;
use crate::table::Table;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KMeans {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansFit {
    /// Cluster of every point.
    pub labels: Vec<usize>,
    pub centers: Vec<Vec<f64>>,
    /// Within-cluster sum of squared distances, per cluster.
    pub withinss: Vec<f64>,
    /// Total within-cluster sum of squares.
    pub inertia: f64,
    pub n_iter: usize,
    pub converged: bool,
}

impl KMeansFit {
    /// Points per cluster.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centers.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }
}

impl KMeans {
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            n_init: 10,
            max_iter: 300,
            seed,
        }
    }

    pub fn fit(&self, points: &[Vec<f64>]) -> Result<KMeansFit> {
        self.check(points)?;
        let mut rng = ChaCha12Rng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;
        for _ in 0..self.n_init {
            let centers = plus_plus_init(points, self.k, &mut rng);
            let fit = lloyd(points, centers, self.max_iter);
            if best.as_ref().is_none_or(|best| fit.inertia < best.inertia) {
                best = Some(fit);
            }
        }
        best.ok_or(Error::EmptyInput { op: "kmeans" })
    }

    fn check(&self, points: &[Vec<f64>]) -> Result<()> {
        let Some(first) = points.first() else {
            return Err(Error::EmptyInput { op: "kmeans" });
        };
        if self.k == 0 || self.k > points.len() {
            return Err(Error::InvalidArgument(format!(
                "kmeans needs 1 <= k <= {}, but k is {}",
                points.len(),
                self.k
            )));
        }
        if self.n_init == 0 || self.max_iter == 0 {
            return Err(Error::InvalidArgument(
                "kmeans needs at least one start and one iteration".to_string(),
            ));
        }
        for point in points {
            if point.len() != first.len() {
                return Err(Error::LengthMismatch {
                    expected: first.len(),
                    found: point.len(),
                });
            }
            stats::check_finite(point, "kmeans")?;
        }
        Ok(())
    }
}

/// Cluster the rows of complete numeric `columns`.
pub fn cluster_columns(table: &Table, columns: &[String], kmeans: &KMeans) -> Result<KMeansFit> {
    if columns.is_empty() {
        return Err(Error::InvalidArgument(
            "kmeans needs at least one column".to_string(),
        ));
    }
    let features: Vec<Vec<f64>> = columns
        .iter()
        .map(|name| table.column(name)?.complete_values())
        .collect::<Result<_>>()?;
    let points: Vec<Vec<f64>> = (0..table.n_rows())
        .map(|row| features.iter().map(|feature| feature[row]).collect())
        .collect();
    kmeans.fit(&points)
}

/// Draw centers with probability proportional to the squared distance to
/// the nearest center already chosen.
fn plus_plus_init(points: &[Vec<f64>], k: usize, rng: &mut ChaCha12Rng) -> Vec<Vec<f64>> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.random_range(0..points.len())].clone());

    while centers.len() < k {
        let dists: Vec<f64> = points
            .iter()
            .map(|point| nearest(point, &centers).1)
            .collect();
        let total: f64 = dists.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumsum = 0.0;
            dists
                .iter()
                .position(|dist| {
                    cumsum += dist;
                    cumsum >= target
                })
                .unwrap_or(points.len() - 1)
        } else {
            rng.random_range(0..points.len())
        };
        centers.push(points[chosen].clone());
    }
    centers
}

fn lloyd(points: &[Vec<f64>], mut centers: Vec<Vec<f64>>, max_iter: usize) -> KMeansFit {
    let mut labels = assign(points, &centers);
    let mut converged = false;
    let mut n_iter = 0;
    while n_iter < max_iter {
        n_iter += 1;
        centers = update_centers(points, &labels, &centers);
        let new_labels = assign(points, &centers);
        if new_labels == labels {
            converged = true;
            break;
        }
        labels = new_labels;
    }

    let mut withinss = vec![0.0; centers.len()];
    for (point, &label) in points.iter().zip(&labels) {
        withinss[label] += squared_distance(point, &centers[label]);
    }
    KMeansFit {
        inertia: withinss.iter().sum(),
        labels,
        centers,
        withinss,
        n_iter,
        converged,
    }
}

fn assign(points: &[Vec<f64>], centers: &[Vec<f64>]) -> Vec<usize> {
    points.iter().map(|point| nearest(point, centers).0).collect()
}

/// Means of the assigned points; an emptied cluster keeps its center.
fn update_centers(points: &[Vec<f64>], labels: &[usize], centers: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n_dims = centers.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; n_dims]; centers.len()];
    let mut counts = vec![0usize; centers.len()];
    for (point, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        for (sum, val) in sums[label].iter_mut().zip(point) {
            *sum += val;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(centers)
        .map(|((sum, count), center)| {
            if count == 0 {
                center.clone()
            } else {
                sum.into_iter().map(|val| val / count as f64).collect()
            }
        })
        .collect()
}

/// Index of and squared distance to the closest center.
fn nearest(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    centers
        .iter()
        .map(|center| squared_distance(point, center))
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, dist)| {
            if dist < best.1 { (i, dist) } else { best }
        })
}

fn squared_distance(a_vals: &[f64], b_vals: &[f64]) -> f64 {
    a_vals.iter().zip(b_vals).map(|(a, b)| (a - b).powi(2)).sum()
}
