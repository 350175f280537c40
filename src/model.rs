//! K-Means clustering model implementation

use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;

/// Fitting parameters; the seed is the only source of randomness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub max_iters: usize,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            max_iters: 300,
            seed: 42,
        }
    }
}

/// A centroid that lost all its points and was re-seeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reseed {
    pub iteration: usize,
    pub cluster: usize,
    /// Row index of the point moved into the empty cluster
    pub point: usize,
}

/// K-Means model with fitted parameters
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in projected space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    /// Assignment passes performed
    pub iterations: usize,
    /// False when `max_iters` was reached before assignments settled
    pub converged: bool,
    /// Empty-cluster recoveries, in the order they happened
    pub reseeds: Vec<Reseed>,
}

impl KMeansModel {
    /// Predict cluster for new data point
    pub fn predict(&self, point: ArrayView1<f64>) -> crate::Result<usize> {
        if point.len() != self.centroids.ncols() {
            return Err(AnalysisError::InvalidConfig(format!(
                "point has {} dimensions, model expects {}",
                point.len(),
                self.centroids.ncols()
            )));
        }
        Ok(nearest_centroid(point, &self.centroids).0)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette over the first `sample_size` points
    ///
    /// Points alone in their cluster score 0, as does a model with one cluster.
    pub fn compute_silhouette_sample(&self, points: &Array2<f64>, sample_size: usize) -> f64 {
        let n = points.nrows().min(sample_size).min(self.labels.len());
        if n < 2 || self.n_clusters < 2 {
            return 0.0;
        }

        let total: f64 = (0..n)
            .map(|i| {
                // Distance sums and member counts per cluster, excluding i itself
                let mut sums = vec![0.0; self.n_clusters];
                let mut counts = vec![0usize; self.n_clusters];
                for j in (0..n).filter(|&j| j != i) {
                    let cluster = self.labels[j];
                    sums[cluster] += squared_distance(points.row(i), points.row(j)).sqrt();
                    counts[cluster] += 1;
                }

                let own = self.labels[i];
                if counts[own] == 0 {
                    return 0.0;
                }
                let cohesion = sums[own] / counts[own] as f64;
                let separation = (0..self.n_clusters)
                    .filter(|&c| c != own && counts[c] > 0)
                    .map(|c| sums[c] / counts[c] as f64)
                    .fold(f64::INFINITY, f64::min);

                let scale = cohesion.max(separation);
                if separation.is_finite() && scale > 0.0 {
                    (separation - cohesion) / scale
                } else {
                    0.0
                }
            })
            .sum();

        total / n as f64
    }
}

/// Fit K-Means on projected points
///
/// Initialization draws k distinct points in an order fixed by `params.seed`.
/// Each pass assigns every point to its nearest centroid (ties go to the
/// lower index) and moves centroids to the mean of their points, until no
/// assignment changes or `max_iters` passes have run. A cluster left empty
/// takes the point farthest from its own centroid, drawn from clusters that
/// still have more than one member.
///
/// # Arguments
/// * `points` - (n, d) matrix of projected points
/// * `params` - Cluster count, iteration bound and seed
///
/// # Returns
/// * Fitted `KMeansModel` with labels and metrics
pub fn fit_kmeans(points: &Array2<f64>, params: &KMeansParams) -> crate::Result<KMeansModel> {
    let KMeansParams {
        n_clusters: k,
        max_iters,
        seed,
    } = *params;

    if k == 0 {
        return Err(AnalysisError::InvalidConfig(
            "number of clusters must be at least 1".to_string(),
        ));
    }
    if max_iters == 0 {
        return Err(AnalysisError::InvalidConfig(
            "max iterations must be at least 1".to_string(),
        ));
    }

    let centroids = initial_centroids(points, k, seed)?;
    Ok(refine(points, centroids, max_iters))
}

/// Lloyd iterations from the given starting centroids
fn refine(points: &Array2<f64>, mut centroids: Array2<f64>, max_iters: usize) -> KMeansModel {
    let (n, k) = (points.nrows(), centroids.nrows());
    let mut labels = vec![usize::MAX; n];
    let mut reseeds = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iters {
        iterations += 1;

        let mut changed = 0usize;
        for (i, label) in labels.iter_mut().enumerate() {
            let (nearest, _) = nearest_centroid(points.row(i), &centroids);
            if *label != nearest {
                *label = nearest;
                changed += 1;
            }
        }
        debug!(iteration = iterations, changed, "assignment pass");

        if changed == 0 {
            converged = true;
            break;
        }

        for event in reseed_empty_clusters(points, &centroids, &mut labels, k, iterations) {
            warn!(
                iteration = event.iteration,
                cluster = event.cluster,
                point = event.point,
                "re-seeded empty cluster"
            );
            reseeds.push(event);
        }
        centroids = cluster_means(points, &labels, k);
    }

    let labels = Array1::from(labels);
    let inertia = compute_inertia(points, &labels, &centroids);
    info!(k, iterations, converged, inertia, "k-means fitted");

    KMeansModel {
        n_clusters: k,
        labels,
        centroids,
        inertia,
        iterations,
        converged,
        reseeds,
    }
}

/// Pick k distinct points in a seed-determined order
fn initial_centroids(points: &Array2<f64>, k: usize, seed: u64) -> crate::Result<Array2<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..points.nrows()).collect();
    order.shuffle(&mut rng);

    let mut seen = HashSet::new();
    let mut chosen = Vec::with_capacity(k);
    for idx in order {
        if seen.insert(point_key(points.row(idx))) {
            chosen.push(idx);
            if chosen.len() == k {
                break;
            }
        }
    }

    if chosen.len() < k {
        return Err(AnalysisError::TooFewDistinctPoints {
            k,
            distinct: seen.len(),
        });
    }

    let mut centroids = Array2::zeros((k, points.ncols()));
    for (c, &idx) in chosen.iter().enumerate() {
        centroids.row_mut(c).assign(&points.row(idx));
    }
    Ok(centroids)
}

/// Bit pattern of a point, with -0.0 folded into 0.0
fn point_key(point: ArrayView1<f64>) -> Vec<u64> {
    point
        .iter()
        .map(|&v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
        .collect()
}

/// Move points into empty clusters, lowest empty index first
fn reseed_empty_clusters(
    points: &Array2<f64>,
    centroids: &Array2<f64>,
    labels: &mut [usize],
    k: usize,
    iteration: usize,
) -> Vec<Reseed> {
    let mut counts = vec![0usize; k];
    for &label in labels.iter() {
        counts[label] += 1;
    }

    let mut events = Vec::new();
    for cluster in 0..k {
        if counts[cluster] > 0 {
            continue;
        }

        let mut farthest: Option<(usize, f64)> = None;
        for (i, &label) in labels.iter().enumerate() {
            if counts[label] < 2 {
                continue;
            }
            let distance = squared_distance(points.row(i), centroids.row(label));
            if farthest.map_or(true, |(_, best)| distance > best) {
                farthest = Some((i, distance));
            }
        }

        // k distinct initial points imply n >= k, so a donor exists
        if let Some((point, _)) = farthest {
            counts[labels[point]] -= 1;
            counts[cluster] += 1;
            labels[point] = cluster;
            events.push(Reseed {
                iteration,
                cluster,
                point,
            });
        }
    }
    events
}

fn cluster_means(points: &Array2<f64>, labels: &[usize], k: usize) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, points.ncols()));
    let mut counts = vec![0usize; k];
    for (i, &label) in labels.iter().enumerate() {
        let mut row = sums.row_mut(label);
        row += &points.row(i);
        counts[label] += 1;
    }
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            sums.row_mut(c).mapv_inplace(|v| v / count as f64);
        }
    }
    sums
}

/// Nearest centroid by squared Euclidean distance; ties keep the lower index
fn nearest_centroid(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best.1 {
            best = (c, distance);
        }
    }
    best
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(points: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| squared_distance(points.row(i), centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
