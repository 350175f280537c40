//! Principal component analysis via covariance eigendecomposition

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::{debug, info};

use crate::error::{AnalysisError, Degeneracy};

/// Number of retained principal components
pub const N_COMPONENTS: usize = 2;

/// Second retained eigenvalue must exceed this fraction of the first
const RANK_TOLERANCE: f64 = 1e-9;
const EIGEN_EPS: f64 = 1e-12;
const EIGEN_MAX_ITERS: usize = 1_000;

/// Fitted projection basis
#[derive(Debug, Clone, PartialEq)]
pub struct PcaModel {
    /// Column means of the fitted matrix
    pub mean: Array1<f64>,
    /// (d, 2) basis; column c is the c-th principal direction
    pub components: Array2<f64>,
    /// Eigenvalues of the retained directions, descending
    pub explained_variance: [f64; N_COMPONENTS],
    /// Retained eigenvalues divided by the total variance
    pub explained_variance_ratio: [f64; N_COMPONENTS],
}

impl PcaModel {
    /// Project every row of `x` onto the retained basis
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean).dot(&self.components)
    }

    /// Project a single standardized vector
    pub fn project(&self, z: ArrayView1<f64>) -> Array1<f64> {
        (&z - &self.mean).dot(&self.components)
    }

    /// Loadings of one component, one entry per input dimension
    pub fn loadings(&self, component: usize) -> Vec<f64> {
        self.components.column(component).to_vec()
    }
}

/// Fitted basis plus the projected batch
#[derive(Debug, Clone)]
pub struct Projection {
    pub model: PcaModel,
    /// (n, 2) principal-component scores, rows aligned with the input
    pub points: Array2<f64>,
}

/// Fit a 2-component PCA on an (n, d) matrix
///
/// Deterministic: eigenvectors are sign-normalized so that the loading with
/// the largest magnitude is positive.
pub fn fit_pca(x: &Array2<f64>) -> crate::Result<PcaModel> {
    let (n, d) = x.dim();
    if n == 0 {
        return Err(Degeneracy::EmptyBatch.into());
    }
    if n < 2 {
        return Err(Degeneracy::TooFewRecords(n).into());
    }
    if d < N_COMPONENTS {
        return Err(Degeneracy::TooFewFeatures(d).into());
    }

    let mean = x
        .mean_axis(Axis(0))
        .ok_or(AnalysisError::DegenerateInput(Degeneracy::EmptyBatch))?;
    let centered = x - &mean;
    let covariance = centered.t().dot(&centered) / (n - 1) as f64;

    let matrix = DMatrix::from_fn(d, d, |i, j| covariance[[i, j]]);
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::NumericInstability(
            "covariance matrix contains non-finite values".to_string(),
        ));
    }

    let eigen = SymmetricEigen::try_new(matrix, EIGEN_EPS, EIGEN_MAX_ITERS).ok_or_else(|| {
        AnalysisError::NumericInstability("eigendecomposition did not converge".to_string())
    })?;

    let eigenvalues: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    if eigenvalues.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::NumericInstability(
            "eigenvalues are not finite".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .total_cmp(&eigenvalues[a])
            .then_with(|| a.cmp(&b))
    });
    debug!(?eigenvalues, ?order, "covariance spectrum");

    let largest = eigenvalues[order[0]];
    let second = eigenvalues[order[1]];
    if !(largest > 0.0) || second <= RANK_TOLERANCE * largest {
        return Err(AnalysisError::NumericInstability(format!(
            "covariance is singular: top eigenvalues {largest:.3e} and {second:.3e}"
        )));
    }

    let total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();
    let mut components = Array2::zeros((d, N_COMPONENTS));
    let mut explained_variance = [0.0; N_COMPONENTS];
    let mut explained_variance_ratio = [0.0; N_COMPONENTS];

    for (c, &source) in order.iter().take(N_COMPONENTS).enumerate() {
        let mut direction: Vec<f64> = (0..d).map(|r| eigen.eigenvectors[(r, source)]).collect();

        // Pin the sign: largest-magnitude loading positive, first index on ties
        let pivot = direction
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| if v.abs() > direction[best].abs() { i } else { best });
        if direction[pivot] < 0.0 {
            direction.iter_mut().for_each(|v| *v = -*v);
        }

        for (r, value) in direction.into_iter().enumerate() {
            components[[r, c]] = value;
        }
        explained_variance[c] = eigenvalues[source];
        explained_variance_ratio[c] = eigenvalues[source] / total;
    }

    Ok(PcaModel {
        mean,
        components,
        explained_variance,
        explained_variance_ratio,
    })
}

/// Fit PCA and project the batch in one step
pub fn reduce(x: &Array2<f64>) -> crate::Result<Projection> {
    let model = fit_pca(x)?;
    let points = model.transform(x);
    info!(
        pc1 = model.explained_variance_ratio[0],
        pc2 = model.explained_variance_ratio[1],
        "projected onto principal components"
    );
    Ok(Projection { model, points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Array2<f64> {
        array![
            [-1.2, -0.9, -1.1],
            [-0.8, -1.1, -0.7],
            [-0.1, 0.3, -0.2],
            [0.2, -0.2, 0.4],
            [0.9, 1.2, 0.6],
            [1.0, 0.7, 1.0],
            [0.4, -0.5, 0.1],
            [-0.4, 0.5, -0.1],
        ]
    }

    fn covariance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let n = a.len() as f64;
        let ma = a.sum() / n;
        let mb = b.sum() / n;
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - ma) * (y - mb))
            .sum::<f64>()
            / (n - 1.0)
    }

    #[test]
    fn test_scores_are_uncorrelated() {
        let projection = reduce(&sample()).unwrap();
        assert_eq!(projection.points.shape(), &[8, 2]);

        let cov = covariance(projection.points.column(0), projection.points.column(1));
        assert!(cov.abs() < 1e-9, "covariance {cov}");

        let var0 = covariance(projection.points.column(0), projection.points.column(0));
        assert!((var0 - projection.model.explained_variance[0]).abs() < 1e-9);
    }

    #[test]
    fn test_components_are_orthonormal_and_ranked() {
        let model = fit_pca(&sample()).unwrap();
        let c0 = model.components.column(0);
        let c1 = model.components.column(1);

        assert!((c0.dot(&c0) - 1.0).abs() < 1e-9);
        assert!((c1.dot(&c1) - 1.0).abs() < 1e-9);
        assert!(c0.dot(&c1).abs() < 1e-9);

        assert!(model.explained_variance[0] >= model.explained_variance[1]);
        let ratio_sum: f64 = model.explained_variance_ratio.iter().sum();
        assert!(ratio_sum > 0.0 && ratio_sum <= 1.0 + 1e-12);
    }

    #[test]
    fn test_sign_is_pinned() {
        let x = array![[-2.0, -2.1], [-1.0, -0.9], [0.0, 0.1], [1.0, 1.1], [2.0, 1.8]];
        let model = fit_pca(&x).unwrap();
        let first = model.loadings(0);

        assert!(first[0] > 0.0 && first[1] > 0.0);
        assert!((first[0] - first[1]).abs() < 0.1);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let a = reduce(&sample()).unwrap();
        let b = reduce(&sample()).unwrap();
        assert_eq!(a.model, b.model);
        assert_eq!(a.points, b.points);
    }

    #[test]
    fn test_project_matches_transform() {
        let x = sample();
        let projection = reduce(&x).unwrap();
        let single = projection.model.project(x.row(4));
        assert!((single[0] - projection.points[[4, 0]]).abs() < 1e-12);
        assert!((single[1] - projection.points[[4, 1]]).abs() < 1e-12);
    }

    #[test]
    fn test_collinear_input_is_unstable() {
        let x = array![[-1.0, -1.0, -1.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let err = fit_pca(&x).unwrap_err();
        assert!(matches!(err, AnalysisError::NumericInstability(_)));
    }

    #[test]
    fn test_too_few_rows() {
        let x = array![[1.0, 2.0, 3.0]];
        let err = fit_pca(&x).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::DegenerateInput(Degeneracy::TooFewRecords(1))
        ));
    }
}
