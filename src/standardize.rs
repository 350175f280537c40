//! Feature standardization (z-scores over the whole batch)

use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use tracing::{info, warn};

use crate::data::{AthleteRecord, Feature, RecordId};
use crate::error::{AnalysisError, Degeneracy};

/// What to do with a dimension whose sample variance is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ZeroVariancePolicy {
    /// Abort the run with a degenerate-input error
    #[default]
    Fail,
    /// Keep the dimension but set every z-score in it to 0
    ZeroScores,
}

/// Sample mean and sample standard deviation (n - 1 divisor) of one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureStats {
    pub feature: Feature,
    pub mean: f64,
    pub std_dev: f64,
}

/// Fitted column statistics, reusable for scoring new athletes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardScaler {
    pub stats: Vec<FeatureStats>,
}

impl StandardScaler {
    /// Fit on a raw feature matrix whose columns follow `features`
    pub fn fit(
        raw: &Array2<f64>,
        features: &[Feature],
        policy: ZeroVariancePolicy,
    ) -> crate::Result<Self> {
        let n = raw.nrows();
        if n == 0 {
            return Err(Degeneracy::EmptyBatch.into());
        }
        if n < 2 {
            return Err(Degeneracy::TooFewRecords(n).into());
        }

        let mut stats = Vec::with_capacity(features.len());
        for (column, &feature) in raw.axis_iter(Axis(1)).zip(features) {
            let (min, max) = column
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                    (lo.min(x), hi.max(x))
                });
            let mut mean = column.sum() / n as f64;
            let variance =
                column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            let mut std_dev = variance.sqrt();

            // Constant is judged on raw values; the float mean may not equal them
            if min == max {
                mean = min;
            }
            if min == max || !(std_dev.is_finite() && std_dev > 0.0) {
                std_dev = 0.0;
                match policy {
                    ZeroVariancePolicy::Fail => {
                        return Err(Degeneracy::ZeroVariance(feature).into());
                    }
                    ZeroVariancePolicy::ZeroScores => {
                        warn!(%feature, "zero variance, scoring dimension as 0");
                    }
                }
            }

            stats.push(FeatureStats {
                feature,
                mean,
                std_dev,
            });
        }

        Ok(Self { stats })
    }

    pub fn features(&self) -> Vec<Feature> {
        self.stats.iter().map(|s| s.feature).collect()
    }

    /// Features that were kept at zero variance under `ZeroScores`
    pub fn zeroed(&self) -> Vec<Feature> {
        self.stats
            .iter()
            .filter(|s| !(s.std_dev.is_finite() && s.std_dev > 0.0))
            .map(|s| s.feature)
            .collect()
    }

    fn scale(stats: &FeatureStats, x: f64) -> f64 {
        if stats.std_dev.is_finite() && stats.std_dev > 0.0 {
            (x - stats.mean) / stats.std_dev
        } else {
            0.0
        }
    }

    pub fn transform(&self, raw: &Array2<f64>) -> Array2<f64> {
        let mut scaled = raw.clone();
        for (mut column, stats) in scaled.axis_iter_mut(Axis(1)).zip(&self.stats) {
            column.mapv_inplace(|x| Self::scale(stats, x));
        }
        scaled
    }

    /// Scale a single athlete's raw values
    pub fn transform_record(&self, record: &AthleteRecord) -> Array1<f64> {
        self.stats
            .iter()
            .map(|stats| Self::scale(stats, record.feature(stats.feature)))
            .collect()
    }
}

/// Standardized feature vectors keyed by record id
#[derive(Debug, Clone)]
pub struct Standardized {
    /// Row i of `features` belongs to `ids[i]`
    pub ids: Vec<RecordId>,
    pub features: Array2<f64>,
    pub scaler: StandardScaler,
}

/// Build the raw (n, d) matrix for the selected features
pub fn feature_matrix(records: &[AthleteRecord], features: &[Feature]) -> Array2<f64> {
    Array2::from_shape_fn((records.len(), features.len()), |(i, j)| {
        records[i].feature(features[j])
    })
}

/// Z-score every selected feature across the full batch
///
/// # Arguments
/// * `records` - Cleaned athlete entries
/// * `features` - Dimensions to standardize, at least two
/// * `policy` - Handling of zero-variance dimensions
pub fn standardize(
    records: &[AthleteRecord],
    features: &[Feature],
    policy: ZeroVariancePolicy,
) -> crate::Result<Standardized> {
    if features.len() < 2 {
        return Err(Degeneracy::TooFewFeatures(features.len()).into());
    }
    if let Some(dup) = features
        .iter()
        .enumerate()
        .find(|(i, f)| features[..*i].contains(*f))
    {
        return Err(AnalysisError::InvalidConfig(format!(
            "feature `{}` selected twice",
            dup.1
        )));
    }

    let raw = feature_matrix(records, features);
    let scaler = StandardScaler::fit(&raw, features, policy)?;
    let features = scaler.transform(&raw);

    info!(
        records = records.len(),
        dims = scaler.stats.len(),
        "standardized features"
    );

    Ok(Standardized {
        ids: records.iter().map(|r| r.id).collect(),
        features,
        scaler,
    })
}
