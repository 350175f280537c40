//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::data::{AthleteRecord, Feature, RecordId, Sex};
use crate::error::AnalysisError;
use crate::fetch::DEFAULT_DATASET_URL;
use crate::model::KMeansParams;
use crate::pipeline::{AnalysisConfig, DEFAULT_SPORT};
use crate::standardize::ZeroVariancePolicy;

/// Athlete archetype discovery: PCA + K-Means over Olympic results
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path of the cached athlete CSV (downloaded when missing)
    #[arg(short, long, default_value = "data/olympics.csv")]
    pub input: PathBuf,

    /// Remote location of the dataset
    #[arg(long, default_value = DEFAULT_DATASET_URL)]
    pub url: String,

    /// Download the dataset even if the cache exists
    #[arg(long)]
    pub refresh: bool,

    /// Sport to analyse (exact value of the `sport` column)
    #[arg(short, long, default_value = DEFAULT_SPORT)]
    pub sport: String,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "5")]
    pub clusters: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Features to standardize and project
    #[arg(long, value_enum, value_delimiter = ',', default_value = "age,height,weight")]
    pub features: Vec<Feature>,

    /// Handling of a feature with zero variance
    #[arg(long, value_enum, default_value_t = ZeroVariancePolicy::Fail)]
    pub zero_variance: ZeroVariancePolicy,

    /// Archetype names, lightest cluster first (exactly one per cluster)
    #[arg(long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    /// Output path for the projection scatter; bar charts go to `<stem>_rates.png`
    #[arg(short, long, default_value = "archetypes.png")]
    pub output: PathBuf,

    /// Also write a JSON run report to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Prediction mode: provide age,height,weight as comma-separated string
    /// Example: --predict "27,175,94.5"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            sport: self.sport.clone(),
            features: self.features.clone(),
            zero_variance: self.zero_variance,
            kmeans: KMeansParams {
                n_clusters: self.clusters,
                max_iters: self.max_iters,
                seed: self.seed,
            },
            labels: self.labels.clone(),
        }
    }

    /// Parse the athlete described by the predict string
    /// Expected format: "age,height,weight"
    pub fn parse_predict_athlete(&self) -> crate::Result<Option<AthleteRecord>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 3 {
            return Err(AnalysisError::InvalidConfig(
                "predict values must be in format 'age,height,weight'".to_string(),
            ));
        }

        let mut values = [0.0; 3];
        for ((slot, part), feature) in values.iter_mut().zip(&parts).zip(Feature::ALL) {
            *slot = part
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .ok_or_else(|| {
                    AnalysisError::InvalidConfig(format!("invalid {feature} value: {part}"))
                })?;
        }

        Ok(Some(AthleteRecord {
            id: RecordId(u64::MAX),
            age: values[0],
            height: values[1],
            weight: values[2],
            sex: Sex::Male,
            year: 0,
            medal: None,
        }))
    }
}
