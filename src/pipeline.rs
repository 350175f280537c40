//! End-to-end analysis: standardize, project, cluster, label, aggregate

use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{aggregate, AggregateReport};
use crate::archetype::{label_archetypes, Archetype, ArchetypeMap, ClusterAssignments};
use crate::data::{AthleteRecord, Feature, RecordId, Sex};
use crate::error::AnalysisError;
use crate::model::{fit_kmeans, KMeansModel, KMeansParams};
use crate::pca::{reduce, PcaModel};
use crate::standardize::{standardize, StandardScaler, ZeroVariancePolicy};

pub const DEFAULT_SPORT: &str = "Weightlifting";

/// Every tunable of one run; nothing is read from process state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    pub sport: String,
    pub features: Vec<Feature>,
    pub zero_variance: ZeroVariancePolicy,
    pub kmeans: KMeansParams,
    /// Archetype names, lightest rank first
    pub labels: Option<Vec<String>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sport: DEFAULT_SPORT.to_string(),
            features: Feature::ALL.to_vec(),
            zero_variance: ZeroVariancePolicy::default(),
            kmeans: KMeansParams::default(),
            labels: None,
        }
    }
}

/// Immutable outputs of every stage of one run
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub config: AnalysisConfig,
    /// Row order shared by `standardized`, `projected` and `model.labels`
    pub ids: Vec<RecordId>,
    pub scaler: StandardScaler,
    pub standardized: Array2<f64>,
    pub pca: PcaModel,
    pub projected: Array2<f64>,
    pub model: KMeansModel,
    pub assignments: ClusterAssignments,
    pub archetypes: ArchetypeMap,
    pub summary: AggregateReport,
}

/// A projected athlete tagged with what the charts need
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedAthlete {
    pub id: RecordId,
    pub pc1: f64,
    pub pc2: f64,
    pub year: i32,
    pub sex: Sex,
    pub rank: usize,
}

impl AnalysisRun {
    /// Archetype of a record that took part in the run
    pub fn archetype_of(&self, id: RecordId) -> crate::Result<&Archetype> {
        let cluster = self.assignments.require(id)?;
        self.archetypes
            .for_cluster(cluster)
            .ok_or(AnalysisError::MissingAssignment(id))
    }

    /// Join projected coordinates back onto records by id
    pub fn projected_athletes(
        &self,
        records: &[AthleteRecord],
    ) -> crate::Result<Vec<ProjectedAthlete>> {
        let row_of: std::collections::HashMap<RecordId, usize> =
            self.ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        records
            .iter()
            .map(|record| {
                let row = *row_of
                    .get(&record.id)
                    .ok_or(AnalysisError::MissingAssignment(record.id))?;
                Ok(ProjectedAthlete {
                    id: record.id,
                    pc1: self.projected[[row, 0]],
                    pc2: self.projected[[row, 1]],
                    year: record.year,
                    sex: record.sex,
                    rank: self.archetype_of(record.id)?.rank,
                })
            })
            .collect()
    }

    /// Assign an athlete outside the batch to an archetype
    ///
    /// The athlete is scaled with the fitted scaler, projected on the fitted
    /// basis and matched to the nearest centroid.
    pub fn predict(&self, athlete: &AthleteRecord) -> crate::Result<&Archetype> {
        let scaled = self.scaler.transform_record(athlete);
        let point = self.pca.project(scaled.view());
        let cluster = self.model.predict(point.view())?;
        self.archetypes
            .for_cluster(cluster)
            .ok_or(AnalysisError::MissingAssignment(athlete.id))
    }
}

/// Run the full pipeline over cleaned records
///
/// # Arguments
/// * `records` - Cleaned entries of the configured sport
/// * `config` - Feature set, zero-variance policy, k-means parameters and names
///
/// # Returns
/// * `AnalysisRun` holding every stage's output
pub fn run_analysis(
    records: &[AthleteRecord],
    config: &AnalysisConfig,
) -> crate::Result<AnalysisRun> {
    let standardized = standardize(records, &config.features, config.zero_variance)?;
    let projection = reduce(&standardized.features)?;
    let model = fit_kmeans(&projection.points, &config.kmeans)?;

    let assignments =
        ClusterAssignments::new(&standardized.ids, &model.labels, model.n_clusters)?;
    let archetypes = label_archetypes(records, &assignments, config.labels.as_deref())?;
    let summary = aggregate(records, &assignments, &archetypes)?;

    info!(
        sport = %config.sport,
        athletes = records.len(),
        archetypes = archetypes.len(),
        "analysis complete"
    );

    Ok(AnalysisRun {
        config: config.clone(),
        ids: standardized.ids,
        scaler: standardized.scaler,
        standardized: standardized.features,
        pca: projection.model,
        projected: projection.points,
        model,
        assignments,
        archetypes,
        summary,
    })
}
