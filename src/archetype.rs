//! Archetype labeling: data-driven names for k-means clusters
//!
//! Raw cluster ids carry no meaning across seeds, so names are assigned by
//! rank: clusters are sorted ascending by mean weight, then mean age, then
//! cluster id, with empty clusters last. Rank r takes the r-th name.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ndarray::Array1;
use serde::Serialize;

use crate::data::{AthleteRecord, RecordId};
use crate::error::AnalysisError;

/// Default names for five clusters, lightest rank first
pub const DEFAULT_FIVE_LABELS: [&str; 5] = [
    "Rookie lightweights",
    "Veteran lightweights",
    "Middleweight regulars",
    "Heavyweight contenders",
    "Super heavy elites",
];

/// Default label ladder for `k` clusters
pub fn default_labels(k: usize) -> Vec<String> {
    if k == DEFAULT_FIVE_LABELS.len() {
        DEFAULT_FIVE_LABELS.iter().map(|s| s.to_string()).collect()
    } else {
        (1..=k).map(|r| format!("Archetype {r}")).collect()
    }
}

/// Cluster id per record, keyed by record id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignments {
    by_record: BTreeMap<RecordId, usize>,
    n_clusters: usize,
}

impl ClusterAssignments {
    /// Pair record ids with the labels produced for the same rows
    pub fn new(ids: &[RecordId], labels: &Array1<usize>, n_clusters: usize) -> crate::Result<Self> {
        if ids.len() != labels.len() {
            return Err(AnalysisError::InvalidConfig(format!(
                "{} record ids but {} cluster labels",
                ids.len(),
                labels.len()
            )));
        }

        let mut by_record = BTreeMap::new();
        for (&id, &label) in ids.iter().zip(labels.iter()) {
            if label >= n_clusters {
                return Err(AnalysisError::InvalidConfig(format!(
                    "label {label} out of range for {n_clusters} clusters"
                )));
            }
            if by_record.insert(id, label).is_some() {
                return Err(AnalysisError::InvalidConfig(format!(
                    "record {id} assigned twice"
                )));
            }
        }

        Ok(Self {
            by_record,
            n_clusters,
        })
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn len(&self) -> usize {
        self.by_record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_record.is_empty()
    }

    pub fn cluster_of(&self, id: RecordId) -> Option<usize> {
        self.by_record.get(&id).copied()
    }

    pub(crate) fn require(&self, id: RecordId) -> crate::Result<usize> {
        self.cluster_of(id)
            .ok_or(AnalysisError::MissingAssignment(id))
    }
}

/// Mean and sample standard deviation of one attribute within a cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub mean: f64,
    pub std_dev: f64,
}

impl FeatureSummary {
    fn of(values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n == 0 {
            return None;
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        Some(Self { mean, std_dev })
    }
}

/// Raw-unit summary of one cluster; attribute summaries are `None` when empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub count: usize,
    pub age: Option<FeatureSummary>,
    pub height: Option<FeatureSummary>,
    pub weight: Option<FeatureSummary>,
}

impl ClusterProfile {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        match (&self.weight, &other.weight) {
            (None, None) => self.cluster.cmp(&other.cluster),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let age = |p: &ClusterProfile| p.age.map_or(f64::INFINITY, |s| s.mean);
                a.mean
                    .total_cmp(&b.mean)
                    .then_with(|| age(self).total_cmp(&age(other)))
                    .then_with(|| self.cluster.cmp(&other.cluster))
            }
        }
    }
}

/// Summarize age, height and weight per cluster, indexed by cluster id
pub fn profile_clusters(
    records: &[AthleteRecord],
    assignments: &ClusterAssignments,
) -> crate::Result<Vec<ClusterProfile>> {
    let k = assignments.n_clusters();
    let mut members: Vec<Vec<&AthleteRecord>> = vec![Vec::new(); k];
    for record in records {
        members[assignments.require(record.id)?].push(record);
    }

    Ok(members
        .iter()
        .enumerate()
        .map(|(cluster, group)| {
            let column = |f: fn(&AthleteRecord) -> f64| group.iter().map(|r| f(r)).collect::<Vec<_>>();
            ClusterProfile {
                cluster,
                count: group.len(),
                age: FeatureSummary::of(&column(|r| r.age)),
                height: FeatureSummary::of(&column(|r| r.height)),
                weight: FeatureSummary::of(&column(|r| r.weight)),
            }
        })
        .collect())
}

/// A named cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Archetype {
    /// 0 for the lightest cluster
    pub rank: usize,
    pub name: String,
    pub profile: ClusterProfile,
}

impl Archetype {
    pub fn cluster(&self) -> usize {
        self.profile.cluster
    }
}

/// Frozen cluster-to-archetype mapping for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeMap {
    /// In rank order
    archetypes: Vec<Archetype>,
    /// Indexed by cluster id
    rank_of_cluster: Vec<usize>,
}

impl ArchetypeMap {
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Archetypes in rank order
    pub fn iter(&self) -> std::slice::Iter<'_, Archetype> {
        self.archetypes.iter()
    }

    pub fn by_rank(&self, rank: usize) -> Option<&Archetype> {
        self.archetypes.get(rank)
    }

    pub fn for_cluster(&self, cluster: usize) -> Option<&Archetype> {
        self.rank_of_cluster
            .get(cluster)
            .and_then(|&rank| self.archetypes.get(rank))
    }

    pub fn name_of(&self, cluster: usize) -> Option<&str> {
        self.for_cluster(cluster).map(|a| a.name.as_str())
    }
}

/// Name every cluster by its weight/age rank
///
/// # Arguments
/// * `records` - Athlete entries that were clustered
/// * `assignments` - Cluster id per record id
/// * `names` - Optional names, lightest rank first; defaults to `default_labels(k)`
pub fn label_archetypes(
    records: &[AthleteRecord],
    assignments: &ClusterAssignments,
    names: Option<&[String]>,
) -> crate::Result<ArchetypeMap> {
    let k = assignments.n_clusters();
    let names = match names {
        Some(names) => validate_names(names, k)?,
        None => default_labels(k),
    };

    let mut profiles = profile_clusters(records, assignments)?;
    profiles.sort_by(|a, b| a.rank_cmp(b));

    let mut rank_of_cluster = vec![0; k];
    let archetypes: Vec<Archetype> = profiles
        .into_iter()
        .zip(names)
        .enumerate()
        .map(|(rank, (profile, name))| {
            rank_of_cluster[profile.cluster] = rank;
            Archetype {
                rank,
                name,
                profile,
            }
        })
        .collect();

    Ok(ArchetypeMap {
        archetypes,
        rank_of_cluster,
    })
}

fn validate_names(names: &[String], k: usize) -> crate::Result<Vec<String>> {
    if names.len() != k {
        return Err(AnalysisError::InvalidConfig(format!(
            "{} archetype names given for {k} clusters",
            names.len()
        )));
    }
    for (i, name) in names.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "archetype names must not be blank".to_string(),
            ));
        }
        if names[..i].contains(name) {
            return Err(AnalysisError::InvalidConfig(format!(
                "archetype name `{name}` used twice"
            )));
        }
    }
    Ok(names.iter().map(|n| n.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sex;

    fn record(id: u64, age: f64, weight: f64) -> AthleteRecord {
        AthleteRecord {
            id: RecordId(id),
            age,
            height: 100.0 + weight,
            weight,
            sex: Sex::Female,
            year: 2016,
            medal: None,
        }
    }

    fn fixture() -> (Vec<AthleteRecord>, ClusterAssignments) {
        let records = vec![
            record(10, 30.0, 100.0),
            record(11, 32.0, 104.0),
            record(12, 20.0, 50.0),
            record(13, 22.0, 54.0),
            record(14, 26.0, 75.0),
        ];
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        let labels = Array1::from(vec![0, 0, 1, 1, 2]);
        let assignments = ClusterAssignments::new(&ids, &labels, 3).unwrap();
        (records, assignments)
    }

    #[test]
    fn test_profiles() {
        let (records, assignments) = fixture();
        let profiles = profile_clusters(&records, &assignments).unwrap();

        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].count, 2);
        assert!((profiles[0].weight.unwrap().mean - 102.0).abs() < 1e-12);
        assert!((profiles[0].age.unwrap().std_dev - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(profiles[2].count, 1);
        assert_eq!(profiles[2].weight.unwrap().std_dev, 0.0);
    }

    #[test]
    fn test_ranked_by_weight() {
        let (records, assignments) = fixture();
        let map = label_archetypes(&records, &assignments, None).unwrap();

        let clusters: Vec<usize> = map.iter().map(|a| a.cluster()).collect();
        assert_eq!(clusters, vec![1, 2, 0]);
        assert_eq!(map.name_of(1), Some("Archetype 1"));
        assert_eq!(map.name_of(0), Some("Archetype 3"));
        assert_eq!(map.for_cluster(2).unwrap().rank, 1);
        assert_eq!(map.by_rank(2).unwrap().cluster(), 0);
    }

    #[test]
    fn test_names_follow_data_not_cluster_ids() {
        let (records, assignments) = fixture();
        let baseline = label_archetypes(&records, &assignments, None).unwrap();

        // Same partition with cluster ids permuted
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        let permuted = ClusterAssignments::new(&ids, &Array1::from(vec![2, 2, 0, 0, 1]), 3).unwrap();
        let relabeled = label_archetypes(&records, &permuted, None).unwrap();

        for record in &records {
            let a = baseline.name_of(assignments.cluster_of(record.id).unwrap());
            let b = relabeled.name_of(permuted.cluster_of(record.id).unwrap());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_equal_weight_ranks_by_age() {
        let records = vec![record(0, 35.0, 70.0), record(1, 21.0, 70.0)];
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        let assignments = ClusterAssignments::new(&ids, &Array1::from(vec![0, 1]), 2).unwrap();

        let map = label_archetypes(&records, &assignments, None).unwrap();
        assert_eq!(map.by_rank(0).unwrap().cluster(), 1);
    }

    #[test]
    fn test_empty_cluster_ranks_last() {
        let records = vec![record(0, 25.0, 90.0), record(1, 21.0, 60.0)];
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        let assignments = ClusterAssignments::new(&ids, &Array1::from(vec![1, 2]), 3).unwrap();

        let map = label_archetypes(&records, &assignments, None).unwrap();
        let last = map.by_rank(2).unwrap();
        assert_eq!(last.cluster(), 0);
        assert_eq!(last.profile.count, 0);
        assert!(last.profile.weight.is_none());
    }

    #[test]
    fn test_default_five_labels() {
        let labels = default_labels(5);
        assert_eq!(labels[0], "Rookie lightweights");
        assert_eq!(labels[4], "Super heavy elites");
        assert_eq!(default_labels(2), vec!["Archetype 1", "Archetype 2"]);
    }

    #[test]
    fn test_custom_names() {
        let (records, assignments) = fixture();
        let names: Vec<String> = ["Light", "Middle", "Heavy"].iter().map(|s| s.to_string()).collect();
        let map = label_archetypes(&records, &assignments, Some(&names)).unwrap();
        assert_eq!(map.name_of(0), Some("Heavy"));

        let short = vec!["Only".to_string()];
        assert!(matches!(
            label_archetypes(&records, &assignments, Some(&short)),
            Err(AnalysisError::InvalidConfig(_))
        ));

        let dup: Vec<String> = ["A", "B", "A"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(
            label_archetypes(&records, &assignments, Some(&dup)),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_assignment() {
        let (mut records, assignments) = fixture();
        records.push(record(99, 40.0, 80.0));
        let err = label_archetypes(&records, &assignments, None).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingAssignment(RecordId(99))));
    }

    #[test]
    fn test_assignment_validation() {
        let ids = vec![RecordId(1), RecordId(1)];
        assert!(ClusterAssignments::new(&ids, &Array1::from(vec![0, 1]), 2).is_err());
        assert!(ClusterAssignments::new(&ids[..1], &Array1::from(vec![0, 1]), 2).is_err());
        assert!(ClusterAssignments::new(&ids[..1], &Array1::from(vec![3]), 2).is_err());
    }
}
