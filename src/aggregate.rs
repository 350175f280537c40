//! Per-archetype medal rate and sex composition

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::archetype::{ArchetypeMap, ClusterAssignments};
use crate::data::{AthleteRecord, Sex};
use crate::error::AnalysisError;

/// Reporting row for one archetype
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchetypeSummary {
    pub rank: usize,
    pub name: String,
    pub cluster: usize,
    pub count: usize,
    pub medalists: usize,
    /// `None` when the archetype has no members
    pub medal_rate: Option<f64>,
    /// Fraction per sex observed anywhere in the batch; `None` when empty
    pub sex_composition: Option<BTreeMap<Sex, f64>>,
}

impl ArchetypeSummary {
    /// Medal rate, failing explicitly for an empty archetype
    pub fn medal_rate(&self) -> crate::Result<f64> {
        self.medal_rate
            .ok_or_else(|| AnalysisError::EmptyArchetype(self.name.clone()))
    }

    /// Fraction of members of `sex`, 0 when the sex is absent from this archetype
    pub fn sex_fraction(&self, sex: Sex) -> crate::Result<f64> {
        let composition = self
            .sex_composition
            .as_ref()
            .ok_or_else(|| AnalysisError::EmptyArchetype(self.name.clone()))?;
        Ok(composition.get(&sex).copied().unwrap_or(0.0))
    }
}

/// Summaries for every archetype plus the rendering order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total: usize,
    /// Sex categories observed in the batch
    pub sexes: Vec<Sex>,
    /// In archetype rank order
    pub summaries: Vec<ArchetypeSummary>,
    /// Ranks of non-empty archetypes sorted ascending by medal rate (ties by rank)
    pub medal_rate_order: Vec<usize>,
}

impl AggregateReport {
    /// Summaries in ascending medal-rate order
    pub fn by_medal_rate(&self) -> impl Iterator<Item = &ArchetypeSummary> + '_ {
        self.medal_rate_order
            .iter()
            .filter_map(move |&rank| self.summaries.get(rank))
    }

    pub fn summary(&self, name: &str) -> Option<&ArchetypeSummary> {
        self.summaries.iter().find(|s| s.name == name)
    }
}

/// Compute medal rate and sex composition per archetype
///
/// Pure over its inputs: the same labeled data always yields the same report.
pub fn aggregate(
    records: &[AthleteRecord],
    assignments: &ClusterAssignments,
    archetypes: &ArchetypeMap,
) -> crate::Result<AggregateReport> {
    let sexes: BTreeSet<Sex> = records.iter().map(|r| r.sex).collect();

    let mut counts = vec![0usize; archetypes.len()];
    let mut medalists = vec![0usize; archetypes.len()];
    let mut by_sex: Vec<BTreeMap<Sex, usize>> = vec![BTreeMap::new(); archetypes.len()];

    for record in records {
        let cluster = assignments.require(record.id)?;
        let rank = archetypes
            .for_cluster(cluster)
            .map(|a| a.rank)
            .ok_or(AnalysisError::MissingAssignment(record.id))?;

        counts[rank] += 1;
        if record.medalist() {
            medalists[rank] += 1;
        }
        *by_sex[rank].entry(record.sex).or_insert(0) += 1;
    }

    let summaries: Vec<ArchetypeSummary> = archetypes
        .iter()
        .map(|archetype| {
            let rank = archetype.rank;
            let count = counts[rank];
            let (medal_rate, sex_composition) = if count == 0 {
                (None, None)
            } else {
                let total = count as f64;
                let composition = sexes
                    .iter()
                    .map(|&sex| {
                        let n = by_sex[rank].get(&sex).copied().unwrap_or(0);
                        (sex, n as f64 / total)
                    })
                    .collect();
                (Some(medalists[rank] as f64 / total), Some(composition))
            };

            ArchetypeSummary {
                rank,
                name: archetype.name.clone(),
                cluster: archetype.cluster(),
                count,
                medalists: medalists[rank],
                medal_rate,
                sex_composition,
            }
        })
        .collect();

    let mut medal_rate_order: Vec<usize> = summaries
        .iter()
        .filter(|s| s.medal_rate.is_some())
        .map(|s| s.rank)
        .collect();
    medal_rate_order.sort_by(|&a, &b| {
        let rate = |r: usize| summaries[r].medal_rate.unwrap_or(f64::INFINITY);
        rate(a).total_cmp(&rate(b)).then_with(|| a.cmp(&b))
    });

    Ok(AggregateReport {
        total: records.len(),
        sexes: sexes.into_iter().collect(),
        summaries,
        medal_rate_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::label_archetypes;
    use crate::data::{Medal, RecordId};
    use ndarray::Array1;
    use proptest::prelude::*;

    fn record(id: u64, weight: f64, sex: Sex, medal: Option<Medal>) -> AthleteRecord {
        AthleteRecord {
            id: RecordId(id),
            age: 25.0,
            height: 170.0,
            weight,
            sex,
            year: 2000,
            medal,
        }
    }

    fn labeled(
        records: &[AthleteRecord],
        labels: Vec<usize>,
        k: usize,
    ) -> (ClusterAssignments, ArchetypeMap) {
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        let assignments = ClusterAssignments::new(&ids, &Array1::from(labels), k).unwrap();
        let archetypes = label_archetypes(records, &assignments, None).unwrap();
        (assignments, archetypes)
    }

    #[test]
    fn test_medal_rate_and_composition() {
        let records = vec![
            record(0, 50.0, Sex::Female, None),
            record(1, 52.0, Sex::Female, None),
            record(2, 95.0, Sex::Male, Some(Medal::Gold)),
            record(3, 97.0, Sex::Male, None),
            record(4, 93.0, Sex::Female, Some(Medal::Silver)),
            record(5, 98.0, Sex::Male, None),
        ];
        let (assignments, archetypes) = labeled(&records, vec![1, 1, 0, 0, 0, 0], 2);
        let report = aggregate(&records, &assignments, &archetypes).unwrap();

        assert_eq!(report.total, 6);
        assert_eq!(report.sexes, vec![Sex::Female, Sex::Male]);

        let light = &report.summaries[0];
        assert_eq!(light.cluster, 1);
        assert_eq!(light.medal_rate().unwrap(), 0.0);
        // Composition reports the absent sex as 0
        assert_eq!(light.sex_fraction(Sex::Male).unwrap(), 0.0);
        assert_eq!(light.sex_composition.as_ref().unwrap().len(), 2);

        let heavy = &report.summaries[1];
        assert_eq!(heavy.medalists, 2);
        assert!((heavy.medal_rate().unwrap() - 0.5).abs() < 1e-12);
        assert!((heavy.sex_fraction(Sex::Male).unwrap() - 0.75).abs() < 1e-12);

        assert_eq!(report.medal_rate_order, vec![0, 1]);
    }

    #[test]
    fn test_empty_archetype_has_no_rate() {
        let records = vec![
            record(0, 50.0, Sex::Female, None),
            record(1, 90.0, Sex::Male, Some(Medal::Bronze)),
        ];
        let (assignments, archetypes) = labeled(&records, vec![0, 2], 3);
        let report = aggregate(&records, &assignments, &archetypes).unwrap();

        let empty = &report.summaries[2];
        assert_eq!(empty.count, 0);
        assert!(empty.medal_rate.is_none());
        assert!(matches!(
            empty.medal_rate(),
            Err(AnalysisError::EmptyArchetype(_))
        ));
        assert!(empty.sex_fraction(Sex::Female).is_err());
        assert_eq!(report.medal_rate_order, vec![0, 1]);
        assert_eq!(report.by_medal_rate().count(), 2);
    }

    #[test]
    fn test_ordering_ascending_by_rate() {
        let records = vec![
            record(0, 50.0, Sex::Female, Some(Medal::Gold)),
            record(1, 70.0, Sex::Female, None),
            record(2, 90.0, Sex::Male, Some(Medal::Gold)),
            record(3, 91.0, Sex::Male, None),
        ];
        let (assignments, archetypes) = labeled(&records, vec![0, 1, 2, 2], 3);
        let report = aggregate(&records, &assignments, &archetypes).unwrap();

        let rates: Vec<f64> = report
            .by_medal_rate()
            .map(|s| s.medal_rate.unwrap())
            .collect();
        assert_eq!(rates, vec![0.0, 0.5, 1.0]);
        assert_eq!(report.summary("Archetype 1").unwrap().medalists, 1);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let records = vec![
            record(0, 50.0, Sex::Female, None),
            record(1, 90.0, Sex::Male, Some(Medal::Bronze)),
            record(2, 92.0, Sex::Male, None),
        ];
        let (assignments, archetypes) = labeled(&records, vec![0, 1, 1], 2);
        let first = aggregate(&records, &assignments, &archetypes).unwrap();
        let second = aggregate(&records, &assignments, &archetypes).unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_rates_bounded_and_compositions_sum_to_one(
            rows in prop::collection::vec((0usize..4, any::<bool>(), any::<bool>(), 40.0f64..150.0), 1..80)
        ) {
            let records: Vec<AthleteRecord> = rows
                .iter()
                .enumerate()
                .map(|(i, &(_, female, medal, weight))| {
                    let sex = if female { Sex::Female } else { Sex::Male };
                    record(i as u64, weight, sex, medal.then_some(Medal::Gold))
                })
                .collect();
            let labels: Vec<usize> = rows.iter().map(|r| r.0).collect();
            let (assignments, archetypes) = labeled(&records, labels, 4);
            let report = aggregate(&records, &assignments, &archetypes).unwrap();

            let counted: usize = report.summaries.iter().map(|s| s.count).sum();
            prop_assert_eq!(counted, records.len());

            for summary in &report.summaries {
                if let Some(rate) = summary.medal_rate {
                    prop_assert!((0.0..=1.0).contains(&rate));
                    let total: f64 = summary.sex_composition.as_ref().unwrap().values().sum();
                    prop_assert!((total - 1.0).abs() < 1e-9);
                } else {
                    prop_assert_eq!(summary.count, 0);
                }
            }
        }
    }
}
