//! Narrative interpretation and machine-readable run reports

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::AggregateReport;
use crate::archetype::Archetype;
use crate::data::{AthleteTable, DropReport, Feature};
use crate::error::AnalysisError;
use crate::model::Reseed;
use crate::pipeline::{AnalysisConfig, AnalysisRun};
use crate::standardize::StandardScaler;

/// Points used for the silhouette estimate
pub const SILHOUETTE_SAMPLE: usize = 500;

#[derive(Debug, Serialize)]
pub struct PcaSummary {
    pub features: Vec<Feature>,
    /// One row per component, one loading per feature
    pub loadings: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct ClusteringSummary {
    pub iterations: usize,
    pub converged: bool,
    pub inertia: f64,
    pub silhouette_sample: f64,
    pub cluster_sizes: Vec<usize>,
    pub reseeds: Vec<Reseed>,
}

/// Everything a downstream consumer needs from one run
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub tool_version: &'static str,
    pub config: &'a AnalysisConfig,
    pub rows_for_sport: usize,
    pub athletes: usize,
    pub drops: &'a DropReport,
    pub scaler: &'a StandardScaler,
    pub pca: PcaSummary,
    pub clustering: ClusteringSummary,
    pub archetypes: Vec<&'a Archetype>,
    pub summary: &'a AggregateReport,
}

impl<'a> RunReport<'a> {
    pub fn new(table: &'a AthleteTable, run: &'a AnalysisRun) -> Self {
        let features = run.scaler.features();
        let pca = PcaSummary {
            loadings: (0..run.pca.components.ncols())
                .map(|c| run.pca.loadings(c))
                .collect(),
            explained_variance: run.pca.explained_variance.to_vec(),
            explained_variance_ratio: run.pca.explained_variance_ratio.to_vec(),
            features,
        };
        let clustering = ClusteringSummary {
            iterations: run.model.iterations,
            converged: run.model.converged,
            inertia: run.model.inertia,
            silhouette_sample: run
                .model
                .compute_silhouette_sample(&run.projected, SILHOUETTE_SAMPLE),
            cluster_sizes: run.model.cluster_sizes(),
            reseeds: run.model.reseeds.clone(),
        };

        Self {
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION"),
            config: &run.config,
            rows_for_sport: table.rows_for_sport,
            athletes: table.records.len(),
            drops: &table.drops,
            scaler: &run.scaler,
            pca,
            clustering,
            archetypes: run.archetypes.iter().collect(),
            summary: &run.summary,
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> crate::Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| AnalysisError::io(path, e))
    }
}

/// Plain-text interpretation of a run
pub struct Narrative<'a> {
    pub report: &'a RunReport<'a>,
}

impl fmt::Display for Narrative<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let config = report.config;

        writeln!(f, "=== {} athlete archetypes ===", config.sport)?;
        writeln!(
            f,
            "Entries for sport: {} (kept {}, dropped {})",
            report.rows_for_sport,
            report.athletes,
            report.drops.total()
        )?;
        write_drops(f, report.drops)?;

        writeln!(f, "\n=== Principal Components ===")?;
        let ratio = &report.pca.explained_variance_ratio;
        writeln!(
            f,
            "PC1 explains {:.1}% of variance, PC2 {:.1}% ({:.1}% together)",
            ratio[0] * 100.0,
            ratio[1] * 100.0,
            (ratio[0] + ratio[1]) * 100.0
        )?;
        for (c, loadings) in report.pca.loadings.iter().enumerate() {
            let parts: Vec<String> = report
                .pca
                .features
                .iter()
                .zip(loadings)
                .map(|(feature, value)| format!("{feature} {value:+.2}"))
                .collect();
            writeln!(f, "  PC{} loadings: {}", c + 1, parts.join(", "))?;
        }

        writeln!(f, "\n=== Clustering ===")?;
        let clustering = &report.clustering;
        writeln!(
            f,
            "K-Means: k={}, seed={}, {} iteration(s){}",
            config.kmeans.n_clusters,
            config.kmeans.seed,
            clustering.iterations,
            if clustering.converged { " (converged)" } else { " (iteration limit reached)" }
        )?;
        writeln!(f, "Within-cluster sum of squares: {:.2}", clustering.inertia)?;
        writeln!(f, "Silhouette score (sample): {:.3}", clustering.silhouette_sample)?;
        if !clustering.reseeds.is_empty() {
            writeln!(f, "Empty clusters re-seeded: {}", clustering.reseeds.len())?;
        }

        writeln!(f, "\n=== Archetypes (lightest first) ===")?;
        writeln!(
            f,
            "  {:<24} | {:>7} | {:>13} | {:>13} | {:>13}",
            "Archetype", "Count", "Age", "Height", "Weight"
        )?;
        for archetype in &report.archetypes {
            let profile = &archetype.profile;
            let cell = |s: Option<crate::archetype::FeatureSummary>| match s {
                Some(s) => format!("{:.1} ± {:.1}", s.mean, s.std_dev),
                None => "-".to_string(),
            };
            writeln!(
                f,
                "  {:<24} | {:>7} | {:>13} | {:>13} | {:>13}",
                archetype.name,
                profile.count,
                cell(profile.age),
                cell(profile.height),
                cell(profile.weight)
            )?;
        }

        writeln!(f, "\n=== Medal rate (lowest first) ===")?;
        let summary = report.summary;
        for s in summary.by_medal_rate() {
            let composition: Vec<String> = summary
                .sexes
                .iter()
                .map(|&sex| {
                    let share = s.sex_fraction(sex).unwrap_or(0.0);
                    format!("{sex} {:.0}%", share * 100.0)
                })
                .collect();
            writeln!(
                f,
                "  {:<24} {:>6.1}% of {:>5} | {}",
                s.name,
                s.medal_rate.unwrap_or(0.0) * 100.0,
                s.count,
                composition.join(", ")
            )?;
        }

        let lowest = summary.by_medal_rate().next();
        let highest = summary.by_medal_rate().last();
        if let (Some(low), Some(high)) = (lowest, highest) {
            let (low_rate, high_rate) = (
                low.medal_rate.unwrap_or(0.0),
                high.medal_rate.unwrap_or(0.0),
            );
            writeln!(f)?;
            if low.rank == high.rank || high_rate <= low_rate {
                writeln!(
                    f,
                    "Medal rates do not separate the archetypes ({:.1}% across the board).",
                    high_rate * 100.0
                )?;
            } else if low_rate > 0.0 {
                writeln!(
                    f,
                    "\"{}\" medal most often ({:.1}%), {:.1}x the rate of \"{}\" ({:.1}%).",
                    high.name,
                    high_rate * 100.0,
                    high_rate / low_rate,
                    low.name,
                    low_rate * 100.0
                )?;
            } else {
                writeln!(
                    f,
                    "\"{}\" medal most often ({:.1}%); \"{}\" never reached the podium.",
                    high.name,
                    high_rate * 100.0,
                    low.name
                )?;
            }
        }

        Ok(())
    }
}

fn write_drops(f: &mut fmt::Formatter<'_>, drops: &DropReport) -> fmt::Result {
    let reasons = [
        ("missing height", drops.missing_height),
        ("missing weight", drops.missing_weight),
        ("missing age", drops.missing_age),
        ("missing sex", drops.missing_sex),
        ("missing year", drops.missing_year),
        ("invalid value", drops.invalid_value),
        ("unknown sex", drops.unknown_sex),
        ("unknown medal", drops.unknown_medal),
    ];
    for (reason, count) in reasons.iter().filter(|(_, count)| *count > 0) {
        writeln!(f, "  dropped {count} row(s): {reason}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{clean_rows, RawRow};
    use crate::pipeline::run_analysis;
    use crate::model::KMeansParams;

    fn table() -> AthleteTable {
        let rows = (0..12u64).map(|i| {
            let heavy = i % 2 == 0;
            RawRow {
                row: i,
                age: Some(20.0 + 0.5 * (i % 5) as f64),
                height: Some(if heavy { 178.0 } else { 152.0 } + (i % 3) as f64),
                weight: Some(if heavy { 100.0 } else { 55.0 } + (i % 4) as f64),
                sex: Some(if i % 3 == 0 { "F" } else { "M" }.to_string()),
                year: Some(2000 + 4 * (i % 3) as i64),
                medal: if heavy && i % 4 == 0 { Some("Gold".to_string()) } else { None },
            }
        });
        let mut rows: Vec<RawRow> = rows.collect();
        rows.push(RawRow {
            row: 99,
            height: None,
            ..rows[0].clone()
        });
        let (records, drops) = clean_rows(rows);
        AthleteTable {
            sport: "Weightlifting".to_string(),
            rows_for_sport: 13,
            records,
            drops,
        }
    }

    fn analysed(table: &AthleteTable) -> AnalysisRun {
        let config = AnalysisConfig {
            kmeans: KMeansParams {
                n_clusters: 2,
                max_iters: 50,
                seed: 7,
            },
            ..AnalysisConfig::default()
        };
        run_analysis(&table.records, &config).unwrap()
    }

    #[test]
    fn test_narrative_mentions_every_archetype() {
        let table = table();
        let run = analysed(&table);
        let report = RunReport::new(&table, &run);
        let text = Narrative { report: &report }.to_string();

        assert!(text.contains("=== Weightlifting athlete archetypes ==="));
        assert!(text.contains("dropped 1 row(s): missing height"));
        assert!(text.contains("Archetype 1"));
        assert!(text.contains("Archetype 2"));
        assert!(text.contains("\"Archetype 2\" medal most often"));
    }

    #[test]
    fn test_json_report_roundtrips_through_serde_value() {
        let table = table();
        let run = analysed(&table);
        let report = RunReport::new(&table, &run);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["athletes"], 12);
        assert_eq!(value["drops"]["missing_height"], 1);
        assert_eq!(value["config"]["zero_variance"], "fail");
        assert_eq!(value["archetypes"].as_array().unwrap().len(), 2);
        assert!(value["summary"]["summaries"][0]["sex_composition"]["F"].is_number());
    }

    #[test]
    fn test_write_json() {
        let table = table();
        let run = analysed(&table);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        RunReport::new(&table, &run).write_json(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("\"explained_variance_ratio\""));
    }
}
