//! Visualization functions using Plotters for archetype analysis

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Result;
use plotters::prelude::*;
use tracing::info;

use crate::aggregate::{AggregateReport, ArchetypeSummary};
use crate::data::{AthleteRecord, Sex};
use crate::pipeline::AnalysisRun;

/// Color palette indexed by archetype rank
const ARCHETYPE_COLORS: [RGBColor; 8] = [
    RED,
    BLUE,
    GREEN,
    RGBColor(230, 150, 0),
    MAGENTA,
    CYAN,
    RGBColor(120, 70, 20),
    BLACK,
];

const PANEL_SIZE: (u32, u32) = (380, 300);
const LEGEND_WIDTH: u32 = 240;

fn archetype_color(rank: usize) -> RGBColor {
    ARCHETYPE_COLORS[rank % ARCHETYPE_COLORS.len()]
}

fn sex_color(sex: Sex) -> RGBColor {
    match sex {
        Sex::Female => RGBColor(214, 96, 77),
        Sex::Male => RGBColor(67, 147, 195),
    }
}

fn sex_label(sex: Sex) -> &'static str {
    match sex {
        Sex::Female => "Female",
        Sex::Male => "Male",
    }
}

/// Path of the bar-chart pair that accompanies a scatter plot
pub fn rates_chart_path(scatter_path: &Path) -> PathBuf {
    let stem = scatter_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archetypes".to_string());
    let extension = scatter_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    scatter_path.with_file_name(format!("{stem}_rates.{extension}"))
}

fn segment_index(x: &SegmentValue<usize>, n: usize) -> usize {
    match x {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => *i,
        SegmentValue::Last => n,
    }
}

/// Axis label of a bar slot; the trailing edge has none
fn segment_label(names: &[&str], x: &SegmentValue<usize>) -> String {
    names
        .get(segment_index(x, names.len()))
        .map(|name| name.to_string())
        .unwrap_or_default()
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let pad = ((max - min) * 0.05).max(0.5);
    (min - pad)..(max + pad)
}

/// Scatter of principal-component scores, one panel per Olympic year
///
/// # Arguments
/// * `run` - Completed analysis
/// * `records` - The records the run was fitted on (joined by id)
/// * `output_path` - Path to save the PNG plot
pub fn create_projection_scatter(
    run: &AnalysisRun,
    records: &[AthleteRecord],
    output_path: &Path,
) -> Result<()> {
    let athletes = run.projected_athletes(records)?;
    if athletes.is_empty() {
        anyhow::bail!("No athletes to plot");
    }

    let years: BTreeSet<i32> = athletes.iter().map(|a| a.year).collect();
    let cols = (years.len() as f64).sqrt().ceil() as usize;
    let rows = years.len().div_ceil(cols);
    let x_range = padded_range(athletes.iter().map(|a| a.pc1));
    let y_range = padded_range(athletes.iter().map(|a| a.pc2));

    let plot_width = PANEL_SIZE.0 * cols as u32;
    let size = (plot_width + LEGEND_WIDTH, PANEL_SIZE.1 * rows as u32 + 60);
    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!("{}: athletes on the first two principal components", run.config.sport),
        ("sans-serif", 28),
    )?;

    let (plot_area, legend_area) = root.split_horizontally(plot_width as i32);
    let panels = plot_area.split_evenly((rows, cols));

    for (panel, &year) in panels.iter().zip(years.iter()) {
        let mut chart = ChartBuilder::on(panel)
            .caption(year.to_string(), ("sans-serif", 18))
            .margin(8)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(x_range.clone(), y_range.clone())?;

        chart
            .configure_mesh()
            .x_labels(5)
            .y_labels(5)
            .x_desc("PC1")
            .y_desc("PC2")
            .draw()?;

        chart.draw_series(
            athletes
                .iter()
                .filter(|a| a.year == year)
                .map(|a| Circle::new((a.pc1, a.pc2), 3, archetype_color(a.rank).filled())),
        )?;
    }

    for archetype in run.archetypes.iter() {
        let y = 40 + archetype.rank as i32 * 26;
        legend_area.draw(&Circle::new(
            (14, y),
            6,
            archetype_color(archetype.rank).filled(),
        ))?;
        legend_area.draw(&Text::new(
            archetype.name.clone(),
            (28, y - 8),
            ("sans-serif", 16),
        ))?;
    }

    root.present()?;
    info!(path = %output_path.display(), panels = years.len(), "projection scatter saved");

    Ok(())
}

/// Medal rate (ascending) and sex composition (same order), side by side
pub fn create_medal_rate_charts(summary: &AggregateReport, output_path: &Path) -> Result<()> {
    let ordered: Vec<&ArchetypeSummary> = summary.by_medal_rate().collect();
    if ordered.is_empty() {
        anyhow::bail!("No populated archetypes to chart");
    }

    // One segment per archetype, labelled at its centre
    let n = ordered.len();
    let slots = || (0..n - 1).into_segmented();
    let names: Vec<&str> = ordered.iter().map(|s| s.name.as_str()).collect();
    let name_at = |x: &SegmentValue<usize>| segment_label(&names, x);
    let slot_index = |x: &SegmentValue<usize>| segment_index(x, n);

    let root = BitMapBackend::new(output_path, (1400, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(700);

    // Medal rate
    let max_rate = ordered
        .iter()
        .filter_map(|s| s.medal_rate)
        .fold(0.0, f64::max);
    let top = (max_rate * 1.15).clamp(0.05, 1.0);

    let mut chart = ChartBuilder::on(&left)
        .caption("Medal rate by archetype", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(slots(), 0f64..top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&name_at)
        .y_label_formatter(&|v| format!("{:.0}%", v * 100.0))
        .y_desc("Entries with a medal")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .margin(20)
            .style_func(|x, _| {
                let rank = ordered.get(slot_index(x)).map_or(0, |s| s.rank);
                archetype_color(rank).filled()
            })
            .data(
                ordered
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (i, s.medal_rate.unwrap_or(0.0))),
            ),
    )?;

    // Sex composition, stacked
    let mut chart = ChartBuilder::on(&right)
        .caption("Sex composition by archetype", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(slots(), 0f64..1f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&name_at)
        .y_label_formatter(&|v| format!("{:.0}%", v * 100.0))
        .y_desc("Share of entries")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let mut base = vec![0.0; n];
    for &sex in &summary.sexes {
        let color = sex_color(sex);
        let lower = base.clone();
        let tops: Vec<f64> = ordered
            .iter()
            .zip(&lower)
            .map(|(s, below)| below + s.sex_fraction(sex).unwrap_or(0.0))
            .collect();

        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .margin(20)
                    .style(color.filled())
                    .baseline_func(move |x| lower.get(slot_index(x)).copied().unwrap_or(0.0))
                    .data(tops.iter().copied().enumerate()),
            )?
            .label(sex_label(sex))
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

        base = tops;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!(path = %output_path.display(), "medal rate charts saved");

    Ok(())
}

/// Render both charts; returns the scatter and bar-chart paths
pub fn generate_visualization_report(
    run: &AnalysisRun,
    records: &[AthleteRecord],
    scatter_path: &Path,
) -> Result<(PathBuf, PathBuf)> {
    create_projection_scatter(run, records, scatter_path)?;

    let rates_path = rates_chart_path(scatter_path);
    create_medal_rate_charts(&run.summary, &rates_path)?;

    Ok((scatter_path.to_path_buf(), rates_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Medal, RecordId};
    use crate::model::KMeansParams;
    use crate::pipeline::{run_analysis, AnalysisConfig};
    use tempfile::tempdir;

    fn create_test_data() -> (Vec<AthleteRecord>, AnalysisRun) {
        let records: Vec<AthleteRecord> = (0..18u64)
            .map(|i| {
                let tier = (i % 3) as f64;
                AthleteRecord {
                    id: RecordId(i),
                    age: 20.0 + tier * 3.0 + (i % 4) as f64 * 0.5,
                    height: 150.0 + tier * 12.0 + (i % 5) as f64,
                    weight: 50.0 + tier * 25.0 + (i % 2) as f64 * 2.0,
                    sex: if i % 2 == 0 { Sex::Female } else { Sex::Male },
                    year: 2008 + 4 * (i % 3) as i32,
                    medal: (i % 5 == 0).then_some(Medal::Bronze),
                }
            })
            .collect();
        let config = AnalysisConfig {
            kmeans: KMeansParams {
                n_clusters: 3,
                max_iters: 50,
                seed: 11,
            },
            ..AnalysisConfig::default()
        };
        let run = run_analysis(&records, &config).unwrap();
        (records, run)
    }

    #[test]
    fn test_rates_chart_path() {
        assert_eq!(
            rates_chart_path(Path::new("out/archetypes.png")),
            PathBuf::from("out/archetypes_rates.png")
        );
        assert_eq!(
            rates_chart_path(Path::new("plot")),
            PathBuf::from("plot_rates.png")
        );
    }

    #[test]
    fn test_padded_range() {
        let range = padded_range([0.0, 10.0].into_iter());
        assert!(range.start < 0.0 && range.end > 10.0);
        let flat = padded_range([1.0, 1.0].into_iter());
        assert!(flat.end - flat.start >= 1.0);
    }

    #[test]
    fn test_segment_labels_name_every_bar() {
        let names = ["Light", "Middle", "Heavy"];
        for (i, name) in names.iter().enumerate() {
            assert_eq!(segment_label(&names, &SegmentValue::CenterOf(i)), *name);
        }
        assert_eq!(segment_label(&names, &SegmentValue::Last), "");
        assert_eq!(segment_label(&names, &SegmentValue::Exact(3)), "");
    }

    #[test]
    fn test_medal_rate_charts_with_single_archetype() {
        let (records, _) = create_test_data();
        let config = AnalysisConfig {
            kmeans: KMeansParams {
                n_clusters: 1,
                max_iters: 10,
                seed: 1,
            },
            ..AnalysisConfig::default()
        };
        let run = run_analysis(&records, &config).unwrap();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("single_rates.png");

        create_medal_rate_charts(&run.summary, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_generate_visualization_report() {
        let (records, run) = create_test_data();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("test_archetypes.png");

        let (scatter, rates) = generate_visualization_report(&run, &records, &output_path).unwrap();
        assert!(scatter.exists());
        assert!(rates.exists());
    }
}
