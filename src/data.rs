//! Athlete records and dataset loading using Polars

use std::fmt;
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;

pub const SPORT_COLUMN: &str = "sport";
pub const AGE_COLUMN: &str = "age";
pub const HEIGHT_COLUMN: &str = "height";
pub const WEIGHT_COLUMN: &str = "weight";
pub const SEX_COLUMN: &str = "sex";
pub const YEAR_COLUMN: &str = "year";
pub const MEDAL_COLUMN: &str = "medal";

const ROW_INDEX_COLUMN: &str = "__source_row";

/// Zero-based data row number in the source file; the join key for every stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Sex {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

impl Sex {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim() {
            "F" | "f" => Some(Sex::Female),
            "M" | "m" => Some(Sex::Male),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Sex::Female => "F",
            Sex::Male => "M",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl Medal {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gold" => Some(Medal::Gold),
            "silver" => Some(Medal::Silver),
            "bronze" => Some(Medal::Bronze),
            _ => None,
        }
    }
}

/// Numeric athlete attributes that can feed the standardizer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Age,
    Height,
    Weight,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Age, Feature::Height, Feature::Weight];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Age => "age",
            Feature::Height => "height",
            Feature::Weight => "weight",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Feature::Age => "years",
            Feature::Height => "cm",
            Feature::Weight => "kg",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One athlete-event entry that passed cleaning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AthleteRecord {
    pub id: RecordId,
    pub age: f64,
    pub height: f64,
    pub weight: f64,
    pub sex: Sex,
    pub year: i32,
    pub medal: Option<Medal>,
}

impl AthleteRecord {
    /// True iff the entry won any medal
    pub fn medalist(&self) -> bool {
        self.medal.is_some()
    }

    pub fn feature(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Age => self.age,
            Feature::Height => self.height,
            Feature::Weight => self.weight,
        }
    }
}

/// Per-reason count of rows rejected during cleaning.
///
/// A row is counted once, under the first check it fails, so `total()`
/// equals the number of dropped rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropReport {
    pub missing_height: usize,
    pub missing_weight: usize,
    pub missing_age: usize,
    pub missing_sex: usize,
    pub missing_year: usize,
    pub invalid_value: usize,
    pub unknown_sex: usize,
    pub unknown_medal: usize,
}

impl DropReport {
    pub fn total(&self) -> usize {
        self.missing_height
            + self.missing_weight
            + self.missing_age
            + self.missing_sex
            + self.missing_year
            + self.invalid_value
            + self.unknown_sex
            + self.unknown_medal
    }

    fn count(&mut self, reason: DropReason) {
        let slot = match reason {
            DropReason::MissingHeight => &mut self.missing_height,
            DropReason::MissingWeight => &mut self.missing_weight,
            DropReason::MissingAge => &mut self.missing_age,
            DropReason::MissingSex => &mut self.missing_sex,
            DropReason::MissingYear => &mut self.missing_year,
            DropReason::InvalidValue => &mut self.invalid_value,
            DropReason::UnknownSex => &mut self.unknown_sex,
            DropReason::UnknownMedal => &mut self.unknown_medal,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    MissingHeight,
    MissingWeight,
    MissingAge,
    MissingSex,
    MissingYear,
    InvalidValue,
    UnknownSex,
    UnknownMedal,
}

/// An uncleaned row as it comes out of the table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub row: u64,
    pub age: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub sex: Option<String>,
    pub year: Option<i64>,
    pub medal: Option<String>,
}

impl RawRow {
    fn into_record(self) -> Result<AthleteRecord, DropReason> {
        let height = self.height.ok_or(DropReason::MissingHeight)?;
        let weight = self.weight.ok_or(DropReason::MissingWeight)?;
        let age = self.age.ok_or(DropReason::MissingAge)?;
        let sex = self.sex.ok_or(DropReason::MissingSex)?;
        let year = self.year.ok_or(DropReason::MissingYear)?;

        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !(valid(age) && valid(height) && valid(weight)) {
            return Err(DropReason::InvalidValue);
        }
        let year = i32::try_from(year).map_err(|_| DropReason::InvalidValue)?;
        let sex = Sex::parse(&sex).ok_or(DropReason::UnknownSex)?;

        let medal = match self.medal.as_deref().map(str::trim) {
            None | Some("") | Some("NA") => None,
            Some(value) => Some(Medal::parse(value).ok_or(DropReason::UnknownMedal)?),
        };

        Ok(AthleteRecord {
            id: RecordId(self.row),
            age,
            height,
            weight,
            sex,
            year,
            medal,
        })
    }
}

/// Convert raw rows into typed records, counting every rejected row.
///
/// Rows missing any of age, height or weight are dropped rather than imputed.
pub fn clean_rows<I>(rows: I) -> (Vec<AthleteRecord>, DropReport)
where
    I: IntoIterator<Item = RawRow>,
{
    let mut records = Vec::new();
    let mut drops = DropReport::default();

    for row in rows {
        let source_row = row.row;
        match row.into_record() {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!(row = source_row, ?reason, "dropping row");
                drops.count(reason);
            }
        }
    }

    (records, drops)
}

/// Cleaned athlete entries for one sport
#[derive(Debug, Clone)]
pub struct AthleteTable {
    pub sport: String,
    /// Rows matching the sport before cleaning
    pub rows_for_sport: usize,
    pub records: Vec<AthleteRecord>,
    pub drops: DropReport,
}

/// Load the athlete CSV and keep the cleaned entries of one sport
///
/// # Arguments
/// * `path` - Path to the delimited file (header row, `NA` for missing values)
/// * `sport` - Exact value of the `sport` column to keep
///
/// # Returns
/// * `AthleteTable` with the typed records and the drop report
pub fn load_athletes(path: &Path, sport: &str) -> crate::Result<AthleteTable> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| {
            opts.with_null_values(Some(NullValues::AllColumnsSingle("NA".into())))
        })
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let sport_col = resolve_column(&df, SPORT_COLUMN)?;
    let age_col = resolve_column(&df, AGE_COLUMN)?;
    let height_col = resolve_column(&df, HEIGHT_COLUMN)?;
    let weight_col = resolve_column(&df, WEIGHT_COLUMN)?;
    let sex_col = resolve_column(&df, SEX_COLUMN)?;
    let year_col = resolve_column(&df, YEAR_COLUMN)?;
    let medal_col = resolve_column(&df, MEDAL_COLUMN)?;

    // Row numbers are attached before filtering so ids point back into the file
    let sport_df = df
        .with_row_index(ROW_INDEX_COLUMN.into(), None)?
        .lazy()
        .filter(col(sport_col.as_str()).eq(lit(sport)))
        .collect()?;

    let rows_for_sport = sport_df.height();
    if rows_for_sport == 0 {
        warn!(sport, "no rows found for sport");
    }

    let row_ids: Vec<u64> = sport_df
        .column(ROW_INDEX_COLUMN)?
        .cast(&DataType::UInt64)?
        .u64()?
        .into_no_null_iter()
        .collect();
    let ages = f64_values(&sport_df, &age_col)?;
    let heights = f64_values(&sport_df, &height_col)?;
    let weights = f64_values(&sport_df, &weight_col)?;
    let sexes = string_values(&sport_df, &sex_col)?;
    let years = i64_values(&sport_df, &year_col)?;
    let medals = string_values(&sport_df, &medal_col)?;

    let rows = (0..rows_for_sport).map(|i| RawRow {
        row: row_ids[i],
        age: ages[i],
        height: heights[i],
        weight: weights[i],
        sex: sexes[i].clone(),
        year: years[i],
        medal: medals[i].clone(),
    });
    let (records, drops) = clean_rows(rows);

    if drops.total() > 0 {
        warn!(
            dropped = drops.total(),
            missing_height = drops.missing_height,
            missing_weight = drops.missing_weight,
            missing_age = drops.missing_age,
            "dropped incomplete rows"
        );
    }
    info!(
        sport,
        rows = rows_for_sport,
        kept = records.len(),
        "loaded athlete entries"
    );

    Ok(AthleteTable {
        sport: sport.to_string(),
        rows_for_sport,
        records,
        drops,
    })
}

/// Find a column by case-insensitive name
fn resolve_column(df: &DataFrame, name: &str) -> crate::Result<String> {
    df.get_columns()
        .iter()
        .map(|column| column.name().to_string())
        .find(|candidate| candidate.eq_ignore_ascii_case(name))
        .ok_or_else(|| AnalysisError::MissingColumn(name.to_string()))
}

fn f64_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<f64>>> {
    let values = df.column(name)?.cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().collect())
}

fn i64_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<i64>>> {
    let values = df.column(name)?.cast(&DataType::Int64)?;
    Ok(values.i64()?.into_iter().collect())
}

fn string_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<String>>> {
    let values = df.column(name)?.cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_owned))
        .collect())
}
