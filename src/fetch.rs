//! Dataset retrieval with a local file cache

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::AnalysisError;

/// Public Olympic athlete-event results (TidyTuesday, 2021-07-27)
pub const DEFAULT_DATASET_URL: &str =
    "https://raw.githubusercontent.com/rfordatascience/tidytuesday/master/data/2021/2021-07-27/olympics.csv";

/// Where the dataset used by a run came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSource {
    Cached,
    Downloaded { bytes: usize },
}

/// Make sure the dataset exists at `path`, downloading it when absent
///
/// # Arguments
/// * `path` - Local cache file
/// * `url` - Remote location, fetched only when the cache is missing or `refresh` is set
/// * `refresh` - Re-download even if the cache exists
pub fn ensure_dataset(path: &Path, url: &str, refresh: bool) -> crate::Result<DatasetSource> {
    if path.is_file() && !refresh {
        info!(path = %path.display(), "using cached dataset");
        return Ok(DatasetSource::Cached);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }

    info!(url, "downloading dataset");
    let body = download(url)?;

    // Write beside the target first so a failed write never leaves a partial cache
    let partial = path.with_extension("part");
    fs::write(&partial, &body).map_err(|e| AnalysisError::io(&partial, e))?;
    fs::rename(&partial, path).map_err(|e| AnalysisError::io(path, e))?;

    info!(path = %path.display(), bytes = body.len(), "dataset cached");
    Ok(DatasetSource::Downloaded { bytes: body.len() })
}

fn download(url: &str) -> crate::Result<Vec<u8>> {
    let failure = |reason: String| AnalysisError::DataRetrieval {
        url: url.to_string(),
        reason,
    };

    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| failure(e.to_string()))?;
    let body = response.bytes().map_err(|e| failure(e.to_string()))?;

    if body.is_empty() {
        return Err(failure("empty response body".to_string()));
    }
    Ok(body.to_vec())
}
