//! Persistence: save and load trajectory data and configuration files.
//!
//! Datasets travel as [`RawTrajectoryData`] JSON (the frame-major table the
//! file-format layer produces). Configuration files are YAML or JSON, chosen
//! by file extension.

use std::path::Path;

use crate::config::StudioConfig;
use crate::data::dataset::{Dataset, RawTrajectoryData};
use crate::error::{Result, StudioError};

// ---------- Datasets ----------

/// Serialize the current state of a dataset as pretty JSON.
pub fn dataset_to_json(dataset: &Dataset) -> Result<String> {
    Ok(serde_json::to_string_pretty(&dataset.export())?)
}

/// Parse raw trajectory JSON and build a dataset from it.
pub fn dataset_from_json(json: &str) -> Result<Dataset> {
    let raw: RawTrajectoryData = serde_json::from_str(json)?;
    Dataset::load(&raw)
}

/// Save the current state of a dataset to a JSON file at the given path.
pub fn save_dataset_to_path(dataset: &Dataset, path: &Path) -> Result<()> {
    let txt = dataset_to_json(dataset)?;
    std::fs::write(path, txt)?;
    tracing::info!(path = %path.display(), "dataset saved");
    Ok(())
}

/// Load a dataset from a raw trajectory JSON file.
pub fn load_dataset_from_path(path: &Path) -> Result<Dataset> {
    let txt = std::fs::read_to_string(path)?;
    dataset_from_json(&txt)
}

// ---------- Configuration ----------

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Save a configuration as JSON (`.json`) or YAML (anything else).
pub fn save_config_to_path(config: &StudioConfig, path: &Path) -> Result<()> {
    let txt = if is_json(path) { serde_json::to_string_pretty(config)? } else { config.to_yaml_string()? };
    std::fs::write(path, txt)?;
    Ok(())
}

/// Load and validate a configuration from a `.json` or YAML file.
pub fn load_config_from_path(path: &Path) -> Result<StudioConfig> {
    let txt = std::fs::read_to_string(path)?;
    let cfg = if is_json(path) { StudioConfig::from_json_str(&txt) } else { StudioConfig::from_yaml_str(&txt) };
    cfg.map_err(|e| match e {
        StudioError::Config(msg) => StudioError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}
