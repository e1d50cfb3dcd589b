//! Scenario loading: format detection, file discovery, and deserialization.
//!
//! Scenario files may be RON, TOML, or JSON; the format is chosen by file
//! extension. Loaded scenarios are validated into a
//! [`SimConfig`](devflow_core::config::SimConfig) before being handed out.

use devflow_core::config::{ConfigError, SimConfig};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::schema::ScenarioData;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during scenario loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// No scenario with the given name exists in the directory.
    #[error("scenario '{name}' not found in {dir}")]
    MissingScenario { name: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The scenario parsed but describes an invalid configuration.
    #[error("invalid scenario: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    /// File extensions in lookup order.
    pub const EXTENSIONS: [&'static str; 3] = ["ron", "toml", "json"];
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a scenario with the given base name (without
/// extension).
///
/// Looks for `{name}.ron`, `{name}.toml`, and `{name}.json`. Returns
/// `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if multiple
/// formats exist for the same name.
pub fn find_scenario(dir: &Path, name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in Format::EXTENSIONS {
        let candidate = dir.join(format!("{name}.{ext}"));
        if candidate.exists() {
            if let Some(ref existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Resolve a user-supplied scenario reference to a file.
///
/// A path with an extension is used as-is. A path without one is looked up
/// with [`find_scenario`] in its parent directory.
pub fn resolve_scenario_path(reference: &Path) -> Result<PathBuf, DataLoadError> {
    if reference.extension().is_some() {
        return Ok(reference.to_path_buf());
    }

    let dir = match reference.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = reference
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    find_scenario(dir, name)?.ok_or_else(|| DataLoadError::MissingScenario {
        name: name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(format, &content).map_err(|detail| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    })
}

/// Deserialize `content` in the given format, returning the parser's message
/// on failure.
pub fn deserialize_str<T: DeserializeOwned>(format: Format, content: &str) -> Result<T, String> {
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    }
}

// ===========================================================================
// Scenario loading
// ===========================================================================

/// Load a scenario file without validating it.
pub fn load_scenario(path: &Path) -> Result<ScenarioData, DataLoadError> {
    let scenario: ScenarioData = deserialize_file(path)?;
    tracing::debug!(
        file = %path.display(),
        name = %scenario.name,
        "loaded scenario"
    );
    Ok(scenario)
}

/// Load a scenario file and validate it into a configuration.
pub fn load_config(path: &Path) -> Result<SimConfig, DataLoadError> {
    Ok(load_scenario(path)?.to_config()?)
}

// ===========================================================================
// Tests
// ===========================================================================
