//! Persisted tool configuration.
//!
//! Flat JSON under the platform config dir. Unknown keys are dropped on
//! load and missing keys fall back to defaults, so the file survives both
//! upgrades and downgrades. Named presets are full config snapshots stored
//! beside the main file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::FilerError;
use crate::fuzzy::DEFAULT_THRESHOLD;

const APP_DIR: &str = "pdf-filer";
const CONFIG_FILE: &str = "config.json";
const PRESETS_DIR: &str = "presets";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder scanned for incoming PDFs.
    pub source_folder: String,
    /// Folder relocated PDFs end up under.
    pub processed_folder: String,
    pub spreadsheet_path: String,
    pub sheet_name: String,
    /// Spreadsheet columns the operator filters on, in selection order.
    pub filter_columns: Vec<String>,
    /// Column that receives the hyperlink to the relocated PDF.
    pub link_column: String,
    pub output_template: String,
    /// Fuzzy match score cutoff, 0-100.
    pub search_threshold: u8,
    /// Whether later filter value lists are narrowed by earlier choices.
    pub chain_filter_values: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_folder: String::new(),
            processed_folder: String::new(),
            spreadsheet_path: String::new(),
            sheet_name: "Sheet1".to_string(),
            filter_columns: vec!["Client".to_string(), "Month".to_string()],
            link_column: "Link".to_string(),
            output_template:
                "{processed_folder}/{filter1|str.upper} - {filter2|str.upper}.pdf".to_string(),
            search_threshold: DEFAULT_THRESHOLD,
            chain_filter_values: true,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, FilerError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FilerError::Config(format!("Could not read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| FilerError::Config(format!("Invalid config file: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), FilerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FilerError::Config(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FilerError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| FilerError::Config(format!("Could not write {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn load_default() -> Result<Self, FilerError> {
        Config::load(&config_file_path()?)
    }

    pub fn save_default(&self) -> Result<(), FilerError> {
        self.save(&config_file_path()?)
    }
}

fn app_config_dir() -> Result<PathBuf, FilerError> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or_else(|| FilerError::Config("no user configuration directory".to_string()))
}

pub fn config_file_path() -> Result<PathBuf, FilerError> {
    Ok(app_config_dir()?.join(CONFIG_FILE))
}

fn preset_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(PRESETS_DIR).join(format!("{}.json", name))
}

/// Save a named snapshot of the config under `dir`.
pub fn save_preset(dir: &Path, name: &str, config: &Config) -> Result<(), FilerError> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(FilerError::Config(format!("invalid preset name: {}", name)));
    }
    config.save(&preset_path(dir, name))?;
    info!(name, "preset saved");
    Ok(())
}

pub fn load_preset(dir: &Path, name: &str) -> Result<Config, FilerError> {
    let path = preset_path(dir, name);
    if !path.exists() {
        return Err(FilerError::Config(format!("no such preset: {}", name)));
    }
    Config::load(&path)
}

pub fn delete_preset(dir: &Path, name: &str) -> Result<(), FilerError> {
    let path = preset_path(dir, name);
    if !path.exists() {
        return Err(FilerError::Config(format!("no such preset: {}", name)));
    }
    std::fs::remove_file(&path).map_err(|e| FilerError::Config(e.to_string()))
}

/// Names of saved presets under `dir`, sorted.
pub fn list_presets(dir: &Path) -> Result<Vec<String>, FilerError> {
    let presets = dir.join(PRESETS_DIR);
    if !presets.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(&presets).map_err(|e| FilerError::Config(e.to_string()))?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            if path.extension().map(|x| x == "json").unwrap_or(false) {
                path.file_stem().map(|s| s.to_string_lossy().into_owned())
            } else {
                None
            }
        })
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.search_threshold, 65);
        assert!(config.output_template.contains("{filter1|str.upper}"));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.sheet_name = "Facturen".to_string();
        config.search_threshold = 80;
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn unknown_and_missing_keys_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"sheet_name": "Data", "some_legacy_key": true}"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.sheet_name, "Data");
        // Everything else filled from defaults.
        assert_eq!(config.link_column, "Link");
    }

    #[test]
    fn preset_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sheet_name = "Invoices".to_string();
        save_preset(dir.path(), "invoices", &config).unwrap();
        save_preset(dir.path(), "blank", &Config::default()).unwrap();

        assert_eq!(list_presets(dir.path()).unwrap(), vec!["blank", "invoices"]);
        assert_eq!(load_preset(dir.path(), "invoices").unwrap(), config);

        delete_preset(dir.path(), "blank").unwrap();
        assert_eq!(list_presets(dir.path()).unwrap(), vec!["invoices"]);
        assert!(load_preset(dir.path(), "blank").is_err());
        assert!(save_preset(dir.path(), "../evil", &config).is_err());
    }
}
