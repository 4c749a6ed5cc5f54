use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::colormap::Colormap;
use super::constants::{ASSETS_SUFFIX, DEFAULT_COLORMAP, DEFAULT_COLORRANGE, REPORT_SUFFIX};
use super::error::ConfigError;

/// Structure representing the application configuration. Contains pathing and rendering options.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub data_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub colormap: String,
    /// Percentile bounds of the colour scale, in [0, 100]
    pub colorrange: (f64, f64),
    pub labjournal_path: Option<PathBuf>,
    pub report_name: Option<String>,
}

impl Default for Config {
    /// Generate a new Config object. The data path is empty/invalid
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("None"),
            output_path: None,
            colormap: String::from(DEFAULT_COLORMAP),
            colorrange: DEFAULT_COLORRANGE,
            labjournal_path: None,
            report_name: None,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration as YAML
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    pub fn is_colorrange_valid(&self) -> bool {
        let (start, end) = self.colorrange;
        (0.0..=100.0).contains(&start) && (0.0..=100.0).contains(&end) && start < end
    }

    pub fn is_colormap_valid(&self) -> bool {
        self.colormap.parse::<Colormap>().is_ok()
    }

    pub fn colormap(&self) -> Result<Colormap, ConfigError> {
        self.colormap.parse::<Colormap>()
    }

    /// Check everything the pipeline relies on before a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.data_path.is_dir() {
            return Err(ConfigError::BadFilePath(self.data_path.clone()));
        }
        self.colormap()?;
        if !self.is_colorrange_valid() {
            return Err(ConfigError::BadColorrange(self.colorrange.0, self.colorrange.1));
        }
        if let Some(labjournal) = &self.labjournal_path {
            if !labjournal.exists() {
                return Err(ConfigError::BadFilePath(labjournal.clone()));
            }
        }
        Ok(())
    }

    /// Name of the data directory, used as default report title
    fn data_dir_name(&self) -> String {
        self.data_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("proespm"))
    }

    pub fn report_title(&self) -> String {
        self.report_name
            .clone()
            .unwrap_or_else(|| self.data_dir_name())
    }

    /// Path of the HTML report, by default next to the data directory
    pub fn report_path(&self) -> PathBuf {
        match &self.output_path {
            Some(path) => path.clone(),
            None => {
                let parent = self.data_path.parent().unwrap_or(Path::new("."));
                parent.join(format!("{}{}", self.data_dir_name(), REPORT_SUFFIX))
            }
        }
    }

    fn report_stem(&self) -> String {
        let report = self.report_path();
        let name = report
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        match name.strip_suffix(REPORT_SUFFIX) {
            Some(stem) => stem.to_string(),
            None => report
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }

    /// Directory receiving the rendered assets of the report
    pub fn assets_directory(&self) -> PathBuf {
        let report = self.report_path();
        let parent = report.parent().unwrap_or(Path::new("."));
        parent.join(format!("{}{}", self.report_stem(), ASSETS_SUFFIX))
    }

    pub fn log_path(&self) -> PathBuf {
        let report = self.report_path();
        let parent = report.parent().unwrap_or(Path::new("."));
        parent.join(format!("{}.log", self.report_stem()))
    }
}
