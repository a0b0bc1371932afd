//! YAML run configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::error;

use crate::TableKind;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";
pub const CONFIG_ENV_VAR: &str = "CRMETL_CONFIG";
pub const DEFAULT_LOG_FILE: &str = "default.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineConfig {
    pub file_paths: FilePaths,
    pub database_path: DatabasePath,
    #[serde(default)]
    pub log_paths: LogPaths,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilePaths {
    pub companies_data: PathBuf,
    pub contacts_data: PathBuf,
    pub opportunities_data: PathBuf,
    pub activities_data: PathBuf,
}

impl FilePaths {
    pub fn path_for(&self, kind: TableKind) -> &Path {
        match kind {
            TableKind::Companies => &self.companies_data,
            TableKind::Contacts => &self.contacts_data,
            TableKind::Opportunities => &self.opportunities_data,
            TableKind::Activities => &self.activities_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabasePath {
    pub database_name: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogPaths {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for LogPaths {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

impl PipelineConfig {
    /// Load the YAML document at `path`. Failures are logged before they are returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let result = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|text| {
                Self::from_yaml_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            });
        if let Err(err) = &result {
            error!(error = %err, "config load failed");
        }
        result
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
file_paths:
  companies_data: data/companies.csv
  contacts_data: data/contacts.json
  opportunities_data: data/opportunities.csv
  activities_data: data/activities.csv
database_path:
  database_name: salesforce_data.db
log_paths:
  log_file: logs/etl.log
"#;

    #[test]
    fn parses_all_sections() {
        let config = PipelineConfig::from_yaml_str(SAMPLE).expect("parse");
        assert_eq!(
            config.file_paths.path_for(TableKind::Contacts),
            Path::new("data/contacts.json")
        );
        assert_eq!(config.database_path.database_name, PathBuf::from("salesforce_data.db"));
        assert_eq!(config.log_paths.log_file, PathBuf::from("logs/etl.log"));
    }

    #[test]
    fn log_file_falls_back_to_default() {
        let text = SAMPLE.split("log_paths:").next().unwrap();
        let config = PipelineConfig::from_yaml_str(text).expect("parse");
        assert_eq!(config.log_paths.log_file, PathBuf::from(DEFAULT_LOG_FILE));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempdir().expect("tempdir");
        let err = PipelineConfig::load(dir.path().join("config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "database_path:\n  database_name: x.db\n").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
