//! Configuration loading and validation.
//!
//! Settings are layered: built-in defaults, then the YAML file, then
//! environment variables, then explicit [`Overrides`].

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the settings every stage needs.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Validate the connection settings.
    pub fn validate_client(&self) -> Result<()> {
        validation::validate_client(self)
    }

    /// Apply environment variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment variables through a lookup function.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PROJECT_BASE_DIR") {
            self.base_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("EXPORT_TAR_FILE") {
            self.archive.path = PathBuf::from(v);
        }
        if let Some(v) = get("EXTRACT_DIR") {
            self.archive.extract_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SCHEMA") {
            self.archive.schema = Some(v);
        }
        if let Some(v) = get("CAP_PROJECT_DIR") {
            self.project.root = PathBuf::from(v);
        }
        if let Some(v) = get("SQL_DIR") {
            self.output.sql_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_DIR") {
            self.output.log_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CREATED_DIR") {
            self.output.executed_dir = PathBuf::from(v);
        }
        if let Some(v) = get("HANA_CLIENT_DIR") {
            self.client.client_dir = PathBuf::from(v);
        }
        if let Some(v) = get("HANA_CLIENT_PATH") {
            self.client.path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DB_CLIENT") {
            self.client.kind = v.parse().map_err(MigrateError::Config)?;
        }
        if let Some(v) = get("HANA_HOST") {
            self.client.host = v;
        }
        if let Some(v) = get("HANA_PORT") {
            self.client.port = v
                .trim()
                .parse()
                .map_err(|_| MigrateError::Config(format!("HANA_PORT is not a port: '{}'", v)))?;
        }
        if let Some(v) = get("HANA_USER") {
            self.client.user = v;
        }
        if let Some(v) = get("HANA_PASSWORD") {
            self.client.password = v;
        }
        if let Some(v) = get("HANA_DATABASE") {
            self.client.database = v;
        }
        if let Some(v) = get("HANA_TARGET_SCHEMA") {
            self.client.target_schema = Some(v);
        }
        if let Some(v) = get("SQL_TIMEOUT") {
            let secs: u64 = v.trim().parse().map_err(|_| {
                MigrateError::Config(format!("SQL_TIMEOUT is not a number of seconds: '{}'", v))
            })?;
            self.client.timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Apply explicit overrides. These take precedence over everything else.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(v) = &overrides.archive_path {
            self.archive.path = v.clone();
        }
        if let Some(v) = &overrides.extract_dir {
            self.archive.extract_dir = v.clone();
        }
        if let Some(v) = &overrides.schema {
            self.archive.schema = Some(v.clone());
        }
        if let Some(v) = &overrides.project_root {
            self.project.root = v.clone();
        }
        if let Some(v) = &overrides.sql_dir {
            self.output.sql_dir = v.clone();
        }
        if let Some(v) = &overrides.log_dir {
            self.output.log_dir = v.clone();
        }
        if let Some(v) = overrides.client_kind {
            self.client.kind = v;
        }
        if let Some(v) = overrides.timeout_secs {
            self.client.timeout_secs = Some(v);
        }
    }

    /// Resolve a configured path against `base_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Full path of the CDS schema file.
    pub fn schema_file_path(&self) -> PathBuf {
        self.resolve(&self.project.root).join(&self.project.schema_file)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.resolve(&self.archive.extract_dir)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.resolve(&self.archive.path)
    }

    pub fn sql_dir(&self) -> PathBuf {
        self.resolve(&self.output.sql_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.output.log_dir)
    }

    pub fn executed_dir(&self) -> PathBuf {
        self.resolve(&self.output.executed_dir)
    }
}
