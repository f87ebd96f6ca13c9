//! Configuration validation.

use super::{ClientKind, Config};
use crate::error::{MigrateError, Result};

/// Validate the settings every stage needs.
pub fn validate(config: &Config) -> Result<()> {
    if config.archive.extract_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("archive.extract_dir is required".into()));
    }
    if let Some(schema) = &config.archive.schema {
        if schema.is_empty() || schema.contains(['/', '\\']) {
            return Err(MigrateError::Config(format!(
                "archive.schema is not a valid directory name: '{}'",
                schema
            )));
        }
    }
    if config.project.schema_file.as_os_str().is_empty() {
        return Err(MigrateError::Config("project.schema_file is required".into()));
    }
    if config.output.sql_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("output.sql_dir is required".into()));
    }
    if config.output.log_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("output.log_dir is required".into()));
    }
    if config.output.progress_interval == 0 {
        return Err(MigrateError::Config(
            "output.progress_interval must be at least 1".into(),
        ));
    }
    if let Some(0) = config.client.timeout_secs {
        return Err(MigrateError::Config(
            "client.timeout_secs must be at least 1 (omit it for no timeout)".into(),
        ));
    }
    if config.encoding.null_marker.as_deref() == Some("") {
        return Err(MigrateError::Config(
            "encoding.null_marker cannot be empty; empty fields of nullable columns are already NULL"
                .into(),
        ));
    }

    Ok(())
}

/// Validate the connection settings, only needed by stages that touch the database.
pub fn validate_client(config: &Config) -> Result<()> {
    let client = &config.client;
    if client.host.is_empty() {
        return Err(MigrateError::Config("client.host is required".into()));
    }
    if client.user.is_empty() {
        return Err(MigrateError::Config("client.user is required".into()));
    }
    if client.kind == ClientKind::Postgres && client.database.is_empty() {
        return Err(MigrateError::Config(
            "client.database is required for the postgres client".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.client = ClientConfig {
            host: "abc.hana.prod.cloud".to_string(),
            user: "SHOP_1A2B_RT".to_string(),
            password: "password".to_string(),
            ..ClientConfig::default()
        };
        config
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
        assert!(validate_client(&config).is_ok());
    }

    #[test]
    fn test_defaults_pass_offline_validation() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.client.host = "".to_string();
        assert!(validate_client(&config).is_err());
    }

    #[test]
    fn test_postgres_requires_database() {
        let mut config = valid_config();
        config.client.kind = ClientKind::Postgres;
        assert!(validate_client(&config).is_err());
        config.client.database = "shop".to_string();
        assert!(validate_client(&config).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid_config();
        config.client.timeout_secs = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_schema_with_separator_rejected() {
        let mut config = valid_config();
        config.archive.schema = Some("../etc".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_null_marker_rejected() {
        let mut config = valid_config();
        config.encoding.null_marker = Some(String::new());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_client_config_debug_redacts_password() {
        let mut config = valid_config();
        config.client.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.client);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
