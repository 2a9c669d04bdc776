//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::EngardeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Relative roots are resolved against the directory holding the file.
pub fn load_config(path: &Path) -> Result<EngardeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&content, base)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str, base: &Path) -> Result<EngardeConfig, ConfigError> {
    let mut config: EngardeConfig = toml::from_str(content)?;
    if config.applications.is_empty() {
        config.applications = config
            .domain
            .hosted_apps
            .iter()
            .map(|name| crate::config::ApplicationConfig {
                name: name.clone(),
                ..Default::default()
            })
            .collect();
    }
    config.resolve_paths(base);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_file_relative_to_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engarde.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[domain]\nhosted_apps = [\"site\"]").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.applications.len(), 1);
        assert_eq!(config.applications[0].root_path, dir.path().join("./site"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/engarde.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = parse_config("[domain\n", Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_errors_are_reported_together() {
        let err = parse_config(
            r#"
            [domain]
            hosted_apps = ["site"]
            default_app = "blog"
            [listener]
            max_connections = 0
            "#,
            Path::new("."),
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other}"),
        }
    }
}
