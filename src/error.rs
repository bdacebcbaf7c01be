use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmdfigError {
    #[error("Invalid value for '{variable}' from {origin}: {reason}")]
    InvalidValue {
        variable: String,
        origin: String,
        reason: String,
    },

    #[error("Duplicate variable '{variable}' declared on command '{command}'")]
    DuplicateVariable { command: String, variable: String },

    #[error("Failed to parse flags for '{command}': {source}")]
    FlagParse {
        command: String,
        source: clap::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path} as TOML: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to parse {path} as JSON: {source}")]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Config variable '{0}' only supplies a file path and cannot be applied")]
    ConfigNotApplicable(String),

    #[error("Failed to serialize settings report: {0}")]
    Report(#[from] serde_json::Error),
}

impl CmdfigError {
    pub(crate) fn invalid(
        variable: impl Into<String>,
        origin: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CmdfigError::InvalidValue {
            variable: variable.into(),
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_formats_correctly() {
        let err = CmdfigError::invalid("port", "environment (PORT)", "not a number");
        let msg = err.to_string();
        assert!(msg.contains("port"));
        assert!(msg.contains("PORT"));
        assert!(msg.contains("not a number"));
    }

    #[test]
    fn duplicate_variable_names_command() {
        let err = CmdfigError::DuplicateVariable {
            command: "main.server".into(),
            variable: "port".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("main.server"));
        assert!(msg.contains("'port'"));
    }

    #[test]
    fn config_not_applicable_formats() {
        let err = CmdfigError::ConfigNotApplicable("config".into());
        assert!(err.to_string().contains("'config'"));
    }
}
