//! Config file variables and the documents they load.
//!
//! A [`ConfigVariable`] is a string variable whose value is a file path. Once
//! its path is resolved the file is parsed as TOML or JSON (a static property
//! of the variable) and kept as a [`ConfigDocument`]. The resolver then asks
//! the document for `command.subcommand.variable` keys through the
//! [`ConfigSource`] trait.
//!
//! Parsing is all-or-nothing: an unreadable or malformed file is an error,
//! never a partially loaded document.

use std::path::{Path, PathBuf};

use clap::{Arg, ArgMatches};

use crate::error::CmdfigError;
use crate::types::ConfigFormat;
use crate::value::Value;
use crate::variable::{DestinationId, StringVariable, Variable};

/// Lookup of raw values by dotted path.
pub trait ConfigSource {
    /// `Ok(None)` when nothing is stored at `dotted_path`. A value that exists
    /// but has no scalar representation is an error.
    fn value_at_path(&self, dotted_path: &str) -> Result<Option<Value>, String>;
}

/// A parsed config file.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDocument {
    Toml(toml::Table),
    Json(serde_json::Value),
}

impl ConfigDocument {
    /// Parse `content` as `format`. `path` only labels errors.
    pub fn parse(format: ConfigFormat, path: &Path, content: &str) -> Result<Self, CmdfigError> {
        match format {
            ConfigFormat::Toml => toml::from_str::<toml::Table>(content)
                .map(ConfigDocument::Toml)
                .map_err(|e| CmdfigError::TomlParse {
                    path: path.to_path_buf(),
                    source: e,
                }),
            ConfigFormat::Json => serde_json::from_str::<serde_json::Value>(content)
                .map(ConfigDocument::Json)
                .map_err(|e| CmdfigError::JsonParse {
                    path: path.to_path_buf(),
                    source: e,
                }),
        }
    }
}

impl ConfigSource for ConfigDocument {
    fn value_at_path(&self, dotted_path: &str) -> Result<Option<Value>, String> {
        match self {
            ConfigDocument::Toml(table) => match table_get(table, dotted_path) {
                Some(value) => Value::from_toml(value).map(Some),
                None => Ok(None),
            },
            ConfigDocument::Json(root) => match json_get(root, dotted_path) {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(value) => Value::from_json(value).map(Some),
            },
        }
    }
}

/// Navigate a `toml::Table` by dotted key path (e.g. `"main.server.port"`).
fn table_get<'a>(table: &'a toml::Table, dotted_key: &str) -> Option<&'a toml::Value> {
    let (path, leaf) = match dotted_key.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, dotted_key),
    };

    let tbl = match path {
        Some(path) => {
            let mut current = table;
            for segment in path.split('.') {
                current = current.get(segment)?.as_table()?;
            }
            current
        }
        None => table,
    };

    tbl.get(leaf)
}

fn json_get<'a>(root: &'a serde_json::Value, dotted_key: &str) -> Option<&'a serde_json::Value> {
    dotted_key
        .split('.')
        .try_fold(root, |current, segment| current.as_object()?.get(segment))
}

/// A variable naming a config file to read other variables from.
///
/// Its own value (the path) resolves from defaults, the environment and
/// flags like any string variable, but it is never applied as a setting.
#[derive(Debug, Clone)]
pub struct ConfigVariable {
    path: StringVariable,
    format: ConfigFormat,
    document: Option<ConfigDocument>,
    loaded_from: Option<PathBuf>,
}

impl ConfigVariable {
    pub fn new(name: &str, format: ConfigFormat) -> Self {
        Self {
            path: StringVariable::new(name),
            format,
            document: None,
            loaded_from: None,
        }
    }

    pub fn toml(name: &str) -> Self {
        Self::new(name, ConfigFormat::Toml)
    }

    pub fn json(name: &str) -> Self {
        Self::new(name, ConfigFormat::Json)
    }

    pub fn description(mut self, description: &str) -> Self {
        self.path = self.path.description(description);
        self
    }

    /// A path to load when no other source names one.
    pub fn default(mut self, path: &str) -> Self {
        self.path = self.path.default(path);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.path = self.path.required(required);
        self
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    /// Path of the file currently loaded, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    /// Read and parse the file at `path`, replacing any cached document.
    pub fn parse_config(&mut self, path: &Path) -> Result<(), CmdfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| CmdfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.load_str(path, &content)
    }

    /// Parse preloaded file content. `path` is recorded as the origin.
    pub fn load_str(&mut self, path: impl Into<PathBuf>, content: &str) -> Result<(), CmdfigError> {
        let path = path.into();
        let document = ConfigDocument::parse(self.format, &path, content)?;
        log::debug!(
            "Loaded {:?} config '{}' from {}",
            self.format,
            self.path.name(),
            path.display()
        );
        self.document = Some(document);
        self.loaded_from = Some(path);
        Ok(())
    }

    /// Drop the cached document, if any.
    pub(crate) fn unload(&mut self) {
        if let Some(path) = self.loaded_from.take() {
            log::debug!("Unloaded config '{}' ({})", self.path.name(), path.display());
        }
        self.document = None;
    }

    /// Look up `dotted_path` in the loaded document. `Ok(None)` when nothing
    /// is loaded or the key is absent.
    pub fn value_at_path(&self, dotted_path: &str) -> Result<Option<Value>, CmdfigError> {
        let Some(document) = &self.document else {
            return Ok(None);
        };
        document.value_at_path(dotted_path).map_err(|reason| {
            let origin = match &self.loaded_from {
                Some(path) => format!("{} config ({})", self.format.source(), path.display()),
                None => self.format.source().to_string(),
            };
            CmdfigError::invalid(dotted_path, origin, reason)
        })
    }
}

impl Variable for ConfigVariable {
    fn name(&self) -> &str {
        self.path.name()
    }

    fn description(&self) -> &str {
        Variable::description(&self.path)
    }

    fn is_required(&self) -> bool {
        self.path.is_required()
    }

    fn destination_id(&self) -> DestinationId {
        self.path.destination_id()
    }

    fn type_name(&self) -> &'static str {
        match self.format {
            ConfigFormat::Toml => "toml config",
            ConfigFormat::Json => "json config",
        }
    }

    fn default_value(&self) -> Option<Value> {
        self.path.default_value()
    }

    fn set_defaults(&self) {
        self.path.set_defaults();
    }

    fn bind_flag(&self) -> Arg {
        self.path.bind_flag()
    }

    fn flag_value(&self, matches: &ArgMatches) -> Result<Option<Value>, CmdfigError> {
        self.path.flag_value(matches)
    }

    fn env_value(&self, raw: &str, env_name: &str) -> Result<Value, CmdfigError> {
        self.path.env_value(raw, env_name)
    }

    fn apply_value(&self, _value: &Value) -> Result<(), CmdfigError> {
        Err(CmdfigError::ConfigNotApplicable(self.path.name().to_string()))
    }

    fn as_config(&self) -> Option<&ConfigVariable> {
        Some(self)
    }

    fn as_config_mut(&mut self) -> Option<&mut ConfigVariable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TOML_DOC: &str = r#"
[main]
test-value = "from-toml"
port = 8080

[main.server]
timeout = "15s"
hosts = ["a", "b"]
"#;

    #[test]
    fn toml_lookup_by_dotted_path() {
        let mut config = ConfigVariable::toml("config");
        config.load_str("app.toml", TOML_DOC).unwrap();
        assert_eq!(
            config.value_at_path("main.test-value").unwrap(),
            Some(Value::from("from-toml"))
        );
        assert_eq!(config.value_at_path("main.port").unwrap(), Some(Value::Int(8080)));
        assert_eq!(
            config.value_at_path("main.server.timeout").unwrap(),
            Some(Value::from("15s"))
        );
        assert_eq!(config.value_at_path("main.missing").unwrap(), None);
        assert_eq!(config.value_at_path("other.port").unwrap(), None);
    }

    #[test]
    fn toml_non_scalar_is_an_error() {
        let mut config = ConfigVariable::toml("config");
        config.load_str("app.toml", TOML_DOC).unwrap();
        let err = config.value_at_path("main.server.hosts").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("main.server.hosts"));
        assert!(msg.contains("app.toml"));
    }

    #[test]
    fn json_lookup_by_dotted_path() {
        let mut config = ConfigVariable::json("settings");
        config
            .load_str(
                "app.json",
                r#"{"main": {"rate": 0.5, "nested": {"flag": true}, "gone": null}}"#,
            )
            .unwrap();
        assert_eq!(config.value_at_path("main.rate").unwrap(), Some(Value::Float(0.5)));
        assert_eq!(
            config.value_at_path("main.nested.flag").unwrap(),
            Some(Value::Bool(true))
        );
        assert_eq!(config.value_at_path("main.gone").unwrap(), None);
        assert_eq!(config.value_at_path("main.rate.deeper").unwrap(), None);
    }

    #[test]
    fn unloaded_config_has_no_values() {
        let config = ConfigVariable::toml("config");
        assert!(!config.is_loaded());
        assert_eq!(config.value_at_path("main.port").unwrap(), None);
    }

    #[test]
    fn parse_config_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, TOML_DOC).unwrap();

        let mut config = ConfigVariable::toml("config");
        config.parse_config(&path).unwrap();
        assert!(config.is_loaded());
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut config = ConfigVariable::toml("config");
        let err = config.parse_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, CmdfigError::Io { .. }));
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        let mut toml_config = ConfigVariable::toml("config");
        let err = toml_config.load_str("bad.toml", "[[[").unwrap_err();
        assert!(matches!(err, CmdfigError::TomlParse { .. }));
        assert!(!toml_config.is_loaded());

        let mut json_config = ConfigVariable::json("config");
        let err = json_config.load_str("bad.json", "{").unwrap_err();
        assert!(matches!(err, CmdfigError::JsonParse { .. }));
    }

    #[test]
    fn format_is_static_not_sniffed() {
        let mut config = ConfigVariable::json("config");
        let err = config.load_str("looks.toml", "port = 1").unwrap_err();
        assert!(matches!(err, CmdfigError::JsonParse { .. }));
    }

    #[test]
    fn declaration_delegates_to_the_path_variable() {
        let config = ConfigVariable::json("settings")
            .description("Settings file")
            .default("app.json")
            .required(true);
        assert_eq!(config.name(), "settings");
        assert_eq!(Variable::description(&config), "Settings file");
        assert!(config.is_required());
        assert_eq!(config.default_value(), Some(Value::from("app.json")));
        assert_eq!(config.type_name(), "json config");
    }

    #[test]
    fn unload_forgets_the_document() {
        let mut config = ConfigVariable::toml("config");
        config.load_str("app.toml", TOML_DOC).unwrap();
        config.unload();
        assert!(!config.is_loaded());
        assert_eq!(config.loaded_from(), None);
        assert_eq!(config.value_at_path("main.port").unwrap(), None);
    }

    #[test]
    fn config_variables_are_not_applied() {
        let config = ConfigVariable::toml("config");
        let err = config.apply_value(&Value::from("x.toml")).unwrap_err();
        assert!(matches!(err, CmdfigError::ConfigNotApplicable(_)));
        assert!(config.as_config().is_some());
    }
}
