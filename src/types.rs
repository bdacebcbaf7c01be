use std::fmt;

use serde::Serialize;

/// Where a setting's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A default declared on the variable. Always the lowest layer.
    Default,
    /// An environment variable derived from the variable name.
    Environment,
    /// A JSON document loaded through a [`ConfigVariable`](crate::ConfigVariable).
    JsonConfig,
    /// A TOML document loaded through a [`ConfigVariable`](crate::ConfigVariable).
    TomlConfig,
    /// A flag given explicitly on the command line.
    CliFlag,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Source::Default => "Default",
            Source::Environment => "Environment",
            Source::JsonConfig => "JSON Config",
            Source::TomlConfig => "TOML Config",
            Source::CliFlag => "CLI Flag",
        };
        f.write_str(label)
    }
}

/// Document format of a config file. A static property of the declaring
/// variable, never sniffed from the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// The source kind settings read from this format are tagged with.
    pub fn source(self) -> Source {
        match self {
            ConfigFormat::Toml => Source::TomlConfig,
            ConfigFormat::Json => Source::JsonConfig,
        }
    }
}

/// The sources evaluated after defaults, in priority-ascending order
/// (last = highest).
pub const DEFAULT_PARSING_ORDER: [Source; 4] = [
    Source::Environment,
    Source::JsonConfig,
    Source::TomlConfig,
    Source::CliFlag,
];

/// Drop `Default` entries and repeated sources from a user-supplied order.
/// Defaults are always evaluated first and cannot be reordered.
pub(crate) fn normalize_order(order: &[Source]) -> Vec<Source> {
    let mut out: Vec<Source> = Vec::with_capacity(order.len());
    for source in order {
        if *source != Source::Default && !out.contains(source) {
            out.push(*source);
        }
    }
    out
}

/// Environment variable name for a variable: uppercased, with `.` and `-`
/// replaced by `_`. `test-value` becomes `TEST_VALUE`.
pub fn env_name(variable_name: &str) -> String {
    variable_name
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}
