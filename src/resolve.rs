//! Core resolution pipeline: collect every source's values, apply the winners,
//! and annotate the result.
//!
//! Operates on a command tree whose arguments are assigned and flags parsed,
//! plus pre-loaded data (`ResolveInput`), making the full pipeline testable
//! with synthetic environments. Steps:
//!
//! 1. Defaults for every variable that declares one
//! 2. Each source of the parsing order, in order (later wins)
//! 3. Apply the last setting of each variable to its destination
//! 4. Flag settings lost to another variable sharing a destination
//! 5. Collect required variables no source supplied
//!
//! Config files are read beforehand by [`load_config_variables`], the only
//! step that touches the filesystem.

use std::collections::HashMap;
use std::path::Path;

use crate::command::Command;
use crate::config::ConfigVariable;
use crate::error::CmdfigError;
use crate::settings::{MissingReport, SettingKey, SettingsMap, SettingsReport};
use crate::types::{DEFAULT_PARSING_ORDER, Source, env_name, normalize_order};
use crate::value::Value;
use crate::variable::{DestinationId, Variable};

/// All pre-loaded data needed to resolve settings. No I/O happens here.
#[derive(Debug, Clone)]
pub struct ResolveInput {
    /// Raw environment variable pairs (pass `std::env::vars().collect()` or
    /// synthetic data). For repeated names the last pair wins.
    pub env_vars: Vec<(String, String)>,
    /// Sources evaluated after defaults, priority-ascending.
    pub parsing_order: Vec<Source>,
}

impl Default for ResolveInput {
    fn default() -> Self {
        Self {
            env_vars: Vec::new(),
            parsing_order: DEFAULT_PARSING_ORDER.to_vec(),
        }
    }
}

impl ResolveInput {
    /// Input backed by the process environment.
    pub fn from_env(parsing_order: &[Source]) -> Self {
        Self {
            env_vars: std::env::vars().collect(),
            parsing_order: parsing_order.to_vec(),
        }
    }

    fn env_lookup(&self) -> HashMap<&str, &str> {
        self.env_vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Everything resolution produced.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub settings: SettingsMap,
    pub missing: MissingReport,
}

impl Resolution {
    /// True when no required variable is missing.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Status of every setting, arranged like the active command tree.
    pub fn report(&self, root: &Command) -> SettingsReport {
        self.settings.report(&root.active_commands())
    }

    /// The report plus missing variables as pretty-printed JSON.
    pub fn to_json(&self, root: &Command) -> Result<String, CmdfigError> {
        let doc = serde_json::json!({
            "settings": self.report(root),
            "missing": self.missing,
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

/// Resolve each active config variable's path and parse its file.
///
/// A config path comes from the variable's default, then the environment and
/// the command line if those sources are in the parsing order (last wins).
/// Config variables without a path are left unloaded, dropping any document
/// an earlier invocation loaded. Returns the number of files loaded.
pub fn load_config_variables(root: &mut Command, input: &ResolveInput) -> Result<usize, CmdfigError> {
    let order = normalize_order(&input.parsing_order);
    let env = input.env_lookup();
    let mut loaded = 0;

    root.visit_active_mut(&mut |command: &mut Command| {
        let matches = command.matches().cloned();
        for variable in command.variables_mut() {
            let Some(config) = variable.as_config_mut() else {
                continue;
            };
            let Some(path) = config_path(config, &order, &env, matches.as_ref())? else {
                config.unload();
                continue;
            };
            config.parse_config(Path::new(&path))?;
            loaded += 1;
        }
        Ok(())
    })?;

    Ok(loaded)
}

fn config_path(
    config: &ConfigVariable,
    order: &[Source],
    env: &HashMap<&str, &str>,
    matches: Option<&clap::ArgMatches>,
) -> Result<Option<String>, CmdfigError> {
    let mut path = config.default_value();
    for source in order {
        match source {
            Source::Environment => {
                let name = env_name(config.name());
                if let Some(raw) = env.get(name.as_str()) {
                    path = Some(config.env_value(raw, &name)?);
                }
            }
            Source::CliFlag => {
                if let Some(value) = matches.map(|m| config.flag_value(m)).transpose()?.flatten() {
                    path = Some(value);
                }
            }
            _ => {}
        }
    }
    Ok(match path {
        Some(Value::String(p)) if !p.is_empty() => Some(p),
        _ => None,
    })
}

/// Resolve the active commands of `root` and write the winners into their
/// destinations.
pub fn resolve(root: &Command, input: &ResolveInput) -> Result<Resolution, CmdfigError> {
    let commands = root.active_commands();
    let order = normalize_order(&input.parsing_order);
    let env = input.env_lookup();

    let mut settings = collect_settings(&commands, &order, &env)?;
    let last_writers = apply(&commands, &settings)?;
    settings.mark_duplicate_destinations(&last_writers);
    let missing = missing_required(&commands, &settings);

    Ok(Resolution { settings, missing })
}

fn collect_settings(
    commands: &[&Command],
    order: &[Source],
    env: &HashMap<&str, &str>,
) -> Result<SettingsMap, CmdfigError> {
    let mut settings = SettingsMap::new();

    for command in commands {
        for variable in command.variables() {
            if let Some(value) = variable.default_value() {
                settings.push(
                    command.expanded_name(),
                    variable.name(),
                    value,
                    variable.destination_id(),
                    Source::Default,
                    "default",
                );
            }
        }
    }

    for &source in order {
        match source {
            Source::Environment => collect_env(commands, env, &mut settings)?,
            Source::JsonConfig | Source::TomlConfig => {
                collect_config(commands, source, &mut settings)?;
            }
            Source::CliFlag => collect_flags(commands, &mut settings)?,
            Source::Default => {}
        }
    }

    Ok(settings)
}

fn collect_env(
    commands: &[&Command],
    env: &HashMap<&str, &str>,
    settings: &mut SettingsMap,
) -> Result<(), CmdfigError> {
    for command in commands {
        for variable in command.variables() {
            let name = env_name(variable.name());
            let Some(raw) = env.get(name.as_str()) else {
                continue;
            };
            let value = variable.env_value(raw, &name)?;
            settings.push(
                command.expanded_name(),
                variable.name(),
                value,
                variable.destination_id(),
                Source::Environment,
                &name,
            );
        }
    }
    Ok(())
}

fn collect_config(
    commands: &[&Command],
    source: Source,
    settings: &mut SettingsMap,
) -> Result<(), CmdfigError> {
    let configs: Vec<&ConfigVariable> = commands
        .iter()
        .flat_map(|command| command.variables())
        .filter_map(|variable| variable.as_config())
        .filter(|config| config.format().source() == source && config.is_loaded())
        .collect();

    for config in configs {
        for command in commands {
            for variable in command.variables() {
                if variable.as_config().is_some() {
                    continue;
                }
                let path = format!("{}.{}", command.expanded_name(), variable.name());
                if let Some(value) = config.value_at_path(&path)? {
                    settings.push(
                        command.expanded_name(),
                        variable.name(),
                        value,
                        variable.destination_id(),
                        source,
                        config.name(),
                    );
                }
            }
        }
    }
    Ok(())
}

fn collect_flags(commands: &[&Command], settings: &mut SettingsMap) -> Result<(), CmdfigError> {
    for command in commands {
        let Some(matches) = command.matches() else {
            continue;
        };
        for variable in command.variables() {
            if let Some(value) = variable.flag_value(matches)? {
                settings.push(
                    command.expanded_name(),
                    variable.name(),
                    value,
                    variable.destination_id(),
                    Source::CliFlag,
                    &format!("--{}", variable.name()),
                );
            }
        }
    }
    Ok(())
}

/// Write each variable's winning setting. Returns, per destination, the
/// variable that wrote it last.
fn apply(
    commands: &[&Command],
    settings: &SettingsMap,
) -> Result<HashMap<DestinationId, SettingKey>, CmdfigError> {
    let mut last_writers = HashMap::new();
    for command in commands {
        for variable in command.variables() {
            if variable.as_config().is_some() {
                continue;
            }
            let Some(winner) = settings.winner(command.expanded_name(), variable.name()) else {
                continue;
            };
            variable
                .apply_value(winner.value())
                .map_err(|e| match e {
                    CmdfigError::InvalidValue {
                        variable, reason, ..
                    } => CmdfigError::InvalidValue {
                        variable,
                        origin: winner.origin(),
                        reason,
                    },
                    other => other,
                })?;
            last_writers.insert(
                variable.destination_id(),
                SettingKey::new(command.expanded_name(), variable.name()),
            );
        }
    }
    Ok(last_writers)
}

fn missing_required(commands: &[&Command], settings: &SettingsMap) -> MissingReport {
    let mut missing = MissingReport::default();
    for command in commands {
        for variable in command.variables() {
            let supplied = !settings
                .get(command.expanded_name(), variable.name())
                .is_empty();
            if variable.is_required() && !supplied {
                missing.push(command.expanded_name(), variable.name());
            }
        }
    }
    missing
}
