//! Resolved observations and the ordered map that holds them.
//!
//! Every value a source supplies becomes one [`ActiveSetting`], appended to
//! the bucket for its `(command path, variable name)` key. Buckets keep
//! arrival order, which is precedence order: the last entry wins. Buckets
//! themselves live in a `Vec` with a side index, so nothing observable ever
//! depends on hash iteration order.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::command::Command;
use crate::types::{Source, env_name};
use crate::value::Value;
use crate::variable::DestinationId;

/// Bucket key: the expanded command path and the variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SettingKey {
    pub command_path: String,
    pub variable_name: String,
}

impl SettingKey {
    pub fn new(command_path: &str, variable_name: &str) -> Self {
        Self {
            command_path: command_path.to_string(),
            variable_name: variable_name.to_string(),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.command_path, self.variable_name)
    }
}

/// One value for one variable from one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSetting {
    command_path: String,
    variable_name: String,
    value: Value,
    #[serde(skip)]
    destination: DestinationId,
    source: Source,
    source_label: String,
    duplicate_destination: bool,
    #[serde(skip)]
    sequence: usize,
}

impl ActiveSetting {
    pub fn command_path(&self) -> &str {
        &self.command_path
    }

    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn destination(&self) -> DestinationId {
        self.destination
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Env var name, config variable name, `--flag`, or `default`.
    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    /// True when a *different* variable sharing this destination overwrote
    /// the value.
    pub fn is_duplicate_destination(&self) -> bool {
        self.duplicate_destination
    }

    /// Global emission order across all buckets.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// `main.server.port`
    pub fn full_path(&self) -> String {
        format!("{}.{}", self.command_path, self.variable_name)
    }

    /// Human description of where the value came from, e.g.
    /// `Environment (PORT)`.
    pub fn origin(&self) -> String {
        match self.source {
            Source::Default => self.source.to_string(),
            _ => format!("{} ({})", self.source, self.source_label),
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    key: SettingKey,
    settings: Vec<ActiveSetting>,
}

/// Settings grouped per `(command path, variable name)` in arrival order.
#[derive(Debug, Clone, Default)]
pub struct SettingsMap {
    buckets: Vec<Bucket>,
    index: HashMap<SettingKey, usize>,
    next_sequence: usize,
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a setting to its key's bucket.
    pub fn push(
        &mut self,
        command_path: &str,
        variable_name: &str,
        value: Value,
        destination: DestinationId,
        source: Source,
        source_label: &str,
    ) {
        let key = SettingKey::new(command_path, variable_name);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.buckets.push(Bucket {
                    key: key.clone(),
                    settings: Vec::new(),
                });
                self.index.insert(key, self.buckets.len() - 1);
                self.buckets.len() - 1
            }
        };
        log::debug!(
            "{command_path}.{variable_name} = {value} from {source} ({source_label})"
        );
        self.buckets[slot].settings.push(ActiveSetting {
            command_path: command_path.to_string(),
            variable_name: variable_name.to_string(),
            value,
            destination,
            source,
            source_label: source_label.to_string(),
            duplicate_destination: false,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
    }

    /// All settings for a key, lowest precedence first. Empty if none.
    pub fn get(&self, command_path: &str, variable_name: &str) -> &[ActiveSetting] {
        self.index
            .get(&SettingKey::new(command_path, variable_name))
            .map(|&slot| self.buckets[slot].settings.as_slice())
            .unwrap_or(&[])
    }

    /// The highest-precedence setting for a key.
    pub fn winner(&self, command_path: &str, variable_name: &str) -> Option<&ActiveSetting> {
        self.get(command_path, variable_name).last()
    }

    /// Total number of settings across all keys.
    pub fn len(&self) -> usize {
        self.next_sequence
    }

    pub fn is_empty(&self) -> bool {
        self.next_sequence == 0
    }

    /// Every setting in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveSetting> {
        let mut all: Vec<&ActiveSetting> =
            self.buckets.iter().flat_map(|b| b.settings.iter()).collect();
        all.sort_by_key(|s| s.sequence);
        all.into_iter()
    }

    /// Settings flagged as overwritten through a shared destination.
    pub fn duplicates(&self) -> Vec<&ActiveSetting> {
        self.iter().filter(|s| s.duplicate_destination).collect()
    }

    /// Flag settings that lost their destination to a different variable.
    ///
    /// Non-default settings are grouped by destination. Within a group, a key
    /// seen more than once is the same variable overridden by a later
    /// source and is left alone. A key seen exactly once is flagged unless
    /// it is the variable that wrote the destination last (`last_writers`).
    /// Returns the number of settings flagged.
    pub fn mark_duplicate_destinations(
        &mut self,
        last_writers: &HashMap<DestinationId, SettingKey>,
    ) -> usize {
        // (bucket, position) pairs grouped by destination, groups in order of
        // first appearance.
        let mut groups: Vec<(DestinationId, Vec<(usize, usize)>)> = Vec::new();
        let mut group_index: HashMap<DestinationId, usize> = HashMap::new();

        let mut positions: Vec<(usize, usize, usize)> = Vec::new();
        for (b, bucket) in self.buckets.iter().enumerate() {
            for (s, setting) in bucket.settings.iter().enumerate() {
                if setting.source != Source::Default {
                    positions.push((setting.sequence, b, s));
                }
            }
        }
        positions.sort_unstable();

        for (_, b, s) in positions {
            let destination = self.buckets[b].settings[s].destination;
            let slot = *group_index.entry(destination).or_insert_with(|| {
                groups.push((destination, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push((b, s));
        }

        let mut flagged = Vec::new();
        for (destination, members) in &groups {
            if members.len() < 2 {
                continue;
            }
            let mut per_key: HashMap<usize, usize> = HashMap::new();
            for (b, _) in members {
                *per_key.entry(*b).or_default() += 1;
            }
            let writer = last_writers.get(destination);
            for &(b, s) in members {
                if per_key[&b] == 1 && writer != Some(&self.buckets[b].key) {
                    flagged.push((b, s));
                }
            }
        }

        for &(b, s) in &flagged {
            let setting = &mut self.buckets[b].settings[s];
            setting.duplicate_destination = true;
            log::warn!(
                "{} = {} from {} was overwritten by another variable sharing its destination",
                setting.full_path(),
                setting.value,
                setting.origin()
            );
        }
        flagged.len()
    }

    /// Buckets arranged by command traversal order, then variable
    /// declaration order. Commands without settings are omitted.
    pub fn ordered<'a>(&'a self, commands: &[&Command]) -> Vec<(String, Vec<&'a [ActiveSetting]>)> {
        let mut out = Vec::new();
        for command in commands {
            let path = command.expanded_name();
            let buckets: Vec<&[ActiveSetting]> = command
                .variables()
                .iter()
                .map(|v| self.get(path, v.name()))
                .filter(|settings| !settings.is_empty())
                .collect();
            if !buckets.is_empty() {
                out.push((path.to_string(), buckets));
            }
        }
        out
    }

    /// Per-setting status report in the same arrangement as
    /// [`ordered`](Self::ordered).
    pub fn report(&self, commands: &[&Command]) -> SettingsReport {
        let sections = self
            .ordered(commands)
            .into_iter()
            .map(|(command_path, buckets)| {
                let entries = buckets
                    .into_iter()
                    .flat_map(|settings| {
                        let last = settings.len() - 1;
                        settings.iter().enumerate().map(move |(i, setting)| {
                            let status = if setting.duplicate_destination {
                                SettingStatus::OverwrittenDestination
                            } else if i != last {
                                SettingStatus::Ignored
                            } else {
                                SettingStatus::Used
                            };
                            ReportEntry {
                                setting: setting.clone(),
                                status,
                            }
                        })
                    })
                    .collect();
                ReportSection {
                    command_path,
                    entries,
                }
            })
            .collect();
        SettingsReport { sections }
    }
}

/// Outcome of a single setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingStatus {
    /// The value that was written.
    Used,
    /// Superseded by a later source for the same variable.
    Ignored,
    /// Overwritten by a different variable sharing the destination.
    OverwrittenDestination,
}

impl fmt::Display for SettingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingStatus::Used => f.write_str("set from"),
            SettingStatus::Ignored => f.write_str("ignored"),
            SettingStatus::OverwrittenDestination => f.write_str("overwritten destination"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub setting: ActiveSetting,
    pub status: SettingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub command_path: String,
    pub entries: Vec<ReportEntry>,
}

/// Which source set each variable, and which values lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsReport {
    pub sections: Vec<ReportSection>,
}

impl fmt::Display for SettingsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "Configuration: {}", section.command_path)?;
            for entry in &section.entries {
                let setting = &entry.setting;
                let source = match setting.source {
                    Source::Environment => {
                        format!("{} ({})", setting.source, env_name(&setting.variable_name))
                    }
                    _ => setting.origin(),
                };
                writeln!(
                    f,
                    "  {} = {} ({})  {} {}",
                    setting.variable_name,
                    setting.value,
                    setting.value.type_name(),
                    entry.status,
                    source
                )?;
            }
        }
        Ok(())
    }
}

/// Required variables no source supplied, grouped per command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingReport {
    pub commands: Vec<MissingVariables>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingVariables {
    pub command_path: String,
    pub variables: Vec<String>,
}

impl MissingReport {
    pub fn push(&mut self, command_path: &str, variable_name: &str) {
        match self.commands.last_mut() {
            Some(group) if group.command_path == command_path => {
                group.variables.push(variable_name.to_string());
            }
            _ => self.commands.push(MissingVariables {
                command_path: command_path.to_string(),
                variables: vec![variable_name.to_string()],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of missing variables across all commands.
    pub fn total(&self) -> usize {
        self.commands.iter().map(|g| g.variables.len()).sum()
    }
}

impl fmt::Display for MissingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing required variables:")?;
        for group in &self.commands {
            write!(f, "\n  {}: {}", group.command_path, group.variables.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Destination;

    fn dest() -> DestinationId {
        Destination::new(0i64).id()
    }

    #[test]
    fn buckets_keep_arrival_order() {
        let d = dest();
        let mut map = SettingsMap::new();
        map.push("main", "port", Value::Int(1), d, Source::Default, "default");
        map.push("main", "host", Value::from("h"), dest(), Source::Environment, "HOST");
        map.push("main", "port", Value::Int(2), d, Source::Environment, "PORT");
        map.push("main", "port", Value::Int(3), d, Source::CliFlag, "--port");

        let port = map.get("main", "port");
        let values: Vec<&Value> = port.iter().map(ActiveSetting::value).collect();
        assert_eq!(values, vec![&Value::Int(1), &Value::Int(2), &Value::Int(3)]);
        assert_eq!(map.winner("main", "port").unwrap().source(), Source::CliFlag);
        assert_eq!(map.len(), 4);
        assert!(map.get("main", "absent").is_empty());
    }

    #[test]
    fn iter_follows_emission_order() {
        let mut map = SettingsMap::new();
        map.push("main", "a", Value::Int(1), dest(), Source::Default, "default");
        map.push("main", "b", Value::Int(2), dest(), Source::Default, "default");
        map.push("main", "a", Value::Int(3), dest(), Source::CliFlag, "--a");
        let seqs: Vec<String> = map.iter().map(ActiveSetting::full_path).collect();
        assert_eq!(seqs, vec!["main.a", "main.b", "main.a"]);
    }

    #[test]
    fn aliased_variables_flagged_except_last_writer() {
        let shared = dest();
        let mut map = SettingsMap::new();
        map.push("main", "example-a", Value::from("a"), shared, Source::CliFlag, "--example-a");
        map.push("main", "example-b", Value::from("b"), shared, Source::CliFlag, "--example-b");

        let writers = HashMap::from([(shared, SettingKey::new("main", "example-b"))]);
        assert_eq!(map.mark_duplicate_destinations(&writers), 1);
        assert!(map.get("main", "example-a")[0].is_duplicate_destination());
        assert!(!map.get("main", "example-b")[0].is_duplicate_destination());
    }

    #[test]
    fn same_variable_overrides_are_not_duplicates() {
        let d = dest();
        let mut map = SettingsMap::new();
        map.push("main", "port", Value::Int(1), d, Source::Environment, "PORT");
        map.push("main", "port", Value::Int(2), d, Source::CliFlag, "--port");
        let writers = HashMap::from([(d, SettingKey::new("main", "port"))]);
        assert_eq!(map.mark_duplicate_destinations(&writers), 0);
        assert!(map.duplicates().is_empty());
    }

    #[test]
    fn defaults_never_count_toward_duplicates() {
        let shared = dest();
        let mut map = SettingsMap::new();
        map.push("main", "a", Value::Int(1), shared, Source::Default, "default");
        map.push("main", "b", Value::Int(2), shared, Source::CliFlag, "--b");
        let writers = HashMap::from([(shared, SettingKey::new("main", "b"))]);
        assert_eq!(map.mark_duplicate_destinations(&writers), 0);
    }

    #[test]
    fn missing_report_groups_by_command() {
        let mut missing = MissingReport::default();
        missing.push("main", "a");
        missing.push("main", "b");
        missing.push("main.server", "c");
        assert_eq!(missing.commands.len(), 2);
        assert_eq!(missing.total(), 3);
        let text = missing.to_string();
        assert!(text.contains("main: a, b"));
        assert!(text.contains("main.server: c"));
    }

    #[test]
    fn origin_describes_source() {
        let mut map = SettingsMap::new();
        map.push("main", "a", Value::Int(1), dest(), Source::Default, "default");
        map.push("main", "a", Value::Int(2), dest(), Source::TomlConfig, "config");
        let settings = map.get("main", "a");
        assert_eq!(settings[0].origin(), "Default");
        assert_eq!(settings[1].origin(), "TOML Config (config)");
    }
}
