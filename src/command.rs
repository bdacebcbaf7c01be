//! The command tree and how an argument vector is split across it.
//!
//! A tree of [`Command`]s is declared up front. For each invocation the raw
//! tokens are divided so that every node on the selected path owns the slice
//! between its own name and the next selected subcommand's name:
//!
//! ```text
//! main [main args] server [server args] metrics [metrics args]
//! ```
//!
//! Nodes on that path are *active*; declared siblings that were not selected
//! stay inactive and take no part in resolution.

use std::collections::HashSet;
use std::fmt;

use clap::{Arg, ArgAction, ArgMatches};

use crate::error::CmdfigError;
use crate::variable::Variable;

/// Id of the hidden catch-all for tokens that are not flags.
const POSITIONAL_ID: &str = "cmdfig-positional-args";

/// A node in the command tree.
pub struct Command {
    name: String,
    usage: String,
    variables: Vec<Box<dyn Variable>>,
    subcommands: Vec<Command>,
    action: Option<Box<dyn Fn()>>,

    expanded_name: Option<String>,
    args: Option<Vec<String>>,
    active: bool,
    matches: Option<ArgMatches>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            usage: String::new(),
            variables: Vec::new(),
            subcommands: Vec::new(),
            action: None,
            expanded_name: None,
            args: None,
            active: false,
            matches: None,
        }
    }

    pub fn usage(mut self, usage: &str) -> Self {
        self.usage = usage.to_string();
        self
    }

    pub fn variable(mut self, variable: impl Variable + 'static) -> Self {
        self.variables.push(Box::new(variable));
        self
    }

    pub fn subcommand(mut self, command: Command) -> Self {
        self.subcommands.push(command);
        self
    }

    /// Callback run when this is the deepest selected command and resolution
    /// succeeded.
    pub fn action(mut self, action: impl Fn() + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage_text(&self) -> &str {
        &self.usage
    }

    pub fn variables(&self) -> &[Box<dyn Variable>] {
        &self.variables
    }

    pub(crate) fn variables_mut(&mut self) -> &mut [Box<dyn Variable>] {
        &mut self.variables
    }

    pub fn subcommands(&self) -> &[Command] {
        &self.subcommands
    }

    /// Declared subcommand by name.
    pub fn find_subcommand(&self, name: &str) -> Option<&Command> {
        self.subcommands.iter().find(|c| c.name == name)
    }

    /// Tokens this node owns for the current invocation; `None` if it was
    /// never assigned any.
    pub fn args(&self) -> Option<&[String]> {
        self.args.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Dot-joined path from the root, e.g. `main.server.metrics`. Falls back
    /// to the bare name before [`build_tree`](Self::build_tree) runs.
    pub fn expanded_name(&self) -> &str {
        self.expanded_name.as_deref().unwrap_or(&self.name)
    }

    pub fn matches(&self) -> Option<&ArgMatches> {
        self.matches.as_ref()
    }

    /// Tokens in this node's slice that were not flags or flag values.
    pub fn positional_args(&self) -> Vec<String> {
        self.matches
            .as_ref()
            .and_then(|m| m.get_many::<String>(POSITIONAL_ID))
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn run_action(&self) -> bool {
        match &self.action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    /// Compute expanded names for the whole tree and validate declarations.
    /// Safe to call more than once.
    pub fn build_tree(&mut self) -> Result<(), CmdfigError> {
        self.build_subtree(None)
    }

    fn build_subtree(&mut self, parent: Option<&str>) -> Result<(), CmdfigError> {
        let expanded = match parent {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        };

        let mut seen = HashSet::new();
        for variable in &self.variables {
            if !seen.insert(variable.name()) {
                return Err(CmdfigError::DuplicateVariable {
                    command: expanded,
                    variable: variable.name().to_string(),
                });
            }
        }

        for sub in &mut self.subcommands {
            sub.build_subtree(Some(&expanded))?;
        }
        self.expanded_name = Some(expanded);
        Ok(())
    }

    /// Split `tokens` across this node and its selected descendants.
    ///
    /// Subcommands are tried in declaration order, and the first one whose
    /// name appears anywhere in the tokens is selected, even when another
    /// subcommand's name appears earlier in the token stream.
    pub fn assign_arguments<S: AsRef<str>>(&mut self, tokens: &[S]) {
        let tokens: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
        self.reset_invocation();
        self.assign(&tokens);
    }

    fn assign(&mut self, tokens: &[String]) {
        self.active = true;

        let selected = self.subcommands.iter().enumerate().find_map(|(i, sub)| {
            tokens
                .iter()
                .position(|token| *token == sub.name)
                .map(|pos| (i, pos))
        });

        match selected {
            Some((index, pos)) => {
                self.args = Some(tokens[..pos].to_vec());
                log::debug!(
                    "'{}' claims {} token(s), descending into '{}'",
                    self.expanded_name(),
                    pos,
                    self.subcommands[index].name
                );
                self.subcommands[index].assign(&tokens[pos + 1..]);
            }
            None => {
                self.args = Some(tokens.to_vec());
                log::debug!(
                    "'{}' claims all {} remaining token(s)",
                    self.expanded_name(),
                    tokens.len()
                );
            }
        }
    }

    fn reset_invocation(&mut self) {
        self.args = None;
        self.active = false;
        self.matches = None;
        for sub in &mut self.subcommands {
            sub.reset_invocation();
        }
    }

    /// Active nodes, depth first, parent before children.
    pub fn active_commands(&self) -> Vec<&Command> {
        let mut out = Vec::new();
        self.collect_active(&mut out);
        out
    }

    fn collect_active<'a>(&'a self, out: &mut Vec<&'a Command>) {
        if !self.active {
            return;
        }
        out.push(self);
        for sub in &self.subcommands {
            sub.collect_active(out);
        }
    }

    /// Visit active nodes mutably in the same order as
    /// [`active_commands`](Self::active_commands).
    pub(crate) fn visit_active_mut(
        &mut self,
        f: &mut dyn FnMut(&mut Command) -> Result<(), CmdfigError>,
    ) -> Result<(), CmdfigError> {
        if !self.active {
            return Ok(());
        }
        f(self)?;
        for sub in &mut self.subcommands {
            sub.visit_active_mut(f)?;
        }
        Ok(())
    }

    /// The last node on the selected path.
    pub fn deepest_active(&self) -> Option<&Command> {
        self.active_commands().pop()
    }

    /// If any active node's slice contains one of `help_tokens`, the deepest
    /// active node (the one help should be shown for).
    pub fn help_command(&self, help_tokens: &[String]) -> Option<&Command> {
        let asked = self.active_commands().iter().any(|command| {
            command
                .args
                .iter()
                .flatten()
                .any(|token| help_tokens.contains(token))
        });
        if asked { self.deepest_active() } else { None }
    }

    /// Parse every active node's slice against the flags its variables
    /// declare.
    pub fn parse_flags(&mut self) -> Result<(), CmdfigError> {
        self.visit_active_mut(&mut |command: &mut Command| {
            let args = command.args.clone().unwrap_or_default();
            let matches = command
                .flag_parser()
                .try_get_matches_from(args)
                .map_err(|e| CmdfigError::FlagParse {
                    command: command.expanded_name().to_string(),
                    source: e,
                })?;
            command.matches = Some(matches);
            Ok(())
        })
    }

    /// The clap parser for this node's own flags. Help handling stays with
    /// the caller, so clap's built-in help and version flags are disabled.
    pub fn flag_parser(&self) -> clap::Command {
        let mut parser = clap::Command::new(self.name.clone())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .args_override_self(true)
            .allow_negative_numbers(true)
            .about(self.usage.clone())
            .arg(
                Arg::new(POSITIONAL_ID)
                    .num_args(0..)
                    .action(ArgAction::Append)
                    .value_parser(clap::value_parser!(String))
                    .hide(true),
            );
        for variable in &self.variables {
            parser = parser.arg(variable.bind_flag());
        }
        parser
    }

    /// Help text for this node: usage, flags, and declared subcommands.
    pub fn render_help(&self) -> String {
        let mut parser = self
            .flag_parser()
            .bin_name(self.expanded_name().replace('.', " "));
        for sub in &self.subcommands {
            parser = parser.subcommand(clap::Command::new(sub.name.clone()).about(sub.usage.clone()));
        }
        parser.render_help().to_string()
    }

    /// Write configured defaults into the destinations of every active
    /// node's variables.
    pub fn set_defaults(&self) {
        for command in self.active_commands() {
            for variable in &command.variables {
                variable.set_defaults();
            }
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variables: Vec<&str> = self.variables.iter().map(|v| v.name()).collect();
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("expanded_name", &self.expanded_name)
            .field("variables", &variables)
            .field("args", &self.args)
            .field("active", &self.active)
            .field("subcommands", &self.subcommands)
            .finish()
    }
}
