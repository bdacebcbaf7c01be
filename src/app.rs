//! The application entry point: drives a command tree through one invocation.
//!
//! ```text
//! build tree → assign arguments → help check → parse flags → set defaults
//!   → load config files → resolve → report → run action
//! ```
//!
//! [`App::resolve_args`] does everything up to the report and returns a
//! [`RunOutcome`] without printing. [`App::run_with`] and [`App::run`] add
//! the output and the action call. Terminating the process is left to the
//! caller via [`RunOutcome::exit_code`].

use crate::command::Command;
use crate::error::CmdfigError;
use crate::resolve::{Resolution, ResolveInput, load_config_variables, resolve};
use crate::types::{DEFAULT_PARSING_ORDER, Source};

/// How one invocation ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// A help token was given. Nothing was resolved.
    Help {
        /// Expanded name of the command help was rendered for.
        command: String,
        text: String,
    },
    /// Every required variable was supplied and the destinations hold the
    /// resolved values.
    Completed {
        resolution: Resolution,
        /// Whether the deepest active command had an action to run.
        action_ran: bool,
    },
    /// At least one required variable was not supplied. No action ran.
    MissingRequired(Resolution),
}

impl RunOutcome {
    /// 0 for help and success, 1 when required variables are missing.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Help { .. } | RunOutcome::Completed { .. } => 0,
            RunOutcome::MissingRequired(_) => 1,
        }
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            RunOutcome::Help { .. } => None,
            RunOutcome::Completed { resolution, .. } | RunOutcome::MissingRequired(resolution) => {
                Some(resolution)
            }
        }
    }
}

/// Owns the root command and the settings that govern an invocation.
///
/// - **Parsing order**: [`parsing_order()`](Self::parsing_order), sources
///   after defaults, priority-ascending.
/// - **Help**: [`help_tokens()`](Self::help_tokens), tokens that show help
///   instead of resolving.
/// - **Report**: [`print_report()`](Self::print_report), print where every
///   setting came from after resolving.
pub struct App {
    command: Command,
    parsing_order: Vec<Source>,
    help_tokens: Vec<String>,
    print_report: bool,
}

impl App {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            parsing_order: DEFAULT_PARSING_ORDER.to_vec(),
            help_tokens: ["--help", "-h", "help"].map(String::from).to_vec(),
            print_report: false,
        }
    }

    /// Replace the default order (environment, JSON, TOML, flags). Defaults
    /// always come first; a `Default` entry here is ignored.
    pub fn parsing_order(mut self, order: &[Source]) -> Self {
        self.parsing_order = order.to_vec();
        self
    }

    /// Replace the tokens that trigger help (default: `--help`, `-h`, `help`).
    pub fn help_tokens(mut self, tokens: &[&str]) -> Self {
        self.help_tokens = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn print_report(mut self, print: bool) -> Self {
        self.print_report = print;
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Resolve `args` (without the binary name) against `env_vars`. Prints
    /// nothing and runs no action.
    pub fn resolve_args<S: AsRef<str>>(
        &mut self,
        args: &[S],
        env_vars: Vec<(String, String)>,
    ) -> Result<RunOutcome, CmdfigError> {
        let input = ResolveInput {
            env_vars,
            parsing_order: self.parsing_order.clone(),
        };
        self.resolve_input(args, &input)
    }

    fn resolve_input<S: AsRef<str>>(
        &mut self,
        args: &[S],
        input: &ResolveInput,
    ) -> Result<RunOutcome, CmdfigError> {
        self.command.build_tree()?;
        self.command.assign_arguments(args);

        if let Some(command) = self.command.help_command(&self.help_tokens) {
            log::debug!("Help requested for '{}'", command.expanded_name());
            return Ok(RunOutcome::Help {
                command: command.expanded_name().to_string(),
                text: command.render_help(),
            });
        }

        self.command.parse_flags()?;
        self.command.set_defaults();

        load_config_variables(&mut self.command, input)?;
        let resolution = resolve(&self.command, input)?;

        if resolution.is_complete() {
            Ok(RunOutcome::Completed {
                resolution,
                action_ran: false,
            })
        } else {
            Ok(RunOutcome::MissingRequired(resolution))
        }
    }

    /// Resolve, print help, the report or the missing variables as
    /// configured, then run the deepest active command's action on success.
    pub fn run_with<S: AsRef<str>>(
        &mut self,
        args: &[S],
        env_vars: Vec<(String, String)>,
    ) -> Result<RunOutcome, CmdfigError> {
        let outcome = self.resolve_args(args, env_vars)?;
        Ok(self.finish(outcome))
    }

    /// [`run_with`](Self::run_with) on the process arguments and environment.
    pub fn run(&mut self) -> Result<RunOutcome, CmdfigError> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let input = ResolveInput::from_env(&self.parsing_order);
        let outcome = self.resolve_input(&args, &input)?;
        Ok(self.finish(outcome))
    }

    fn finish(&self, mut outcome: RunOutcome) -> RunOutcome {
        match &mut outcome {
            RunOutcome::Help { text, .. } => print!("{text}"),
            RunOutcome::MissingRequired(resolution) => {
                if self.print_report {
                    eprint!("{}", resolution.report(&self.command));
                }
                eprintln!("{}", resolution.missing);
            }
            RunOutcome::Completed {
                resolution,
                action_ran,
            } => {
                if self.print_report {
                    print!("{}", resolution.report(&self.command));
                }
                *action_ran = self
                    .command
                    .deepest_active()
                    .is_some_and(Command::run_action);
            }
        }
        outcome
    }
}
