//! Declarative command-line configuration: a tree of commands, typed
//! variables bound to your own storage, and one resolver that fills that
//! storage from defaults, environment variables, config files and flags.
//!
//! ```ignore
//! let port = Destination::new(0);
//! let mut app = App::new(
//!     Command::new("main")
//!         .variable(ConfigVariable::toml("config"))
//!         .subcommand(
//!             Command::new("server")
//!                 .variable(IntVariable::new("port").default(8080).bind(&port))
//!                 .action(move || println!("serving")),
//!         ),
//! );
//! let outcome = app.run()?;
//! std::process::exit(outcome.exit_code());
//! ```
//!
//! `main --config=app.toml server --port=9000` selects `main` and
//! `main.server`, reads `app.toml`, and leaves `9000` in `port` no matter
//! what `PORT` or the file says.
//!
//! # Commands and argument slices
//!
//! A [`Command`] owns a name, usage text, its variables, child commands and
//! an optional action. The argument vector is split across the selected
//! path: each active command parses only the tokens between its own name
//! and the next selected child's name, so `--port` on `main` and `--port` on
//! `main.server` are different flags. Subcommands are matched in declaration
//! order, first match wins.
//!
//! # Variables and destinations
//!
//! Variables are typed ([`StringVariable`], [`BoolVariable`],
//! [`IntVariable`], [`Int64Variable`], [`Float64Variable`],
//! [`DurationVariable`]) and write into a [`Destination`], a shared cell the
//! caller keeps a handle to. Each destination has an identity; binding two
//! variables to the same one is allowed, and the resolver flags the setting
//! that was silently overwritten.
//!
//! A [`ConfigVariable`] is a path variable whose file (TOML or JSON) becomes
//! a source for everything else. Values are looked up by
//! `command.subcommand.variable`, root name included:
//!
//! ```toml
//! [main.server]
//! port = 9000
//! ```
//!
//! # Layer precedence
//!
//! ```text
//! Defaults              .default(...)
//!        ↑ overridden by
//! Environment vars      test-value → TEST_VALUE
//!        ↑ overridden by
//! JSON config files     in declaration order
//!        ↑ overridden by
//! TOML config files     in declaration order
//!        ↑ overridden by
//! CLI flags             --name=value
//! ```
//!
//! The order after defaults is configurable with
//! [`App::parsing_order`]; sources left out are not consulted. Every layer
//! is sparse: a source only contributes the variables it actually supplies,
//! and a flag counts as supplied only when it appears on the command line,
//! so `--count=0` overrides a non-zero environment value.
//!
//! # Provenance
//!
//! Every value from every source is kept, in arrival order, in a
//! [`SettingsMap`]. [`Resolution::report`] renders which value was used,
//! which were ignored, and which were overwritten through a shared
//! destination; [`Resolution::to_json`] emits the same as JSON.
//!
//! # Failure
//!
//! Malformed values, unreadable config files and duplicate declarations are
//! [`CmdfigError`]s. A missing required variable is not an error: the run
//! ends in [`RunOutcome::MissingRequired`] with exit code 1 and no action
//! runs.
//!
//! Logging goes through the [`log`](https://docs.rs/log) facade; install
//! any logger to see argument assignment, config loading and every emitted
//! setting at `debug`, and destination aliasing at `warn`.

pub mod duration;
pub mod error;
pub mod types;
pub mod value;

mod app;
mod command;
mod config;
mod resolve;
mod settings;
mod variable;

#[cfg(test)]
mod fixtures;

pub use app::{App, RunOutcome};
pub use command::Command;
pub use config::{ConfigDocument, ConfigSource, ConfigVariable};
pub use duration::{DurationError, format_duration, parse_duration};
pub use error::CmdfigError;
pub use resolve::{Resolution, ResolveInput, load_config_variables, resolve};
pub use settings::{
    ActiveSetting, MissingReport, MissingVariables, ReportEntry, ReportSection, SettingKey,
    SettingStatus, SettingsMap, SettingsReport,
};
pub use types::{ConfigFormat, DEFAULT_PARSING_ORDER, Source, env_name};
pub use value::Value;
pub use variable::{
    BoolVariable, Destination, DestinationId, DurationVariable, Float64Variable, Int64Variable,
    IntVariable, StringVariable, TypedVariable, Variable, VariableType,
};
