//! # cmdfig demo application
//!
//! A sample CLI tool with a three-level command tree (`main`, `server`,
//! `metrics`) that showcases how cmdfig splits arguments, layers sources and
//! reports where each value came from. It exists purely to demonstrate and
//! manually verify cmdfig's features.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example cmdfig_demo -- --random-value=hello
//! cargo run --example cmdfig_demo -- server --port=9000 metrics
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature                   | How to exercise it                                                        |
//! |---------------------------|---------------------------------------------------------------------------|
//! | Defaults                  | `cargo run --example cmdfig_demo -- server`                               |
//! | Env var override          | `PORT=7000 cargo run --example cmdfig_demo -- server`                     |
//! | CLI flag override         | `cargo run --example cmdfig_demo -- server --port=9000`                   |
//! | Bare bool flag            | `cargo run --example cmdfig_demo -- --booltest`                           |
//! | TOML config file          | `cargo run --example cmdfig_demo -- --config=demo.toml server`            |
//! | JSON config file          | `DEMO_JSON=demo.json cargo run --example cmdfig_demo -- server`           |
//! | Duration variable         | `cargo run --example cmdfig_demo -- server --timeout=1m30s`               |
//! | Shared destination        | `cargo run --example cmdfig_demo -- --random-value=a server metrics --random-value=b` |
//! | Required variable         | `cargo run --example cmdfig_demo -- server metrics` (no `--interval`)     |
//! | Help for a subcommand     | `cargo run --example cmdfig_demo -- server --help`                        |
//! | Debug logging             | `RUST_LOG=debug cargo run --example cmdfig_demo -- server`                |
//!
//! A TOML file for `--config` looks like:
//!
//! ```toml
//! [main]
//! random-value = "from-file"
//!
//! [main.server]
//! port = 9100
//! timeout = "45s"
//! ```

use std::rc::Rc;
use std::time::Duration;

use cmdfig::{
    App, BoolVariable, Command, ConfigVariable, Destination, DurationVariable, IntVariable,
    StringVariable, format_duration,
};

/// Handles to everything the demo's variables write into.
#[derive(Clone, Default)]
struct DemoConfig {
    random_value: Destination<String>,
    booltest: Destination<bool>,
    port: Destination<i32>,
    timeout: Destination<Duration>,
    interval: Destination<Duration>,
}

fn build_command(config: &DemoConfig) -> Command {
    let main_config = Rc::new(config.clone());
    let server_config = Rc::clone(&main_config);
    let metrics_config = Rc::clone(&main_config);

    Command::new("main")
        .usage("A sample application showing layered configuration.")
        .variable(ConfigVariable::toml("config").description("TOML config file"))
        .variable(ConfigVariable::json("demo-json").description("JSON config file"))
        .variable(
            StringVariable::new("random-value")
                .description("Here's a random string")
                .bind(&config.random_value),
        )
        .variable(
            BoolVariable::new("booltest")
                .description("Bool test")
                .bind(&config.booltest),
        )
        .action(move || {
            println!("Running main command.");
            print_config(&main_config);
        })
        .subcommand(
            Command::new("server")
                .usage("Run the server")
                .variable(
                    IntVariable::new("port")
                        .description("Port to listen on")
                        .default(8080)
                        .bind(&config.port),
                )
                .variable(
                    DurationVariable::new("timeout")
                        .description("Request timeout")
                        .default(Duration::from_secs(30))
                        .bind(&config.timeout),
                )
                .action(move || {
                    println!("Running server command.");
                    print_config(&server_config);
                })
                .subcommand(
                    Command::new("metrics")
                        .usage("Run the server with metrics reporting")
                        .variable(
                            StringVariable::new("random-value")
                                .description("Shares its destination with main's random-value")
                                .bind(&config.random_value),
                        )
                        .variable(
                            DurationVariable::new("interval")
                                .description("Reporting interval")
                                .required(true)
                                .bind(&config.interval),
                        )
                        .action(move || {
                            println!("Running server metrics command.");
                            print_config(&metrics_config);
                        }),
                ),
        )
}

fn print_config(config: &DemoConfig) {
    println!("  random-value = {:?}", config.random_value.get());
    println!("  booltest     = {}", config.booltest.get());
    println!("  port         = {}", config.port.get());
    println!("  timeout      = {}", format_duration(config.timeout.get()));
    println!("  interval     = {}", format_duration(config.interval.get()));
}

fn main() {
    env_logger::init();

    let config = DemoConfig::default();
    let mut app = App::new(build_command(&config)).print_report(true);

    let outcome = app.run().unwrap_or_else(|e| {
        eprintln!("Configuration error:\n{e}");
        std::process::exit(1);
    });
    std::process::exit(outcome.exit_code());
}
