// src/bin/yaml2cli.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use yaml2cli::{
    cli::{Cli, handlers},
    system::settings,
    t,
};

/// The main entry point of `yaml2cli`.
/// Sets up logging, parses arguments and performs centralized error handling.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    if cli.list {
        return handlers::list::handle(&cli);
    }

    let settings = settings::load_settings().context(t!("settings.error.load"))?;
    handlers::generate::handle(&cli, &settings)
}
