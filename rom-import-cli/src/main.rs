//! # `rom-import-cli`
//!
//! Thin command-line front end over `rom-import-ops`: loads a library JSON
//! file and a YAML run configuration, then packs the configured songs into a
//! ROM file in place.

mod cli;
mod import;

use clap::Parser;
use cli::{Cli, Commands};
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fmt::Display;

fn print_err<E: Display>(result: Result<(), E>) {
    if let Err(e) = result {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}

fn main() {
    let mut logger = Builder::new();
    logger.filter_level(LevelFilter::Info);
    logger.target(Target::Stdout).init();

    match Cli::parse().command {
        Commands::Import { library_path, rom_path, config_path } => {
            print_err(import::run_import(&library_path, &rom_path, &config_path));
        }
    }
}
