//! Command-line surface: a single `import` command wiring a library JSON
//! file, a ROM file, and a YAML run configuration into `rom_import_ops`.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Import tracker music modules into a ROM image", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pack a library's modules into a ROM image according to a run config
    Import {
        /// Path to the library JSON file (singles/groups of base64-encoded modules)
        #[arg(value_hint = ValueHint::FilePath)]
        library_path: PathBuf,

        /// Path to the ROM file to modify in place
        #[arg(value_hint = ValueHint::FilePath)]
        rom_path: PathBuf,

        /// Path to the YAML run configuration (rom layout, bank layout, song assignment)
        #[arg(value_hint = ValueHint::FilePath)]
        config_path: PathBuf,
    },
}
