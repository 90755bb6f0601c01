//! # `rom-import-ops`
//!
//! The placement-and-relocation core: bank layouts, the per-module placement
//! record, the bank packer, and the ROM table writers. Everything here
//! operates purely on `rom_import_io`'s data model and the `RomAccess` /
//! `FtmBinary` contracts -- it knows nothing about JSON, YAML, or the CLI.

pub mod bank;
pub mod imported_module;
pub mod importer;
pub mod song_map;

pub use bank::{BankData, BankLayout, BankRange};
pub use imported_module::{ImportedFtModuleInfo, ImportedModuleInfo};
pub use importer::{Importer, RomLayout};
pub use song_map::SongMapInfo;

use std::error::Error;
use std::fmt;

pub type RBoxErr<T> = Result<T, Box<dyn Error>>;

/// Errors the placement engine itself can raise (spec.md §7). I/O failures
/// from `RomAccess` (`RomUnsupported`, `Overflow`, ...) propagate as-is from
/// `rom_import_io::RomIoError` rather than being wrapped again here.
#[derive(Debug, PartialEq, Eq)]
pub enum OpsError {
    /// The packer could not place every module into the engine's banks.
    RomFull,
    /// A secondary map references a Module-backed song but the free primary
    /// slot pool is exhausted.
    OutOfSlots,
    /// `BankLayout` construction received overlapping, inverted, or
    /// out-of-bounds free ranges.
    InvalidLayout,
}

impl fmt::Display for OpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RomFull => write!(f, "not enough free space to place every module"),
            Self::OutOfSlots => write!(f, "no free primary slot remains for a module-backed secondary song"),
            Self::InvalidLayout => write!(f, "bank layout free ranges overlap, invert, or exceed the bank size"),
        }
    }
}

impl Error for OpsError {}
