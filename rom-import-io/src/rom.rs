//! The ROM Access contract (spec.md §6) and two concrete implementations.
//!
//! The contract itself is an external collaborator per spec.md §1 -- the
//! core only ever depends on the `RomAccess` trait. `VecRom` and `FileRom`
//! are simple stand-ins so the rest of the workspace is actually runnable:
//! `VecRom` backs essentially every test in `rom-import-ops`, and `FileRom`
//! gives `rom-import-cli` something real to write to.

use crate::{RBoxErr, RomIoError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Three-method ROM read/write contract (spec.md §6).
pub trait RomAccess {
    /// A full snapshot of the ROM, reflecting every prior write. Fails with
    /// [`RomIoError::RomUnsupported`] if this implementation cannot produce
    /// one.
    fn rom(&self) -> RBoxErr<Vec<u8>>;

    /// Write a single byte at `offset`. `comment` is an advisory annotation
    /// only, carried for debugging/traceability.
    fn write_byte(&mut self, offset: usize, value: u8, comment: &str) -> RBoxErr<()>;

    /// Write `bytes` starting at `offset`. Fails if
    /// `offset + bytes.len() > rom_size`.
    fn write_block(&mut self, offset: usize, bytes: &[u8], comment: &str) -> RBoxErr<()>;
}

/// An in-memory `RomAccess`, backed by a plain `Vec<u8>`. Always supports
/// `rom()`.
#[derive(Debug, Clone)]
pub struct VecRom {
    bytes: Vec<u8>,
}

impl VecRom {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl RomAccess for VecRom {
    fn rom(&self) -> RBoxErr<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn write_byte(&mut self, offset: usize, value: u8, comment: &str) -> RBoxErr<()> {
        let slot = self.bytes.get_mut(offset).ok_or(RomIoError::Overflow)?;
        log::debug!("write_byte @ {offset:#06x} = {value:#04x} ({comment})");
        *slot = value;
        Ok(())
    }

    fn write_block(&mut self, offset: usize, bytes: &[u8], comment: &str) -> RBoxErr<()> {
        if offset + bytes.len() > self.bytes.len() {
            return Err(Box::new(RomIoError::Overflow));
        }
        log::debug!(
            "write_block @ {offset:#06x} len={} ({comment})",
            bytes.len()
        );
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// A disk-backed `RomAccess` over a real ROM file. Supports `rom()` by
/// reading the whole file back; every write goes straight to disk.
pub struct FileRom {
    path: PathBuf,
    file: File,
    size: usize,
}

impl FileRom {
    /// Open an existing ROM file for read/write access.
    pub fn open(path: impl AsRef<Path>) -> RBoxErr<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = file.metadata()?.len() as usize;
        Ok(Self { path, file, size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RomAccess for FileRom {
    fn rom(&self) -> RBoxErr<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let mut bytes = Vec::with_capacity(self.size);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn write_byte(&mut self, offset: usize, value: u8, comment: &str) -> RBoxErr<()> {
        if offset >= self.size {
            return Err(Box::new(RomIoError::Overflow));
        }
        log::debug!("write_byte @ {offset:#06x} = {value:#04x} ({comment})");
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&[value])?;
        Ok(())
    }

    fn write_block(&mut self, offset: usize, bytes: &[u8], comment: &str) -> RBoxErr<()> {
        if offset + bytes.len() > self.size {
            return Err(Box::new(RomIoError::Overflow));
        }
        log::debug!(
            "write_block @ {offset:#06x} len={} ({comment})",
            bytes.len()
        );
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(bytes)?;
        Ok(())
    }
}

/// A `RomAccess` that always reports [`RomIoError::RomUnsupported`] from
/// `rom()`. Useful for exercising the "builtin songs / `source_bank` are
/// unusable without readback" policy from spec.md §7.
#[derive(Debug, Default, Clone)]
pub struct WriteOnlyRom {
    bytes: Vec<u8>,
}

impl WriteOnlyRom {
    pub fn new(size: usize) -> Self {
        Self { bytes: vec![0u8; size] }
    }
}

impl RomAccess for WriteOnlyRom {
    fn rom(&self) -> RBoxErr<Vec<u8>> {
        Err(Box::new(RomIoError::RomUnsupported))
    }

    fn write_byte(&mut self, offset: usize, value: u8, _comment: &str) -> RBoxErr<()> {
        let slot = self.bytes.get_mut(offset).ok_or(RomIoError::Overflow)?;
        *slot = value;
        Ok(())
    }

    fn write_block(&mut self, offset: usize, bytes: &[u8], _comment: &str) -> RBoxErr<()> {
        if offset + bytes.len() > self.bytes.len() {
            return Err(Box::new(RomIoError::Overflow));
        }
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_rom_round_trips_writes() {
        let mut rom = VecRom::new(vec![0u8; 16]);
        rom.write_byte(4, 0xAB, "test").unwrap();
        rom.write_block(8, &[1, 2, 3], "test block").unwrap();
        let snapshot = rom.rom().unwrap();
        assert_eq!(snapshot[4], 0xAB);
        assert_eq!(&snapshot[8..11], &[1, 2, 3]);
    }

    #[test]
    fn vec_rom_write_block_overflow() {
        let mut rom = VecRom::new(vec![0u8; 4]);
        assert!(rom.write_block(2, &[1, 2, 3], "oops").is_err());
    }

    #[test]
    fn write_only_rom_rejects_readback() {
        let rom = WriteOnlyRom::new(16);
        assert!(rom.rom().is_err());
    }
}
