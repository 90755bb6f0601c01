//! `ImportedModuleInfo` (spec.md §3, §4.5) -- the mutable per-import
//! placement record for one `Module`, plus the FamiTracker variant that
//! drives rebase + channel swap through the `FtmBinary` contract.

use rom_import_io::ftm::FtmBinary;
use rom_import_io::identity::Id;
use rom_import_io::module::Module;
use rom_import_io::song::Song;
use rom_import_io::RBoxErr;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

/// Both audio channels are wrapped into every `FtmBinary`; which one carries
/// the melody is a per-song property (`Song::primary_square_channel`), not a
/// property of the channel count itself.
const SQUARE_CHANNEL_COUNT: u8 = 2;

/// One engine's placement record for a `Module`. Implementations other than
/// [`ImportedFtModuleInfo`] would exist for other engines (spec.md §9
/// "closed set of variants"); this workspace implements the one engine the
/// spec names (`ft`).
pub trait ImportedModuleInfo {
    fn module(&self) -> &Rc<Module>;
    fn bank(&self) -> Option<usize>;
    fn address(&self) -> Option<u16>;

    /// Record the bank/address the packer chose for this module.
    fn place(&mut self, bank: usize, address: u16);

    /// Record that `song` (which must live in this info's module) occupies
    /// primary slot `primary_slot`.
    fn add_song(&mut self, primary_slot: usize, song: Song);

    /// Primary slot -> module-internal song number, for every imported song
    /// in this module.
    fn song_indices(&self) -> &HashMap<usize, u8>;

    /// Produce the final byte image for this module once placed at
    /// `address`, rewriting channel assignments so every imported song's
    /// melody plays on `primary_square_channel`.
    fn get_data(&self, address: u16, primary_square_channel: u8) -> RBoxErr<Vec<u8>>;

    /// `(bank_byte, song_byte)` for the primary song map entry at
    /// `primary_slot`. Must only be called once placed.
    fn get_song_map_entry(&self, primary_slot: usize) -> (u8, u8);

    fn size(&self) -> usize {
        self.module().size()
    }
}

/// The FamiTracker engine's `ImportedModuleInfo`, parameterized over the
/// `FtmBinary` mutator it drives.
pub struct ImportedFtModuleInfo<B> {
    module: Rc<Module>,
    songs: HashMap<Id<Song>, Song>,
    bank: Option<usize>,
    address: Option<u16>,
    song_indices: HashMap<usize, u8>,
    _binary: PhantomData<B>,
}

impl<B> ImportedFtModuleInfo<B> {
    pub fn new(module: Rc<Module>) -> Self {
        Self {
            module,
            songs: HashMap::new(),
            bank: None,
            address: None,
            song_indices: HashMap::new(),
            _binary: PhantomData,
        }
    }
}

impl<B: FtmBinary> ImportedModuleInfo for ImportedFtModuleInfo<B> {
    fn module(&self) -> &Rc<Module> {
        &self.module
    }

    fn bank(&self) -> Option<usize> {
        self.bank
    }

    fn address(&self) -> Option<u16> {
        self.address
    }

    fn place(&mut self, bank: usize, address: u16) {
        self.bank = Some(bank);
        self.address = Some(address);
    }

    fn add_song(&mut self, primary_slot: usize, song: Song) {
        self.song_indices.insert(primary_slot, song.number);
        self.songs.insert(song.id(), song);
    }

    fn song_indices(&self) -> &HashMap<usize, u8> {
        &self.song_indices
    }

    fn get_data(&self, address: u16, primary_square_channel: u8) -> RBoxErr<Vec<u8>> {
        let mut binary = B::wrap(
            self.module.raw_bytes.clone(),
            self.module.base_address,
            SQUARE_CHANNEL_COUNT,
        );

        for song in self.songs.values() {
            if song.primary_square_channel != primary_square_channel {
                binary.swap_square_channels(song.number);
            }
        }

        if address != self.module.base_address {
            binary.rebase(address);
        }

        Ok(binary.into_bytes())
    }

    fn get_song_map_entry(&self, primary_slot: usize) -> (u8, u8) {
        let bank = self
            .bank
            .expect("get_song_map_entry called before the module was placed");
        let song_number = *self
            .song_indices
            .get(&primary_slot)
            .expect("primary_slot was never recorded via add_song");
        ((bank as u8) ^ 0xFF, song_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rom_import_io::ftm::SimpleFtmBinary;
    use std::collections::HashSet;

    fn module(base_address: u16, bytes: Vec<u8>) -> Rc<Module> {
        Rc::new(Module::new("ft", "Test Module", base_address, bytes))
    }

    #[test]
    fn get_data_preserves_length_when_unplaced_and_unchanged_channel() {
        let m = module(0x8001, vec![0u8; 0x100]);
        let mut info = ImportedFtModuleInfo::<SimpleFtmBinary>::new(m.clone());
        let song = Song::new(0, Some(m.clone()), true, true, 0, HashSet::new(), "A", "");
        info.add_song(7, song);

        let data = info.get_data(m.base_address, 0).unwrap();
        assert_eq!(data.len(), m.raw_bytes.len());
    }

    #[test]
    fn get_data_swaps_channel_when_song_disagrees_with_target() {
        let mut bytes = vec![0u8; 8];
        bytes[0] = 0; // song 0's channel descriptor byte, bit 0 clear
        let m = module(0x8000, bytes);
        let mut info = ImportedFtModuleInfo::<SimpleFtmBinary>::new(m.clone());
        let song = Song::new(0, Some(m.clone()), true, true, 1, HashSet::new(), "A", "");
        info.add_song(7, song);

        // target importer channel (0) differs from the song's own (1) -> swap.
        let data = info.get_data(m.base_address, 0).unwrap();
        assert_eq!(data[0] & 0x01, 1);
    }

    #[test]
    fn get_data_does_not_mutate_raw_bytes() {
        let m = module(0x8000, vec![0xAA; 4]);
        let mut info = ImportedFtModuleInfo::<SimpleFtmBinary>::new(m.clone());
        let song = Song::new(0, Some(m.clone()), true, true, 0, HashSet::new(), "A", "");
        info.add_song(7, song);

        let _ = info.get_data(0x9000, 1).unwrap();
        assert_eq!(m.raw_bytes, vec![0xAA; 4]);
    }

    #[test]
    fn song_map_entry_xors_bank_with_0xff() {
        let m = module(0x8000, vec![0u8; 4]);
        let mut info = ImportedFtModuleInfo::<SimpleFtmBinary>::new(m.clone());
        let song = Song::new(3, Some(m.clone()), true, true, 0, HashSet::new(), "A", "");
        info.add_song(7, song);
        info.place(0, 0x9F00);

        assert_eq!(info.get_song_map_entry(7), (0xFF, 3));
    }
}
