//! `Importer` (spec.md §4.2-§4.8): the song index map, module-info grouping,
//! the bank packer, and the ROM table writers. This is "the core".

use crate::bank::{BankData, BankLayout, BankRange};
use crate::imported_module::{ImportedFtModuleInfo, ImportedModuleInfo};
use crate::song_map::SongMapInfo;
use crate::OpsError;
use rom_import_io::binary_cursor::BinaryCursor;
use rom_import_io::ftm::FtmBinary;
use rom_import_io::identity::Id;
use rom_import_io::module::Module;
use rom_import_io::rom::RomAccess;
use rom_import_io::song::Song;
use rom_import_io::{RBoxErr, RomIoError};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

/// Remainder size (in bytes) below which a leftover slice of a working free
/// range is discarded rather than re-queued (spec.md §4.4).
pub const DEFAULT_MIN_KEEPABLE_REMAINDER: u16 = 64;

/// The fixed ROM-resident table offsets one engine's import run writes to
/// (spec.md §6). These are game-specific constants, not part of the core
/// algorithm, so they are plain configuration rather than hardcoded values.
#[derive(Debug, Clone, Copy)]
pub struct RomLayout {
    pub song_map_offs: usize,
    pub song_mod_addr_tbl_offs: usize,
    pub num_songs: usize,
    /// Bytes of raw-ROM header preceding bank 0 (spec.md §4.8: "raw ROM
    /// files carry a 16-byte header preceding bank 0").
    pub header_offset: usize,
}

impl RomLayout {
    pub fn new(song_map_offs: usize, song_mod_addr_tbl_offs: usize, num_songs: usize) -> Self {
        Self {
            song_map_offs,
            song_mod_addr_tbl_offs,
            num_songs,
            header_offset: 16,
        }
    }
}

pub struct Importer {
    pub rom_layout: RomLayout,
    pub min_keepable_remainder: u16,
}

impl Importer {
    pub fn new(rom_layout: RomLayout) -> Self {
        Self {
            rom_layout,
            min_keepable_remainder: DEFAULT_MIN_KEEPABLE_REMAINDER,
        }
    }

    pub fn with_min_keepable_remainder(mut self, min_keepable_remainder: u16) -> Self {
        self.min_keepable_remainder = min_keepable_remainder;
        self
    }

    /// spec.md §4.2: assign every primary and secondary-only song a primary
    /// slot index.
    ///
    /// `free_slots` is the caller-supplied pool of primary slots not already
    /// spoken for; slots claimed by an explicit `primary_songs` entry are
    /// removed from it here. Every index a secondary map or `primary_songs`
    /// refers to must be `< primary_songs.len()`.
    pub fn create_song_index_map(
        &self,
        primary_songs: &[Option<Song>],
        secondary_maps: &[(&str, &[Option<Song>])],
        free_slots: &mut BTreeSet<usize>,
    ) -> RBoxErr<(HashMap<Id<Song>, usize>, Vec<Option<Song>>)> {
        let mut song_indices: HashMap<Id<Song>, usize> = HashMap::new();
        let mut song_map: Vec<Option<Song>> = primary_songs.to_vec();

        for (slot, song) in primary_songs.iter().enumerate() {
            if let Some(song) = song {
                song_indices.insert(song.id(), slot);
                free_slots.remove(&slot);
            }
        }

        for (_name, map) in secondary_maps {
            for song in map.iter().flatten() {
                if song_indices.contains_key(&song.id()) {
                    continue;
                }
                if song.is_builtin() {
                    song_indices.insert(song.id(), song.number as usize);
                } else {
                    let slot = free_slots.pop_last().ok_or(OpsError::OutOfSlots)?;
                    song_indices.insert(song.id(), slot);
                    song_map[slot] = Some(song.clone());
                }
            }
        }

        Ok((song_indices, song_map))
    }

    /// spec.md §4.3: group every module-backed song by its module's
    /// identity, returning one `ImportedModuleInfo` per module in first-
    /// encountered order (the order the size-descending sort in
    /// [`Importer::import_engine_modules`] must tie-break against).
    pub fn create_imported_module_infos<B: FtmBinary + 'static>(
        &self,
        song_map: &[Option<Song>],
    ) -> Vec<Box<dyn ImportedModuleInfo>> {
        let mut order: Vec<Id<Module>> = Vec::new();
        let mut by_module: HashMap<Id<Module>, Box<dyn ImportedModuleInfo>> = HashMap::new();

        for (slot, song) in song_map.iter().enumerate() {
            let Some(song) = song else { continue };
            let Some(module) = song.module.clone() else { continue };
            let module_id = module.id();
            let info = by_module.entry(module_id).or_insert_with(|| {
                order.push(module_id);
                Box::new(ImportedFtModuleInfo::<B>::new(module)) as Box<dyn ImportedModuleInfo>
            });
            info.add_song(slot, song.clone());
        }

        order
            .into_iter()
            .map(|id| by_module.remove(&id).expect("every id in `order` was inserted into by_module"))
            .collect()
    }

    /// spec.md §4.4: the best-fit bank packer. Operates on one engine's
    /// infos at a time; `free_banks` and `free_rngs` are shared queues the
    /// caller threads across engines.
    pub fn import_engine_modules(
        &self,
        layout: &Rc<BankLayout>,
        infos: &mut [Box<dyn ImportedModuleInfo>],
        free_banks: &mut VecDeque<usize>,
        free_rngs: &mut VecDeque<BankRange>,
        banks: &mut HashMap<usize, BankData>,
        primary_square_channel: u8,
    ) -> RBoxErr<()> {
        // Sort indices by module size descending; stable so entries of equal
        // size keep their relative (first-encountered) order -- this is the
        // tie-break spec.md §4.4/§8 calls for, and makes the later
        // `partition_point` call return the earliest same-size candidate.
        let mut order: Vec<usize> = (0..infos.len()).collect();
        order.sort_by(|&a, &b| infos[b].size().cmp(&infos[a].size()));

        let mut placed = vec![false; infos.len()];
        let mut unplaced = infos.len();
        let mut new_free_rngs: Vec<BankRange> = Vec::new();

        while unplaced > 0 && (!free_rngs.is_empty() || !free_banks.is_empty()) {
            let range = match free_rngs.pop_front() {
                Some(r) => r,
                None => {
                    let bank_index = free_banks
                        .pop_front()
                        .expect("loop condition guarantees free_banks is non-empty here");
                    for &(start, end) in &layout.free_ranges {
                        free_rngs.push_back(BankRange { bank_index, start, end });
                    }
                    free_rngs
                        .pop_front()
                        .expect("a BankLayout always has at least one free range")
                }
            };

            let mut bytes_left = range.len();
            let base_addr = layout.bank_base_addr + range.start;
            let bank = banks
                .entry(range.bank_index)
                .or_insert_with(|| BankData::new(layout.clone()));

            loop {
                let remaining: Vec<usize> = order.iter().copied().filter(|&i| !placed[i]).collect();
                // Leftmost index whose size fits -- the largest module that
                // still fits `bytes_left` (best-fit), and, among ties, the
                // one appearing earliest in `order`.
                let pos = remaining.partition_point(|&i| infos[i].size() as u16 > bytes_left);
                if pos == remaining.len() {
                    break;
                }

                let idx = remaining[pos];
                let size = infos[idx].size() as u16;
                let rng_offs = bytes_left - size;
                let address = base_addr + rng_offs;

                let data = infos[idx].get_data(address, primary_square_channel)?;
                let start = (range.start + rng_offs) as usize;
                bank.bytes[start..start + size as usize].copy_from_slice(&data);
                infos[idx].place(range.bank_index, address);

                log::debug!(
                    "placed module {:?} in bank {} at {:#06x} ({} bytes)",
                    infos[idx].module().id(),
                    range.bank_index,
                    address,
                    size
                );

                placed[idx] = true;
                unplaced -= 1;
                bytes_left = rng_offs;
            }

            if bytes_left >= self.min_keepable_remainder {
                new_free_rngs.push(BankRange {
                    bank_index: range.bank_index,
                    start: range.start,
                    end: range.start + bytes_left,
                });
            } else if bytes_left > 0 {
                log::trace!(
                    "discarding {bytes_left}-byte remainder in bank {} (below min_keepable_remainder {})",
                    range.bank_index,
                    self.min_keepable_remainder
                );
            }
        }

        if unplaced > 0 {
            log::error!("{unplaced} module(s) could not be placed: ROM full");
            return Err(Box::new(OpsError::RomFull));
        }

        free_rngs.extend(new_free_rngs);
        Ok(())
    }

    /// spec.md §4.6: write the primary song map and its parallel module
    /// address table.
    pub fn write_primary_song_map(
        &self,
        rom: &mut dyn RomAccess,
        song_map: &[Option<Song>],
        infos: &[Box<dyn ImportedModuleInfo>],
    ) -> RBoxErr<()> {
        let by_module: HashMap<Id<Module>, &Box<dyn ImportedModuleInfo>> =
            infos.iter().map(|info| (info.module().id(), info)).collect();

        let mut addr_table = BinaryCursor::zeroed(self.rom_layout.num_songs * 2);

        for slot in 0..self.rom_layout.num_songs {
            let entry_offset = self.rom_layout.song_map_offs + slot * 2;
            let song = song_map.get(slot).and_then(|s| s.as_ref());

            let (bank_byte, song_byte, mod_addr) = match song {
                None => (0u8, 0xFFu8, 0u16),
                Some(song) if song.is_builtin() => {
                    let original = rom.rom()?;
                    let bank_byte = *original.get(entry_offset).ok_or(RomIoError::RangeError)?;
                    let song_byte = *original.get(entry_offset + 1).ok_or(RomIoError::RangeError)?;
                    (bank_byte, song_byte, 0u16)
                }
                Some(song) => {
                    let module_id = song
                        .module
                        .as_ref()
                        .expect("a non-builtin song always carries a module")
                        .id();
                    let info = by_module
                        .get(&module_id)
                        .expect("every module-backed song's module was placed by import_engine_modules");
                    let (bank_byte, song_byte) = info.get_song_map_entry(slot);
                    let mod_addr = info.address().expect("module placed before the table is written");
                    (bank_byte, song_byte, mod_addr)
                }
            };

            rom.write_byte(entry_offset, bank_byte, "primary song map: bank byte")?;
            rom.write_byte(entry_offset + 1, song_byte, "primary song map: song byte")?;
            addr_table.write_u16_le(mod_addr)?;
        }

        rom.write_block(
            self.rom_layout.song_mod_addr_tbl_offs,
            &addr_table.into_inner(),
            "module load address table",
        )?;
        Ok(())
    }

    /// spec.md §4.7: write one secondary map.
    pub fn write_secondary_map(
        &self,
        rom: &mut dyn RomAccess,
        map_info: &SongMapInfo,
        entries: &[Option<Song>],
        song_indices: &HashMap<Id<Song>, usize>,
    ) -> RBoxErr<()> {
        for slot_in_map in 0..map_info.length {
            let byte = match entries.get(slot_in_map).and_then(|s| s.as_ref()) {
                None => map_info.empty_index,
                Some(song) => song_indices
                    .get(&song.id())
                    .map(|&slot| slot as u8)
                    .unwrap_or(map_info.empty_index),
            };
            rom.write_byte(
                map_info.offset + slot_in_map,
                byte,
                &format!("secondary map \"{}\"", map_info.name),
            )?;
        }
        Ok(())
    }

    /// spec.md §4.8: copy preserved ranges back from the original ROM, then
    /// flush every staged bank.
    pub fn finalize_banks(&self, rom: &mut dyn RomAccess, banks: &mut HashMap<usize, BankData>) -> RBoxErr<()> {
        for (&bank_index, bank) in banks.iter_mut() {
            if let Some(source_bank) = bank.layout.source_bank {
                let original = rom.rom()?;
                let source_offset = source_bank * bank.layout.bank_size as usize + self.rom_layout.header_offset;
                for &(start, end) in &bank.layout.copy_ranges {
                    let src = &original[source_offset + start as usize..source_offset + end as usize];
                    bank.bytes[start as usize..end as usize].copy_from_slice(src);
                }
            }

            let rom_offset = bank_index * bank.layout.bank_size as usize + self.rom_layout.header_offset;
            rom.write_block(rom_offset, &bank.bytes, &format!("bank {bank_index}"))?;
        }
        Ok(())
    }

    /// End-to-end single-engine import (spec.md §2 "Data flow"): build the
    /// index map, group modules, pack them into `layout`'s banks, then write
    /// the primary map, every secondary map, and the finalized banks.
    #[allow(clippy::too_many_arguments)]
    pub fn import<B: FtmBinary + 'static>(
        &self,
        rom: &mut dyn RomAccess,
        primary_songs: &[Option<Song>],
        secondary_maps: &[(SongMapInfo, &[Option<Song>])],
        mut free_slots: BTreeSet<usize>,
        layout: Rc<BankLayout>,
        mut free_banks: VecDeque<usize>,
        primary_square_channel: u8,
    ) -> RBoxErr<()> {
        let secondary_for_index: Vec<(&str, &[Option<Song>])> =
            secondary_maps.iter().map(|(info, map)| (info.name.as_str(), *map)).collect();

        log::debug!("building song index map");
        let (song_indices, song_map) =
            self.create_song_index_map(primary_songs, &secondary_for_index, &mut free_slots)?;

        log::debug!("grouping imported songs by module");
        let mut infos = self.create_imported_module_infos::<B>(&song_map);

        log::debug!("packing {} module(s) into {} bank(s)", infos.len(), free_banks.len());
        let mut free_rngs: VecDeque<BankRange> = VecDeque::new();
        let mut banks: HashMap<usize, BankData> = HashMap::new();
        self.import_engine_modules(
            &layout,
            &mut infos,
            &mut free_banks,
            &mut free_rngs,
            &mut banks,
            primary_square_channel,
        )?;

        log::debug!("writing primary song map");
        self.write_primary_song_map(rom, &song_map, &infos)?;

        for (map_info, entries) in secondary_maps {
            log::debug!("writing secondary map \"{}\"", map_info.name);
            self.write_secondary_map(rom, map_info, entries, &song_indices)?;
        }

        log::debug!("finalizing {} staged bank(s)", banks.len());
        self.finalize_banks(rom, &mut banks)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rom_import_io::ftm::SimpleFtmBinary;
    use rom_import_io::module::Module;
    use rom_import_io::rom::VecRom;
    use std::collections::HashSet;

    fn rom_layout() -> RomLayout {
        RomLayout::new(0x2000, 0x2100, 16)
    }

    #[test]
    fn empty_pool_writes_null_entry_and_zero_address() {
        let importer = Importer::new(rom_layout());
        let mut rom = VecRom::new(vec![0u8; 0x3000]);
        let song_map: Vec<Option<Song>> = vec![None; 16];
        let infos: Vec<Box<dyn ImportedModuleInfo>> = Vec::new();

        importer.write_primary_song_map(&mut rom, &song_map, &infos).unwrap();

        let snapshot = rom.rom().unwrap();
        assert_eq!(&snapshot[0x2000..0x2002], &[0x00, 0xFF]);
        assert_eq!(&snapshot[0x2100..0x2102], &[0x00, 0x00]);
    }

    #[test]
    fn single_module_is_placed_at_high_end_and_mapped() {
        let importer = Importer::new(rom_layout());
        let mut rom = VecRom::new(vec![0u8; 0x3000]);

        let module = Rc::new(Module::new("ft", "Theme", 0x8001, vec![0u8; 0x100]));
        let song = Song::new(0, Some(module.clone()), true, true, 0, HashSet::new(), "Theme", "");
        let mut song_map: Vec<Option<Song>> = vec![None; 16];
        song_map[7] = Some(song);

        let mut infos = importer.create_imported_module_infos::<SimpleFtmBinary>(&song_map);
        let layout = Rc::new(BankLayout::new(0x8000, 0x2000, vec![], None).unwrap());
        let mut free_banks: VecDeque<usize> = VecDeque::from([0]);
        let mut free_rngs: VecDeque<BankRange> = VecDeque::new();
        let mut banks: HashMap<usize, BankData> = HashMap::new();

        importer
            .import_engine_modules(&layout, &mut infos, &mut free_banks, &mut free_rngs, &mut banks, 0)
            .unwrap();

        assert_eq!(infos[0].bank(), Some(0));
        assert_eq!(infos[0].address(), Some(0x9F00));

        importer.write_primary_song_map(&mut rom, &song_map, &infos).unwrap();
        let snapshot = rom.rom().unwrap();
        assert_eq!(&snapshot[0x2000 + 14..0x2000 + 16], &[0xFF, 0x00]);
        assert_eq!(&snapshot[0x2100 + 14..0x2100 + 16], &[0x00, 0x9F]);
    }

    #[test]
    fn best_fit_places_largest_first_at_high_offsets() {
        let importer = Importer::new(rom_layout());
        let sizes = [0x1800usize, 0x0400, 0x0300];
        let mut song_map: Vec<Option<Song>> = vec![None; 16];
        for (slot, &size) in sizes.iter().enumerate() {
            let module = Rc::new(Module::new("ft", "M", 0x8000, vec![0u8; size]));
            let song = Song::new(0, Some(module), true, true, 0, HashSet::new(), "M", "");
            song_map[slot] = Some(song);
        }

        let mut infos = importer.create_imported_module_infos::<SimpleFtmBinary>(&song_map);
        let layout = Rc::new(BankLayout::new(0x8000, 0x2000, vec![], None).unwrap());
        let mut free_banks: VecDeque<usize> = VecDeque::from([0]);
        let mut free_rngs: VecDeque<BankRange> = VecDeque::new();
        let mut banks: HashMap<usize, BankData> = HashMap::new();

        importer
            .import_engine_modules(&layout, &mut infos, &mut free_banks, &mut free_rngs, &mut banks, 0)
            .unwrap();

        let mut addresses: Vec<u16> = infos.iter().map(|i| i.address().unwrap()).collect();
        addresses.sort();
        assert_eq!(addresses, vec![0x8100, 0x8400, 0x8800]);

        // the 0x100-byte remainder was kept (>= default min_keepable_remainder)
        assert_eq!(free_rngs.len(), 1);
        assert_eq!(free_rngs[0], BankRange { bank_index: 0, start: 0, end: 0x100 });
    }

    #[test]
    fn rom_full_when_modules_outgrow_available_space() {
        let importer = Importer::new(rom_layout());
        let module = Rc::new(Module::new("ft", "Big", 0x8000, vec![0u8; 0x3000]));
        let song = Song::new(0, Some(module), true, true, 0, HashSet::new(), "Big", "");
        let mut song_map: Vec<Option<Song>> = vec![None; 16];
        song_map[0] = Some(song);

        let mut infos = importer.create_imported_module_infos::<SimpleFtmBinary>(&song_map);
        let layout = Rc::new(BankLayout::new(0x8000, 0x2000, vec![], None).unwrap());
        let mut free_banks: VecDeque<usize> = VecDeque::from([0]);
        let mut free_rngs: VecDeque<BankRange> = VecDeque::new();
        let mut banks: HashMap<usize, BankData> = HashMap::new();

        let result =
            importer.import_engine_modules(&layout, &mut infos, &mut free_banks, &mut free_rngs, &mut banks, 0);
        assert!(result.is_err());
    }

    #[test]
    fn secondary_map_resolves_to_primary_slots() {
        let importer = Importer::new(rom_layout());
        let mut rom = VecRom::new(vec![0u8; 0x6000]);

        let module = Rc::new(Module::new("ft", "M", 0x8000, vec![0u8; 0x10]));
        let song_a = Song::new(0, Some(module.clone()), true, true, 0, HashSet::new(), "A", "");
        let song_b = Song::new(1, Some(module.clone()), true, true, 0, HashSet::new(), "B", "");

        let mut primary_songs: Vec<Option<Song>> = vec![None; 16];
        primary_songs[3] = Some(song_a.clone());
        primary_songs[5] = Some(song_b.clone());

        let boss = vec![Some(song_a.clone()), None, Some(song_b.clone()), Some(song_a.clone())];
        let map_info = SongMapInfo::new("boss", 0x5000, 4);

        let mut free_slots: BTreeSet<usize> = (0..16).collect();
        let secondary: Vec<(&str, &[Option<Song>])> = vec![("boss", &boss)];
        let (song_indices, _song_map) = importer
            .create_song_index_map(&primary_songs, &secondary, &mut free_slots)
            .unwrap();

        importer
            .write_secondary_map(&mut rom, &map_info, &boss, &song_indices)
            .unwrap();

        let snapshot = rom.rom().unwrap();
        assert_eq!(&snapshot[0x5000..0x5004], &[0x03, 0xFF, 0x05, 0x03]);
    }

    #[test]
    fn out_of_slots_when_free_pool_is_exhausted() {
        let importer = Importer::new(rom_layout());
        let module = Rc::new(Module::new("ft", "M", 0x8000, vec![0u8; 0x10]));
        let song = Song::new(0, Some(module), true, true, 0, HashSet::new(), "Only", "");

        let primary_songs: Vec<Option<Song>> = vec![None; 16];
        let secondary_entries = vec![Some(song)];
        let secondary: Vec<(&str, &[Option<Song>])> = vec![("x", &secondary_entries)];
        let mut free_slots: BTreeSet<usize> = BTreeSet::new(); // empty pool

        let result = importer.create_song_index_map(&primary_songs, &secondary, &mut free_slots);
        assert!(result.is_err());
    }

    #[test]
    fn finalize_banks_preserves_copy_ranges() {
        let importer = Importer::new(rom_layout());
        let mut original = vec![0u8; 16 + 0x2000];
        for (i, b) in original.iter_mut().enumerate().skip(16) {
            *b = (i % 251) as u8;
        }
        let mut rom = VecRom::new(original.clone());

        let layout = Rc::new(BankLayout::new(0x8000, 0x2000, vec![(0x100, 0x1000)], Some(0)).unwrap());
        let mut bank = BankData::new(layout.clone());
        bank.bytes[0x100..0x300].copy_from_slice(&[0xAB; 0x200]);
        let mut banks = HashMap::from([(0usize, bank)]);

        importer.finalize_banks(&mut rom, &mut banks).unwrap();

        let snapshot = rom.rom().unwrap();
        let original_bank = &original[16..16 + 0x2000];
        let written_bank = &snapshot[16..16 + 0x2000];
        assert_eq!(&written_bank[0..0x100], &original_bank[0..0x100]);
        assert_eq!(&written_bank[0x1000..0x2000], &original_bank[0x1000..0x2000]);
        assert_eq!(&written_bank[0x100..0x300], &[0xAB; 0x200]);
    }
}
