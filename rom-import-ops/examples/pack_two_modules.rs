//! Packs two small FamiTracker-style modules into one bank of an in-memory
//! ROM and prints where each landed.

use rom_import_io::ftm::SimpleFtmBinary;
use rom_import_io::module::Module;
use rom_import_io::rom::VecRom;
use rom_import_io::song::Song;
use rom_import_ops::{BankLayout, Importer, RomLayout};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::rc::Rc;

fn main() {
    let theme = Rc::new(Module::new("ft", "Overworld Theme", 0x8001, vec![0u8; 0x1800]));
    let boss = Rc::new(Module::new("ft", "Boss Theme", 0x8001, vec![0u8; 0x0400]));

    let mut primary_songs = vec![None; 16];
    primary_songs[3] = Some(Song::new(0, Some(theme), true, true, 0, HashSet::new(), "Overworld Theme", "Composer A"));
    primary_songs[7] = Some(Song::new(0, Some(boss), true, true, 0, HashSet::new(), "Boss Theme", "Composer B"));

    let rom_layout = RomLayout::new(0x2000, 0x2100, 16);
    let importer = Importer::new(rom_layout);

    let bank_layout = Rc::new(BankLayout::new(0x8000, 0x2000, vec![], None).unwrap());
    let mut rom = VecRom::new(vec![0u8; 0x4010]);

    importer
        .import::<SimpleFtmBinary>(
            &mut rom,
            &primary_songs,
            &[],
            BTreeSet::new(),
            bank_layout,
            VecDeque::from([0]),
            0,
        )
        .unwrap();

    let snapshot = rom.rom().unwrap();
    for slot in [3usize, 7] {
        let entry_offset = 0x2000 + slot * 2;
        let addr_offset = 0x2100 + slot * 2;
        let bank_byte = snapshot[entry_offset];
        let song_byte = snapshot[entry_offset + 1];
        let address = u16::from_le_bytes([snapshot[addr_offset], snapshot[addr_offset + 1]]);
        println!("slot {slot}: bank_byte={bank_byte:#04x} song_byte={song_byte} address={address:#06x}");
    }
}
