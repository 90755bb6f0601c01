//! The `import` command's run configuration and the glue that turns it, plus
//! a parsed library, into a call to `rom_import_ops::Importer::import`.
//!
//! Per spec.md §1 "CLI glue" is named as an out-of-scope external
//! collaborator -- this module stays a thin translation layer: YAML in,
//! `Importer::import` call out. It does not implement any placement logic
//! itself.

use rom_import_io::library::{parse_library_json, ResolvedLibrary};
use rom_import_io::rom::FileRom;
use rom_import_io::song::Song;
use rom_import_io::RBoxErr;
use rom_import_ops::{BankLayout, Importer, RomLayout, SongMapInfo};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// The on-disk YAML run configuration: everything `Importer::import` needs
/// besides the library itself, plus the song-assignment maps expressed as
/// human-readable references into that library.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub rom_layout: RomLayoutConfig,
    pub bank_layout: BankLayoutConfig,
    #[serde(default)]
    pub free_banks: Vec<usize>,
    #[serde(default)]
    pub free_slots: Vec<usize>,
    #[serde(default)]
    pub primary_square_channel: u8,
    pub primary: Vec<Option<String>>,
    #[serde(default)]
    pub secondary: Vec<SecondaryMapConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RomLayoutConfig {
    pub song_map_offs: usize,
    pub song_mod_addr_tbl_offs: usize,
    pub num_songs: usize,
}

#[derive(Debug, Deserialize)]
pub struct BankLayoutConfig {
    pub bank_base_addr: u16,
    pub bank_size: u16,
    #[serde(default)]
    pub free_ranges: Vec<(u16, u16)>,
    pub source_bank: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SecondaryMapConfig {
    pub name: String,
    pub offset: usize,
    pub length: usize,
    pub empty_index: Option<u8>,
    #[serde(default)]
    pub entries: Vec<Option<String>>,
}

/// A song reference as written in `primary`/`secondary[].entries`:
///
/// - `null` / absent -- an empty slot.
/// - `"builtin:<n>"` -- a ROM-resident song already at slot/number `n`.
/// - `"<title>"` or `"<title>#<number>"` -- a library song, looked up by
///   title (and, for multi-song files, by song number).
fn resolve_song_ref(raw: &str, by_title: &HashMap<String, Vec<Song>>) -> RBoxErr<Song> {
    if let Some(number) = raw.strip_prefix("builtin:") {
        let number: u8 = number.parse().map_err(|_| format!("bad builtin reference {raw:?}"))?;
        return Ok(Song::new(number, None, true, true, 0, Default::default(), format!("builtin {number}"), ""));
    }

    let (title, number) = match raw.split_once('#') {
        Some((title, n)) => (title, Some(n.parse::<u8>().map_err(|_| format!("bad song number in {raw:?}"))?)),
        None => (raw, None),
    };

    let candidates = by_title
        .get(title)
        .ok_or_else(|| format!("no library song titled {title:?}"))?;

    let song = match number {
        Some(number) => candidates.iter().find(|s| s.number == number),
        None => candidates.first(),
    }
    .ok_or_else(|| format!("no song matching {raw:?}"))?;

    Ok(song.clone())
}

fn index_by_title(library: &ResolvedLibrary) -> HashMap<String, Vec<Song>> {
    let mut by_title: HashMap<String, Vec<Song>> = HashMap::new();
    let files = library.singles.iter().chain(library.groups.iter().flat_map(|g| g.files.iter()));
    for file in files {
        for song in &file.songs {
            by_title.entry(song.title.clone()).or_default().push(song.clone());
        }
    }
    by_title
}

fn resolve_slots(
    raw: &[Option<String>],
    by_title: &HashMap<String, Vec<Song>>,
) -> RBoxErr<Vec<Option<Song>>> {
    raw.iter()
        .map(|slot| slot.as_deref().map(|r| resolve_song_ref(r, by_title)).transpose())
        .collect()
}

/// Run one import: load the library, resolve the configured song
/// assignments against it, and hand everything to `Importer::import`.
pub fn run_import(library_path: &Path, rom_path: &Path, config_path: &Path) -> RBoxErr<()> {
    log::info!("loading library from {}", library_path.display());
    let library_json = fs::read_to_string(library_path)?;
    let library = parse_library_json(&library_json)?.resolve()?;
    let by_title = index_by_title(&library);

    log::info!("loading run config from {}", config_path.display());
    let config_yaml = fs::read_to_string(config_path)?;
    let config: RunConfig = serde_yml::from_str(&config_yaml)?;

    let primary_songs = resolve_slots(&config.primary, &by_title)?;
    let secondary_maps: Vec<(SongMapInfo, Vec<Option<Song>>)> = config
        .secondary
        .iter()
        .map(|m| {
            let info = SongMapInfo::new(m.name.clone(), m.offset, m.length)
                .with_empty_index(m.empty_index.unwrap_or(0xFF));
            resolve_slots(&m.entries, &by_title).map(|entries| (info, entries))
        })
        .collect::<RBoxErr<_>>()?;
    let secondary_refs: Vec<(SongMapInfo, &[Option<Song>])> =
        secondary_maps.iter().map(|(info, entries)| (info.clone(), entries.as_slice())).collect();

    let bank_layout = Rc::new(BankLayout::new(
        config.bank_layout.bank_base_addr,
        config.bank_layout.bank_size,
        config.bank_layout.free_ranges.clone(),
        config.bank_layout.source_bank,
    )?);

    let rom_layout = RomLayout::new(
        config.rom_layout.song_map_offs,
        config.rom_layout.song_mod_addr_tbl_offs,
        config.rom_layout.num_songs,
    );
    let importer = Importer::new(rom_layout);

    log::info!("opening ROM at {}", rom_path.display());
    let mut rom = FileRom::open(rom_path)?;

    importer.import::<rom_import_io::ftm::SimpleFtmBinary>(
        &mut rom,
        &primary_songs,
        &secondary_refs,
        config.free_slots.into_iter().collect::<BTreeSet<_>>(),
        bank_layout,
        config.free_banks.into_iter().collect::<VecDeque<_>>(),
        config.primary_square_channel,
    )?;

    log::info!("import complete");
    Ok(())
}
