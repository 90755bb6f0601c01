//! The Library JSON contract (spec.md §3, §6) and its resolution into the
//! `Module`/`Song` data model.
//!
//! JSON parsing and base64/deflate payload decoding are external-collaborator
//! concerns per spec.md §1 ("just a deserialization step feeding the data
//! model" / "pre-core") -- they live here as plumbing around the core, the
//! same way `ot-tools-io`'s `yaml_file_to_type`/`json_file_to_type` helpers
//! sit alongside (not inside) `ot-tools-ops`'s actual operations.

use crate::ci_string::CiString;
use crate::module::Module;
use crate::song::Song;
use crate::{RBoxErr, RomIoError};
use base64ct::{Base64, Encoding};
use flate2::read::DeflateDecoder;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::io::Read;
use std::rc::Rc;

/// Root of the Library JSON contract: `{ "single": [...], "groups": [...] }`.
#[derive(Debug, Deserialize)]
pub struct LibraryJson {
    #[serde(rename = "single", default)]
    pub singles: Vec<FileInfoJson>,
    #[serde(default)]
    pub groups: Vec<GroupInfoJson>,
}

#[derive(Debug, Deserialize)]
pub struct GroupInfoJson {
    pub title: String,
    pub enabled: Option<bool>,
    pub streaming_safe: Option<bool>,
    pub primary_square_chan: Option<u8>,
    pub uses: Option<Vec<String>>,
    pub items: Vec<FileInfoJson>,
}

#[derive(Debug, Deserialize)]
pub struct FileInfoJson {
    pub title: String,
    pub author: Option<String>,
    pub enabled: Option<bool>,
    pub streaming_safe: Option<bool>,
    pub primary_square_chan: Option<u8>,
    pub uses: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_start_addr")]
    pub start_addr: Option<u16>,
    pub data: String,
    #[serde(default)]
    pub songs: Vec<SongInfoJson>,
}

#[derive(Debug, Deserialize)]
pub struct SongInfoJson {
    pub number: u8,
    pub title: String,
    pub author: Option<String>,
    pub enabled: Option<bool>,
    pub streaming_safe: Option<bool>,
    pub primary_square_chan: Option<u8>,
    pub uses: Option<Vec<String>>,
}

fn deserialize_start_addr<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Int(u64),
        Str(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Int(n)) => Ok(Some(n as u16)),
        Some(Repr::Str(s)) => {
            let trimmed = s.trim_start_matches("0x").trim_start_matches("0X");
            u16::from_str_radix(trimmed, 16)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(RomIoError::InvalidHexAddress))
        }
    }
}

/// Parse a Library JSON document. This is the "JSON library parsing"
/// external collaborator contract (spec.md §1) -- everything past this point
/// is plain data.
pub fn parse_library_json(json: &str) -> RBoxErr<LibraryJson> {
    Ok(serde_json::from_str(json)?)
}

/// Decode a `data` field: base64, with an optional `"deflate:"` prefix
/// indicating the decoded bytes are themselves raw-deflate compressed.
pub fn decode_payload(data: &str) -> RBoxErr<Vec<u8>> {
    let (is_deflated, payload) = match data.strip_prefix("deflate:") {
        Some(rest) => (true, rest),
        None => (false, data),
    };

    let raw = Base64::decode_vec(payload).map_err(|_| RomIoError::InvalidBase64)?;

    if !is_deflated {
        return Ok(raw);
    }

    let mut decoder = DeflateDecoder::new(&raw[..]);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| RomIoError::InvalidDeflate)?;
    Ok(out)
}

/// Resolved output of loading a library: every module loaded as bytes, paired
/// with the song(s) that live inside it, with every optional field's
/// inheritance chain (song -> file -> group -> default) already resolved.
#[derive(Debug)]
pub struct ResolvedFile {
    pub module: Rc<Module>,
    pub songs: Vec<Song>,
}

#[derive(Debug, Default)]
pub struct ResolvedLibrary {
    pub singles: Vec<ResolvedFile>,
    pub groups: Vec<ResolvedGroup>,
}

#[derive(Debug)]
pub struct ResolvedGroup {
    pub title: String,
    pub files: Vec<ResolvedFile>,
}

/// Per-song optional-field inheritance chain: song-level value, else
/// file-level, else group-level, else a default (spec.md §3).
fn resolve_bool(song: Option<bool>, file: Option<bool>, group: Option<bool>, default: bool) -> bool {
    song.or(file).or(group).unwrap_or(default)
}

fn resolve_u8(song: Option<u8>, file: Option<u8>, group: Option<u8>, default: u8) -> u8 {
    song.or(file).or(group).unwrap_or(default)
}

fn resolve_uses(song: &Option<Vec<String>>, file: &Option<Vec<String>>, group: &Option<Vec<String>>) -> HashSet<CiString> {
    song.as_ref()
        .or(file.as_ref())
        .or(group.as_ref())
        .map(|tags| tags.iter().map(|t| CiString::new(t.clone())).collect())
        .unwrap_or_default()
}

impl LibraryJson {
    /// Decode every file's payload and resolve every song's inherited
    /// fields, producing plain `Module`/`Song` values.
    pub fn resolve(&self) -> RBoxErr<ResolvedLibrary> {
        let mut singles = Vec::with_capacity(self.singles.len());
        for file in &self.singles {
            singles.push(resolve_file(file, None)?);
        }

        let mut groups = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut files = Vec::with_capacity(group.items.len());
            for file in &group.items {
                files.push(resolve_file(file, Some(group))?);
            }
            groups.push(ResolvedGroup { title: group.title.clone(), files });
        }

        Ok(ResolvedLibrary { singles, groups })
    }
}

fn resolve_file(file: &FileInfoJson, group: Option<&GroupInfoJson>) -> RBoxErr<ResolvedFile> {
    let raw_bytes = decode_payload(&file.data)?;
    let base_address = file.start_addr.unwrap_or(0);
    let module = Rc::new(Module::new("ft", file.title.clone(), base_address, raw_bytes));

    let songs = if file.songs.is_empty() {
        let enabled = resolve_bool(file.enabled, group.and_then(|g| g.enabled), None, true);
        let streaming_safe = resolve_bool(file.streaming_safe, group.and_then(|g| g.streaming_safe), None, false);
        let primary_square_channel =
            resolve_u8(file.primary_square_chan, group.and_then(|g| g.primary_square_chan), None, 0);
        let uses = resolve_uses(&file.uses, &group.map(|g| g.uses.clone()).unwrap_or(None), &None);
        let author = file.author.clone().unwrap_or_default();

        vec![Song::new(
            0,
            Some(module.clone()),
            enabled,
            streaming_safe,
            primary_square_channel,
            uses,
            file.title.clone(),
            author,
        )]
    } else {
        file.songs
            .iter()
            .map(|song_info| {
                let enabled = resolve_bool(song_info.enabled, file.enabled, group.and_then(|g| g.enabled), true);
                let streaming_safe = resolve_bool(
                    song_info.streaming_safe,
                    file.streaming_safe,
                    group.and_then(|g| g.streaming_safe),
                    false,
                );
                let primary_square_channel = resolve_u8(
                    song_info.primary_square_chan,
                    file.primary_square_chan,
                    group.and_then(|g| g.primary_square_chan),
                    0,
                );
                let uses = resolve_uses(
                    &song_info.uses,
                    &file.uses,
                    &group.map(|g| g.uses.clone()).unwrap_or(None),
                );
                let author = song_info
                    .author
                    .clone()
                    .or_else(|| file.author.clone())
                    .unwrap_or_default();

                Song::new(
                    song_info.number,
                    Some(module.clone()),
                    enabled,
                    streaming_safe,
                    primary_square_channel,
                    uses,
                    song_info.title.clone(),
                    author,
                )
            })
            .collect()
    };

    Ok(ResolvedFile { module, songs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        Base64::encode_string(bytes)
    }

    #[test]
    fn decode_plain_base64_payload() {
        let encoded = b64(&[1, 2, 3, 4]);
        assert_eq!(decode_payload(&encoded).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn decode_deflate_prefixed_payload() {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        let original = b"hello famitracker world".to_vec();
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&original).unwrap();
        let compressed = encoder.finish().unwrap();
        let payload = format!("deflate:{}", b64(&compressed));

        assert_eq!(decode_payload(&payload).unwrap(), original);
    }

    #[test]
    fn start_addr_accepts_hex_string_or_int() {
        let json = r#"{
            "single": [
                {"title": "a", "data": "AAAA", "start_addr": "0x8001"},
                {"title": "b", "data": "AAAA", "start_addr": 32770}
            ]
        }"#;
        let parsed = parse_library_json(json).unwrap();
        assert_eq!(parsed.singles[0].start_addr, Some(0x8001));
        assert_eq!(parsed.singles[1].start_addr, Some(0x8002));
    }

    #[test]
    fn single_song_file_inherits_nothing_but_defaults() {
        let json = r#"{ "single": [ {"title": "Theme", "data": "AAAA"} ] }"#;
        let lib = parse_library_json(json).unwrap().resolve().unwrap();
        let song = &lib.singles[0].songs[0];
        assert!(song.enabled);
        assert!(!song.streaming_safe);
        assert_eq!(song.primary_square_channel, 0);
        assert_eq!(song.number, 0);
    }

    #[test]
    fn song_level_fields_override_file_and_group() {
        let json = r#"{
            "groups": [{
                "title": "Boss Themes",
                "primary_square_chan": 1,
                "items": [{
                    "title": "Multi",
                    "data": "AAAA",
                    "primary_square_chan": 0,
                    "songs": [
                        {"number": 0, "title": "Verse", "primary_square_chan": 1},
                        {"number": 1, "title": "Chorus"}
                    ]
                }]
            }]
        }"#;
        let lib = parse_library_json(json).unwrap().resolve().unwrap();
        let group = &lib.groups[0];
        let file = &group.files[0];
        assert_eq!(file.songs[0].primary_square_channel, 1); // song-level wins
        assert_eq!(file.songs[1].primary_square_channel, 0); // falls back to file-level
    }

    #[test]
    fn multi_song_file_songs_share_one_module() {
        let json = r#"{
            "single": [{
                "title": "Multi",
                "data": "AAAA",
                "songs": [
                    {"number": 0, "title": "A"},
                    {"number": 1, "title": "B"}
                ]
            }]
        }"#;
        let lib = parse_library_json(json).unwrap().resolve().unwrap();
        let file = &lib.singles[0];
        assert_eq!(file.songs.len(), 2);
        assert_eq!(
            file.songs[0].module.as_ref().unwrap().id(),
            file.songs[1].module.as_ref().unwrap().id()
        );
    }
}
