//! `Module` -- an immutable, loaded-but-not-yet-placed tracker data blob
//! (spec.md §3).

use crate::ci_string::CiString;
use crate::identity::{Id, Identity};
use rom_import_derive::Identity;

/// A self-contained block of music data consumed by one engine, possibly
/// containing multiple songs. Built once from a library entry and shared
/// (by reference) by every `Song` that lives in it.
///
/// Invariant: `raw_bytes.len() <= bank_size` of whatever engine's
/// [`crate::rom::RomAccess`]-resident bank it is ultimately placed into --
/// checked by the packer at placement time, since a bare `Module` has no
/// opinion about which engine's bank layout it will land in.
#[derive(Debug, Clone, Identity)]
pub struct Module {
    id: Id<Module>,
    /// Case-insensitive engine label, e.g. `"ft"`.
    pub engine: CiString,
    pub title: String,
    /// Address the raw bytes expect to be loaded at, before any rebase.
    pub base_address: u16,
    pub raw_bytes: Vec<u8>,
}

impl Module {
    pub fn new(engine: impl Into<CiString>, title: impl Into<String>, base_address: u16, raw_bytes: Vec<u8>) -> Self {
        Self {
            id: Module::next_id(),
            engine: engine.into(),
            title: title.into(),
            base_address,
            raw_bytes,
        }
    }

    pub fn id(&self) -> Id<Module> {
        self.id
    }

    pub fn size(&self) -> usize {
        self.raw_bytes.len()
    }
}

// Two Modules with identical fields are still distinct (spec.md §9):
// identity, not structural content, is what matters for the placement maps.
impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Module {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_modules_have_distinct_ids() {
        let a = Module::new("ft", "Song A", 0x8000, vec![1, 2, 3]);
        let b = Module::new("ft", "Song A", 0x8000, vec![1, 2, 3]);
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn engine_label_is_case_insensitive() {
        let m = Module::new("FT", "Song A", 0x8000, vec![]);
        assert_eq!(m.engine, CiString::new("ft"));
    }
}
