//! `Song` -- an immutable-per-import-run logical track (spec.md §3).

use crate::ci_string::CiString;
use crate::identity::{Id, Identity};
use crate::module::Module;
use rom_import_derive::Identity;
use std::collections::HashSet;
use std::rc::Rc;

/// A logical track: either backed by a [`Module`] the importer must place,
/// or "builtin" (`module = None`), meaning the ROM already contains it.
///
/// `module` is a non-owning reference to shared data: several `Song`s may
/// point at the same `Module` (a multi-song file), so it is held behind an
/// `Rc` rather than owned outright -- the `Module` itself owns nothing back.
#[derive(Debug, Clone, Identity)]
pub struct Song {
    id: Id<Song>,
    /// Index of this song *within its module*; `0` if the module holds only
    /// one song.
    pub number: u8,
    pub module: Option<Rc<Module>>,
    pub enabled: bool,
    pub streaming_safe: bool,
    /// `0` or `1` -- which square-wave channel carries this song's melody.
    pub primary_square_channel: u8,
    pub uses: HashSet<CiString>,
    pub title: String,
    pub author: String,
}

impl Song {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: u8,
        module: Option<Rc<Module>>,
        enabled: bool,
        streaming_safe: bool,
        primary_square_channel: u8,
        uses: HashSet<CiString>,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: Song::next_id(),
            number,
            module,
            enabled,
            streaming_safe,
            primary_square_channel,
            uses,
            title: title.into(),
            author: author.into(),
        }
    }

    pub fn id(&self) -> Id<Song> {
        self.id
    }

    /// `true` if the ROM already contains this song (no `Module` to place).
    pub fn is_builtin(&self) -> bool {
        self.module.is_none()
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Song {}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> Rc<Module> {
        Rc::new(Module::new("ft", "Shared Module", 0x8000, vec![0u8; 16]))
    }

    #[test]
    fn multiple_songs_can_share_one_module() {
        let m = module();
        let a = Song::new(0, Some(m.clone()), true, true, 0, HashSet::new(), "A", "");
        let b = Song::new(1, Some(m.clone()), true, true, 0, HashSet::new(), "B", "");
        assert_eq!(a.module.as_ref().unwrap().id(), b.module.as_ref().unwrap().id());
        assert_ne!(a, b);
    }

    #[test]
    fn builtin_song_has_no_module() {
        let s = Song::new(3, None, true, false, 0, HashSet::new(), "Builtin", "");
        assert!(s.is_builtin());
    }
}
