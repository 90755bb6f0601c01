//! # `rom-import-io`
//!
//! Data model and binary helpers for importing user-supplied tracker music
//! modules (FamiTracker-family) into a ROM image.
//!
//! - [`module`] / [`song`] -- the value objects that glue a music module to
//!   the in-ROM slot it will occupy.
//! - [`library`] -- deserialization of the Library JSON contract (singles,
//!   groups, base64/deflate-encoded module payloads).
//! - [`rom`] -- the `RomAccess` contract plus an in-memory and a disk-backed
//!   implementation.
//! - [`binary_cursor`] -- a little/big-endian `u16` cursor over a byte slice,
//!   used by the song-map table writers in `rom-import-ops`.
//! - [`ci_string`] -- a case-insensitive string wrapper for engine labels and
//!   `uses` tags.
//! - [`identity`] -- a stable per-instance handle for types that must be
//!   keyed by identity rather than structural equality.
//! - [`ftm`] -- the `FtmBinary` contract the FamiTracker module transform
//!   calls (`rebase`, `swap_square_channels`), plus one illustrative
//!   implementation.

pub mod binary_cursor;
pub mod ci_string;
pub mod ftm;
pub mod identity;
pub mod library;
pub mod module;
pub mod rom;
pub mod song;

use std::error::Error;
use std::fmt;

/// Shorthand type alias for a Result with a boxed error, matching the
/// teacher crate's `RBoxErr` convention throughout.
pub type RBoxErr<T> = Result<T, Box<dyn Error>>;

/// Errors surfaced while reading/writing ROM bytes, decoding library
/// payloads, or walking a `BinaryCursor`.
#[derive(Debug, PartialEq, Eq)]
pub enum RomIoError {
    /// `RomAccess::rom` was called against an implementation that cannot
    /// produce a snapshot of its backing bytes (spec.md's `RomUnsupported`).
    RomUnsupported,
    /// A write would extend past the end of the backing buffer.
    Overflow,
    /// A read would extend past the end of the backing buffer.
    EndOfStream,
    /// A negative or out-of-range index/count was supplied.
    RangeError,
    /// A library payload's `data` field could not be base64-decoded.
    InvalidBase64,
    /// A `"deflate:"`-prefixed library payload could not be inflated.
    InvalidDeflate,
    /// A library `start_addr` hex string (`"0x..."`) could not be parsed.
    InvalidHexAddress,
}

impl fmt::Display for RomIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RomUnsupported => write!(f, "ROM access implementation cannot snapshot the ROM"),
            Self::Overflow => write!(f, "write would extend past the end of the buffer"),
            Self::EndOfStream => write!(f, "read would extend past the end of the buffer"),
            Self::RangeError => write!(f, "index or count is negative or out of range"),
            Self::InvalidBase64 => write!(f, "library payload is not valid base64"),
            Self::InvalidDeflate => write!(f, "library payload is not valid deflate data"),
            Self::InvalidHexAddress => write!(f, "start_addr is not a valid integer or hex string"),
        }
    }
}

impl Error for RomIoError {}
